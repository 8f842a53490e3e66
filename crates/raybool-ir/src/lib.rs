//! Declarative geometry description for the raybool evaluator.
//!
//! This crate names the solids of a model and the regions built from
//! them. A region is a Boolean combination of solids, written as a
//! [`BooleanTree`] whose leaves refer to solids by name.
//!
//! The description is purely declarative: it carries no intersection data and no
//! resolved indices. `raybool-kernel` preps it into an evaluation-ready
//! model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive solid that the intersection layer can produce segments for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidDef {
    /// Unique solid name.
    pub name: String,
    /// Solid extends to infinity (e.g. a half-space).
    ///
    /// Segments of infinite solids are exempt from the out-of-range check.
    #[serde(default)]
    pub infinite: bool,
}

impl SolidDef {
    /// Create a finite solid.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            infinite: false,
        }
    }

    /// Create an infinite solid.
    pub fn infinite(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            infinite: true,
        }
    }
}

/// FASTGEN classification of a region.
///
/// Regions imported from the FASTGEN interchange format are either
/// thin plates or volumes, each with their own overlap rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastgenMode {
    /// Ordinary region.
    #[default]
    NonFastgen,
    /// FASTGEN plate-mode region.
    Plate,
    /// FASTGEN volume-mode region.
    Volume,
}

impl FastgenMode {
    /// True for plate and volume mode.
    pub fn is_fastgen(self) -> bool {
        self != FastgenMode::NonFastgen
    }
}

/// Boolean expression defining a region from solids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BooleanTree {
    /// Empty expression, never true.
    Nop,
    /// Reference to a solid by name.
    Solid {
        /// Solid name.
        name: String,
    },
    /// Complement of a subtree.
    Not {
        /// Negated subtree.
        child: Box<BooleanTree>,
    },
    /// Union of two subtrees.
    Union {
        /// Left operand.
        left: Box<BooleanTree>,
        /// Right operand.
        right: Box<BooleanTree>,
    },
    /// Intersection of two subtrees.
    Intersect {
        /// Left operand.
        left: Box<BooleanTree>,
        /// Right operand.
        right: Box<BooleanTree>,
    },
    /// Left minus right.
    Subtract {
        /// Base operand.
        left: Box<BooleanTree>,
        /// Subtracted operand.
        right: Box<BooleanTree>,
    },
    /// Exactly one of the two subtrees.
    Xor {
        /// Left operand.
        left: Box<BooleanTree>,
        /// Right operand.
        right: Box<BooleanTree>,
    },
}

impl BooleanTree {
    /// Leaf referring to a solid.
    pub fn solid(name: impl Into<String>) -> Self {
        BooleanTree::Solid { name: name.into() }
    }

    /// `!child`
    pub fn not(child: BooleanTree) -> Self {
        BooleanTree::Not {
            child: Box::new(child),
        }
    }

    /// `left u right`
    pub fn union(left: BooleanTree, right: BooleanTree) -> Self {
        BooleanTree::Union {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left + right`
    pub fn intersect(left: BooleanTree, right: BooleanTree) -> Self {
        BooleanTree::Intersect {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left - right`
    pub fn subtract(left: BooleanTree, right: BooleanTree) -> Self {
        BooleanTree::Subtract {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left ^ right`
    pub fn xor(left: BooleanTree, right: BooleanTree) -> Self {
        BooleanTree::Xor {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Left-leaning union of all named solids. `Nop` when empty.
    pub fn union_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(BooleanTree::solid)
            .reduce(BooleanTree::union)
            .unwrap_or(BooleanTree::Nop)
    }

    /// Names of all solids referenced by the tree, in left-to-right
    /// order, duplicates included.
    pub fn solid_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                BooleanTree::Nop => {}
                BooleanTree::Solid { name } => names.push(name.as_str()),
                BooleanTree::Not { child } => pending.push(child),
                BooleanTree::Union { left, right }
                | BooleanTree::Intersect { left, right }
                | BooleanTree::Subtract { left, right }
                | BooleanTree::Xor { left, right } => {
                    pending.push(right);
                    pending.push(left);
                }
            }
        }
        names
    }

    /// True if the tree contains only unions of solids.
    ///
    /// Such a region is trivially present wherever any of its solids is.
    pub fn is_all_union(&self) -> bool {
        let mut pending = vec![self];
        let mut saw_solid = false;
        while let Some(node) = pending.pop() {
            match node {
                BooleanTree::Solid { .. } => saw_solid = true,
                BooleanTree::Union { left, right } => {
                    pending.push(left);
                    pending.push(right);
                }
                _ => return false,
            }
        }
        saw_solid
    }
}

enum Piece<'a> {
    Tree(&'a BooleanTree),
    Text(&'static str),
}

impl fmt::Display for BooleanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pieces are pushed in reverse so they pop in print order.
        let mut work = vec![Piece::Tree(self)];
        while let Some(piece) = work.pop() {
            let node = match piece {
                Piece::Text(s) => {
                    f.write_str(s)?;
                    continue;
                }
                Piece::Tree(node) => node,
            };
            let (op, left, right) = match node {
                BooleanTree::Nop => {
                    f.write_str("NOP")?;
                    continue;
                }
                BooleanTree::Solid { name } => {
                    f.write_str(name)?;
                    continue;
                }
                BooleanTree::Not { child } => {
                    f.write_str("!(")?;
                    work.push(Piece::Text(")"));
                    work.push(Piece::Tree(child));
                    continue;
                }
                BooleanTree::Union { left, right } => (" u ", left, right),
                BooleanTree::Intersect { left, right } => (" + ", left, right),
                BooleanTree::Subtract { left, right } => (" - ", left, right),
                BooleanTree::Xor { left, right } => (" ^ ", left, right),
            };
            f.write_str("(")?;
            work.push(Piece::Text(")"));
            work.push(Piece::Tree(right));
            work.push(Piece::Text(op));
            work.push(Piece::Tree(left));
        }
        Ok(())
    }
}

/// A named Boolean combination of solids: the unit that owns partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    /// Unique region name.
    pub name: String,
    /// Region identifier.
    #[serde(default)]
    pub id: i32,
    /// Nonzero marks the region as air; equal codes are the same air.
    #[serde(default)]
    pub aircode: i32,
    /// Line-of-sight thickness percentage.
    #[serde(default)]
    pub los: i32,
    /// FASTGEN classification.
    #[serde(default)]
    pub fastgen: FastgenMode,
    /// Boolean formula.
    pub tree: BooleanTree,
}

impl RegionDef {
    /// Create an ordinary solid-material region.
    pub fn new(name: impl Into<String>, tree: BooleanTree) -> Self {
        Self {
            name: name.into(),
            id: 0,
            aircode: 0,
            los: 100,
            fastgen: FastgenMode::NonFastgen,
            tree,
        }
    }

    /// Set the region identifier.
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    /// Mark the region as air.
    pub fn with_aircode(mut self, aircode: i32) -> Self {
        self.aircode = aircode;
        self
    }

    /// Set the FASTGEN classification.
    pub fn with_fastgen(mut self, fastgen: FastgenMode) -> Self {
        self.fastgen = fastgen;
        self
    }
}

/// Solids plus the regions made from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// All solids, in bit order.
    pub solids: Vec<SolidDef>,
    /// All regions, in declaration order.
    pub regions: Vec<RegionDef>,
}

impl Geometry {
    /// Create an empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finite solid.
    pub fn solid(mut self, name: impl Into<String>) -> Self {
        self.solids.push(SolidDef::new(name));
        self
    }

    /// Add a region.
    pub fn region(mut self, region: RegionDef) -> Self {
        self.regions.push(region);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_infix_operators() {
        let tree = BooleanTree::subtract(
            BooleanTree::union(BooleanTree::solid("a"), BooleanTree::solid("b")),
            BooleanTree::not(BooleanTree::solid("c")),
        );
        assert_eq!(tree.to_string(), "((a u b) - !(c))");
    }

    #[test]
    fn display_deep_tree_without_recursion() {
        let depth = 200_000;
        let mut tree = BooleanTree::solid("a");
        for _ in 0..depth {
            tree = BooleanTree::subtract(tree, BooleanTree::solid("b"));
        }
        let text = tree.to_string();
        assert_eq!(text.len(), depth + 1 + depth * " - b)".len());
        assert!(text[depth..].starts_with("a - b) - b)"));

        // Dropping the boxed tree recursively would overflow the test thread.
        let mut pending = vec![tree];
        while let Some(t) = pending.pop() {
            if let BooleanTree::Subtract { left, right } = t {
                pending.push(*left);
                pending.push(*right);
            }
        }
    }

    #[test]
    fn solid_names_in_order() {
        let tree = BooleanTree::xor(
            BooleanTree::intersect(BooleanTree::solid("a"), BooleanTree::solid("b")),
            BooleanTree::solid("a"),
        );
        assert_eq!(tree.solid_names(), vec!["a", "b", "a"]);
    }

    #[test]
    fn all_union_detection() {
        assert!(BooleanTree::union_of(["a", "b", "c"]).is_all_union());
        assert!(BooleanTree::solid("a").is_all_union());
        assert!(!BooleanTree::Nop.is_all_union());
        assert!(!BooleanTree::subtract(BooleanTree::solid("a"), BooleanTree::solid("b"))
            .is_all_union());
        assert_eq!(BooleanTree::union_of(Vec::<String>::new()), BooleanTree::Nop);
    }

    #[test]
    fn region_defaults_from_json() {
        let json = r#"{
            "name": "plate.r",
            "fastgen": "plate",
            "tree": { "op": "solid", "name": "plate.s" }
        }"#;
        let region: RegionDef = serde_json::from_str(json).expect("deserialize");
        assert_eq!(region.fastgen, FastgenMode::Plate);
        assert_eq!(region.aircode, 0);
        assert_eq!(region.tree, BooleanTree::solid("plate.s"));
    }

    #[test]
    fn geometry_builder() {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .region(RegionDef::new("r", BooleanTree::union_of(["a", "b"])).with_aircode(1));
        assert_eq!(geom.solids.len(), 2);
        assert_eq!(geom.regions[0].aircode, 1);
        assert!(!geom.solids[0].infinite);
    }
}

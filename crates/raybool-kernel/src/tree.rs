//! Flattened region trees.
//!
//! Prep turns each region's recursive [`BooleanTree`] into a flat arena
//! of [`TreeNode`]s addressed by index. Everything that walks a tree
//! during ray evaluation works on this form, so no walk needs native
//! recursion no matter how deep a user-built tree is.

use std::fmt;

use raybool_ir::BooleanTree;

use crate::bits::SolidBits;
use crate::model::{Model, SolidId};
use crate::partition::Partition;
use crate::ray::SegmentStore;

/// Index of a node inside its [`RegionTree`].
pub type NodeIndex = u32;

/// One node of a flattened Boolean tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeNode {
    /// Never true.
    Nop,
    /// True where the solid has a segment.
    Solid(SolidId),
    /// Complement.
    Not(NodeIndex),
    /// Either side.
    Union(NodeIndex, NodeIndex),
    /// Both sides.
    Intersect(NodeIndex, NodeIndex),
    /// Left but not right.
    Subtract(NodeIndex, NodeIndex),
    /// Exactly one side; both is an ambiguity.
    Xor(NodeIndex, NodeIndex),
}

#[derive(Clone, Copy)]
enum Child {
    Left,
    Right,
}

impl TreeNode {
    fn set_child(&mut self, which: Child, idx: NodeIndex) {
        match (self, which) {
            (TreeNode::Not(c), _) => *c = idx,
            (TreeNode::Union(l, _), Child::Left)
            | (TreeNode::Intersect(l, _), Child::Left)
            | (TreeNode::Subtract(l, _), Child::Left)
            | (TreeNode::Xor(l, _), Child::Left) => *l = idx,
            (TreeNode::Union(_, r), Child::Right)
            | (TreeNode::Intersect(_, r), Child::Right)
            | (TreeNode::Subtract(_, r), Child::Right)
            | (TreeNode::Xor(_, r), Child::Right) => *r = idx,
            (TreeNode::Nop, _) | (TreeNode::Solid(_), _) => {}
        }
    }
}

/// A region's Boolean formula as a node arena. The root is node 0 and
/// every node is reachable from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTree {
    nodes: Vec<TreeNode>,
}

impl RegionTree {
    /// Flatten `tree` in pre-order, resolving solid names with `resolve`.
    ///
    /// Returns the first unresolved solid name on failure.
    pub fn compile<F>(tree: &BooleanTree, mut resolve: F) -> Result<Self, String>
    where
        F: FnMut(&str) -> Option<SolidId>,
    {
        let mut nodes: Vec<TreeNode> = Vec::new();
        let mut work: Vec<(&BooleanTree, Option<(usize, Child)>)> = vec![(tree, None)];

        while let Some((t, parent)) = work.pop() {
            let idx = nodes.len();
            let node = match t {
                BooleanTree::Nop => TreeNode::Nop,
                BooleanTree::Solid { name } => {
                    TreeNode::Solid(resolve(name).ok_or_else(|| name.clone())?)
                }
                BooleanTree::Not { child } => {
                    work.push((child, Some((idx, Child::Left))));
                    TreeNode::Not(0)
                }
                BooleanTree::Union { left, right } => {
                    work.push((right, Some((idx, Child::Right))));
                    work.push((left, Some((idx, Child::Left))));
                    TreeNode::Union(0, 0)
                }
                BooleanTree::Intersect { left, right } => {
                    work.push((right, Some((idx, Child::Right))));
                    work.push((left, Some((idx, Child::Left))));
                    TreeNode::Intersect(0, 0)
                }
                BooleanTree::Subtract { left, right } => {
                    work.push((right, Some((idx, Child::Right))));
                    work.push((left, Some((idx, Child::Left))));
                    TreeNode::Subtract(0, 0)
                }
                BooleanTree::Xor { left, right } => {
                    work.push((right, Some((idx, Child::Right))));
                    work.push((left, Some((idx, Child::Left))));
                    TreeNode::Xor(0, 0)
                }
            };
            nodes.push(node);
            if let Some((p, which)) = parent {
                nodes[p].set_child(which, idx as NodeIndex);
            }
        }

        Ok(Self { nodes })
    }

    /// Index of the root node.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        0
    }

    /// Node by index.
    #[inline]
    pub fn node(&self, idx: NodeIndex) -> TreeNode {
        self.nodes[idx as usize]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a compiled tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every solid leaf, in pre-order, duplicates included.
    pub fn solids(&self) -> impl Iterator<Item = SolidId> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            TreeNode::Solid(s) => Some(*s),
            _ => None,
        })
    }

    /// True if every solid the tree mentions, under any operator, has
    /// been intersected with the ray already.
    pub fn all_solids_shot(&self, bits: &SolidBits) -> bool {
        // Structurally: Nop passes, a leaf tests its bit, NOT and the
        // binary operators need all children to pass. Since every node
        // is reachable from the root that is a plain scan of the leaves.
        self.solids().all(|s| bits.test(s.0))
    }

    /// Largest bundle-ray index among segments in `part` whose solid
    /// appears in the tree. Per solid the first contributing segment is
    /// used. `None` when no solid of the tree has a segment there.
    pub fn max_ray_index(&self, part: &Partition, segs: &SegmentStore) -> Option<usize> {
        self.solids()
            .filter_map(|solid| {
                part.segments()
                    .iter()
                    .find(|&&id| segs.solid(id) == solid)
                    .map(|&id| segs.get(id).in_hit.ray)
            })
            .max()
    }

    /// Infix rendering using solid names from `model`.
    pub fn display<'a>(&'a self, model: &'a Model) -> TreeDisplay<'a> {
        TreeDisplay { tree: self, model }
    }
}

/// Infix rendering of a [`RegionTree`]; see [`RegionTree::display`].
pub struct TreeDisplay<'a> {
    tree: &'a RegionTree,
    model: &'a Model,
}

enum Piece {
    Node(NodeIndex),
    Text(&'static str),
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pieces are pushed in reverse so they pop in print order.
        let mut work = vec![Piece::Node(self.tree.root())];
        while let Some(piece) = work.pop() {
            let idx = match piece {
                Piece::Text(s) => {
                    f.write_str(s)?;
                    continue;
                }
                Piece::Node(idx) => idx,
            };
            let (op, l, r) = match self.tree.node(idx) {
                TreeNode::Nop => {
                    f.write_str("NOP")?;
                    continue;
                }
                TreeNode::Solid(s) => {
                    f.write_str(&self.model.solid(s).name)?;
                    continue;
                }
                TreeNode::Not(c) => {
                    f.write_str("!(")?;
                    work.push(Piece::Text(")"));
                    work.push(Piece::Node(c));
                    continue;
                }
                TreeNode::Union(l, r) => (" u ", l, r),
                TreeNode::Intersect(l, r) => (" + ", l, r),
                TreeNode::Subtract(l, r) => (" - ", l, r),
                TreeNode::Xor(l, r) => (" ^ ", l, r),
            };
            f.write_str("(")?;
            work.push(Piece::Text(")"));
            work.push(Piece::Node(r));
            work.push(Piece::Text(op));
            work.push(Piece::Node(l));
        }
        Ok(())
    }
}

/// Drop a recursive tree without recursing, for tests that build very
/// deep ones.
#[cfg(test)]
pub(crate) fn drop_deep(tree: BooleanTree) {
    let mut pending = vec![tree];
    while let Some(t) = pending.pop() {
        match t {
            BooleanTree::Nop | BooleanTree::Solid { .. } => {}
            BooleanTree::Not { child } => pending.push(*child),
            BooleanTree::Union { left, right }
            | BooleanTree::Intersect { left, right }
            | BooleanTree::Subtract { left, right }
            | BooleanTree::Xor { left, right } => {
                pending.push(*left);
                pending.push(*right);
            }
        }
    }
}

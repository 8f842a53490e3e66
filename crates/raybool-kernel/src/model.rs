//! The prepped, read-only model shared by every ray.

use std::collections::HashMap;

use log::debug;
use raybool_ir::{FastgenMode, Geometry};
use raybool_math::Tolerance;

use crate::error::PrepError;
use crate::tree::RegionTree;

/// Index of a solid; doubles as its bit in [`SolidBits`](crate::SolidBits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolidId(pub usize);

/// Index of a region; doubles as its region bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub usize);

/// A prepped solid.
#[derive(Debug, Clone)]
pub struct Solid {
    /// Solid name.
    pub name: String,
    /// Solid extends to infinity.
    pub infinite: bool,
}

/// A prepped region.
#[derive(Debug, Clone)]
pub struct Region {
    /// Region name.
    pub name: String,
    /// Region identifier.
    pub id: i32,
    /// Nonzero for air.
    pub aircode: i32,
    /// Line-of-sight thickness percentage.
    pub los: i32,
    /// FASTGEN classification.
    pub fastgen: FastgenMode,
    /// Stable region number, used as the last-resort overlap tie-break.
    pub bit: usize,
    /// The tree is a pure union of solids.
    pub all_unions: bool,
    /// Flattened Boolean formula.
    pub tree: RegionTree,
}

impl Region {
    /// True for air regions.
    #[inline]
    pub fn is_air(&self) -> bool {
        self.aircode != 0
    }
}

/// Solids, regions and the solid-to-region index.
///
/// Built once by [`Model::prep`] and never mutated during evaluation.
#[derive(Debug, Clone)]
pub struct Model {
    solids: Vec<Solid>,
    regions: Vec<Region>,
    solid_regions: Vec<Vec<RegionId>>,
    solid_names: HashMap<String, SolidId>,
    region_names: HashMap<String, RegionId>,
    tol: Tolerance,
}

impl Model {
    /// Resolve a geometry description into an evaluation-ready model.
    pub fn prep(geom: &Geometry, tol: Tolerance) -> Result<Self, PrepError> {
        let mut solid_names = HashMap::with_capacity(geom.solids.len());
        let mut solids = Vec::with_capacity(geom.solids.len());
        for (i, def) in geom.solids.iter().enumerate() {
            if solid_names.insert(def.name.clone(), SolidId(i)).is_some() {
                return Err(PrepError::DuplicateSolid(def.name.clone()));
            }
            solids.push(Solid {
                name: def.name.clone(),
                infinite: def.infinite,
            });
        }

        let mut region_names = HashMap::with_capacity(geom.regions.len());
        let mut regions = Vec::with_capacity(geom.regions.len());
        let mut solid_regions = vec![Vec::new(); solids.len()];
        for (i, def) in geom.regions.iter().enumerate() {
            let rid = RegionId(i);
            if region_names.insert(def.name.clone(), rid).is_some() {
                return Err(PrepError::DuplicateRegion(def.name.clone()));
            }
            let tree = RegionTree::compile(&def.tree, |name| solid_names.get(name).copied())
                .map_err(|solid| PrepError::UnknownSolid {
                    region: def.name.clone(),
                    solid,
                })?;
            for solid in tree.solids() {
                let list: &mut Vec<RegionId> = &mut solid_regions[solid.0];
                if !list.contains(&rid) {
                    list.push(rid);
                }
            }
            regions.push(Region {
                name: def.name.clone(),
                id: def.id,
                aircode: def.aircode,
                los: def.los,
                fastgen: def.fastgen,
                bit: i,
                all_unions: def.tree.is_all_union(),
                tree,
            });
        }

        debug!(
            "prepped model: {} solids, {} regions, tol.dist={}",
            solids.len(),
            regions.len(),
            tol.dist
        );

        Ok(Self {
            solids,
            regions,
            solid_regions,
            solid_names,
            region_names,
            tol,
        })
    }

    /// Distance tolerance.
    #[inline]
    pub fn tol(&self) -> Tolerance {
        self.tol
    }

    /// Solid by id.
    #[inline]
    pub fn solid(&self, id: SolidId) -> &Solid {
        &self.solids[id.0]
    }

    /// Region by id.
    #[inline]
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0]
    }

    /// Number of solids.
    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    /// Number of regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Regions whose formula references `solid`, in region order.
    #[inline]
    pub fn regions_of(&self, solid: SolidId) -> &[RegionId] {
        &self.solid_regions[solid.0]
    }

    /// Look up a solid by name.
    pub fn solid_id(&self, name: &str) -> Option<SolidId> {
        self.solid_names.get(name).copied()
    }

    /// Look up a region by name.
    pub fn region_id(&self, name: &str) -> Option<RegionId> {
        self.region_names.get(name).copied()
    }

    /// Region ids in declaration order.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> {
        (0..self.regions.len()).map(RegionId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raybool_ir::{BooleanTree, RegionDef};

    fn geometry() -> Geometry {
        Geometry::new()
            .solid("a")
            .solid("b")
            .solid("c")
            .region(RegionDef::new("r1", BooleanTree::union_of(["a", "b"])))
            .region(RegionDef::new(
                "r2",
                BooleanTree::subtract(BooleanTree::solid("b"), BooleanTree::solid("b")),
            ))
    }

    #[test]
    fn test_prep_indexes_regions_by_solid() {
        let model = Model::prep(&geometry(), Tolerance::default()).unwrap();
        let a = model.solid_id("a").unwrap();
        let b = model.solid_id("b").unwrap();
        let c = model.solid_id("c").unwrap();
        assert_eq!(model.regions_of(a), &[RegionId(0)]);
        // r2 mentions b twice but is listed once
        assert_eq!(model.regions_of(b), &[RegionId(0), RegionId(1)]);
        assert!(model.regions_of(c).is_empty());
    }

    #[test]
    fn test_prep_flags() {
        let model = Model::prep(&geometry(), Tolerance::default()).unwrap();
        let r1 = model.region(model.region_id("r1").unwrap());
        let r2 = model.region(model.region_id("r2").unwrap());
        assert!(r1.all_unions);
        assert!(!r2.all_unions);
        assert_eq!(r1.bit, 0);
        assert_eq!(r2.bit, 1);
        assert!(!r1.is_air());
    }

    #[test]
    fn test_prep_unknown_solid() {
        let geom = Geometry::new()
            .solid("a")
            .region(RegionDef::new("r", BooleanTree::solid("missing")));
        let err = Model::prep(&geom, Tolerance::default()).unwrap_err();
        assert_eq!(
            err,
            PrepError::UnknownSolid {
                region: "r".into(),
                solid: "missing".into()
            }
        );
    }

    #[test]
    fn test_prep_duplicates() {
        let geom = Geometry::new().solid("a").solid("a");
        assert_eq!(
            Model::prep(&geom, Tolerance::default()).unwrap_err(),
            PrepError::DuplicateSolid("a".into())
        );

        let geom = Geometry::new()
            .solid("a")
            .region(RegionDef::new("r", BooleanTree::solid("a")))
            .region(RegionDef::new("r", BooleanTree::solid("a")));
        assert_eq!(
            Model::prep(&geom, Tolerance::default()).unwrap_err(),
            PrepError::DuplicateRegion("r".into())
        );
    }
}

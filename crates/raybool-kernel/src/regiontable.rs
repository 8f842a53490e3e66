//! Candidate regions of one partition.

use crate::error::{BoolError, Result};
use crate::model::{Model, RegionId};
use crate::partition::Partition;
use crate::ray::{SegmentId, SegmentStore};

/// Regions referencing any solid that contributed to a partition,
/// in first-seen order without duplicates. Scratch, rebuilt per
/// partition.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: Vec<RegionId>,
}

impl RegionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild for `part`.
    pub fn build(&mut self, model: &Model, segs: &SegmentStore, part: &Partition) -> Result<()> {
        self.regions.clear();
        if part.segments().is_empty() {
            return Err(BoolError::EmptySegmentList {
                in_dist: part.in_dist(segs),
                out_dist: part.out_dist(segs),
            });
        }
        for &seg in part.segments() {
            for &region in model.regions_of(segs.solid(seg)) {
                if !self.regions.contains(&region) {
                    self.regions.push(region);
                }
            }
        }
        Ok(())
    }

    /// Candidate regions.
    #[inline]
    pub fn as_slice(&self) -> &[RegionId] {
        &self.regions
    }

    /// Number of candidates.
    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when no region references the partition's solids.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Forget all candidates.
    pub fn clear(&mut self) {
        self.regions.clear();
    }
}

/// Build a fresh [`RegionTable`] for `part`.
pub fn regions_for(model: &Model, segs: &SegmentStore, part: &Partition) -> Result<RegionTable> {
    let mut table = RegionTable::new();
    table.build(model, segs, part)?;
    Ok(table)
}

/// Segments of `part` whose solid appears in `region`'s formula.
///
/// A region under consideration for a partition always has at least
/// one such segment, so an empty result is an error.
pub fn region_segments(
    model: &Model,
    segs: &SegmentStore,
    part: &Partition,
    region: RegionId,
) -> Result<Vec<SegmentId>> {
    let found: Vec<SegmentId> = part
        .segments()
        .iter()
        .copied()
        .filter(|&seg| model.regions_of(segs.solid(seg)).contains(&region))
        .collect();
    if found.is_empty() {
        return Err(BoolError::RegionWithoutSegments(
            model.region(region).name.clone(),
        ));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SolidId;
    use crate::ray::Segment;
    use raybool_ir::{BooleanTree, Geometry, RegionDef};
    use raybool_math::Tolerance;

    fn model() -> Model {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .solid("c")
            .region(RegionDef::new("r1", BooleanTree::solid("b")))
            .region(RegionDef::new(
                "r2",
                BooleanTree::subtract(BooleanTree::solid("a"), BooleanTree::solid("b")),
            ))
            .region(RegionDef::new("r3", BooleanTree::solid("c")));
        Model::prep(&geom, Tolerance::DEFAULT).unwrap()
    }

    #[test]
    fn test_first_seen_order_without_duplicates() {
        let m = model();
        let mut segs = SegmentStore::new();
        let a = segs.insert(Segment::new(SolidId(0), 0.0, 2.0));
        let b = segs.insert(Segment::new(SolidId(1), 0.0, 2.0));
        let mut part = Partition::from_segment(a);
        part.add_segment(b);

        let table = regions_for(&m, &segs, &part).unwrap();
        let r1 = m.region_id("r1").unwrap();
        let r2 = m.region_id("r2").unwrap();
        assert_eq!(table.as_slice(), &[r2, r1]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_region_segments() {
        let m = model();
        let mut segs = SegmentStore::new();
        let a = segs.insert(Segment::new(SolidId(0), 0.0, 2.0));
        let c = segs.insert(Segment::new(SolidId(2), 0.0, 2.0));
        let mut part = Partition::from_segment(a);
        part.add_segment(c);

        let r2 = m.region_id("r2").unwrap();
        let r1 = m.region_id("r1").unwrap();
        assert_eq!(region_segments(&m, &segs, &part, r2).unwrap(), vec![a]);
        assert_eq!(
            region_segments(&m, &segs, &part, r1),
            Err(BoolError::RegionWithoutSegments("r1".into()))
        );
    }
}

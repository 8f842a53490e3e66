//! Driving the evaluator along a ray, one traversal cell at a time.

use log::{debug, trace};
use rayon::prelude::*;

use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::finalize::FinalizeStatus;
use crate::model::{Model, RegionId, SolidId};
use crate::ray::{Ray, Segment, SegmentId};
use crate::resource::{RayState, Resource};

/// Segments produced while the ray crossed one spatial cell.
#[derive(Debug, Clone, Default)]
pub struct CellShot {
    /// Ray distance where the cell was entered.
    pub start: f64,
    /// Ray distance where the cell was left.
    pub end: f64,
    /// Solids intersected in this cell, hit or not.
    pub shot: Vec<SolidId>,
    /// Segments from those intersections, in any order.
    pub segments: Vec<Segment>,
}

impl CellShot {
    /// Cell spanning `start..end` with nothing shot yet.
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Record a solid shot in this cell along with its segments.
    pub fn with_solid(mut self, solid: SolidId, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.shot.push(solid);
        self.segments.extend(segments);
        self
    }
}

/// Supplies cells along a ray, nearest first.
pub trait Traversal {
    /// The next cell, or `None` once the ray has left the model.
    fn advance(&mut self, ray: &Ray) -> Option<CellShot>;
}

/// A precomputed sequence of cells.
#[derive(Debug, Clone, Default)]
pub struct CellList {
    cells: std::vec::IntoIter<CellShot>,
}

impl CellList {
    /// Replay `cells` in order.
    pub fn new(cells: Vec<CellShot>) -> Self {
        Self {
            cells: cells.into_iter(),
        }
    }

    /// A single cell covering the whole ray.
    pub fn single(solids: &[SolidId], segments: Vec<Segment>) -> Self {
        Self::new(vec![CellShot {
            start: f64::NEG_INFINITY,
            end: f64::INFINITY,
            shot: solids.to_vec(),
            segments,
        }])
    }
}

impl Traversal for CellList {
    fn advance(&mut self, _ray: &Ray) -> Option<CellShot> {
        self.cells.next()
    }
}

/// An owned, finalized partition.
#[derive(Debug, Clone, PartialEq)]
pub struct HitPartition {
    /// Entry distance.
    pub in_dist: f64,
    /// Exit distance.
    pub out_dist: f64,
    /// Surface number of the entry hit.
    pub in_surfno: i32,
    /// Surface number of the exit hit.
    pub out_surfno: i32,
    /// The entry normal must be reversed.
    pub in_flip: bool,
    /// The exit normal must be reversed.
    pub out_flip: bool,
    /// Solid providing the entry hit.
    pub in_solid: SolidId,
    /// Solid providing the exit hit.
    pub out_solid: SolidId,
    /// Owning region.
    pub region: Option<RegionId>,
    /// Solids of every contributing segment.
    pub solids: Vec<SolidId>,
    /// Every region that claimed the interval, if recorded.
    pub overlap_regions: Option<Vec<RegionId>>,
}

impl HitPartition {
    /// Thickness along the ray.
    pub fn depth(&self) -> f64 {
        self.out_dist - self.in_dist
    }

    /// Name of the owning region.
    pub fn region_name<'m>(&self, model: &'m Model) -> Option<&'m str> {
        self.region.map(|r| model.region(r).name.as_str())
    }

    /// Snapshot every partition of the output list.
    pub fn collect(state: &RayState) -> Vec<HitPartition> {
        state
            .parts
            .iter(&state.output)
            .map(|id| {
                let p = &state.parts[id];
                let in_hit = state.segs.hit(p.in_hit);
                let out_hit = state.segs.hit(p.out_hit);
                HitPartition {
                    in_dist: in_hit.dist,
                    out_dist: out_hit.dist,
                    in_surfno: in_hit.surfno,
                    out_surfno: out_hit.surfno,
                    in_flip: p.in_flip,
                    out_flip: p.out_flip,
                    in_solid: state.segs.solid(p.in_seg()),
                    out_solid: state.segs.solid(p.out_seg()),
                    region: p.region,
                    solids: p.segments().iter().map(|&s| state.segs.solid(s)).collect(),
                    overlap_regions: p.overlap_regions.clone(),
                }
            })
            .collect()
    }
}

impl Evaluator<'_> {
    /// Evaluate one ray, pulling cells from `traversal`.
    ///
    /// With a hit quota the partitions of each cell are finalized as
    /// soon as the cell is done, and traversal stops once the quota is
    /// met. Otherwise everything is woven first and finalized in one
    /// pass. An empty result is a miss.
    pub fn shoot<T>(&self, res: &mut Resource, ray: Ray, traversal: &mut T) -> Result<Vec<HitPartition>>
    where
        T: Traversal + ?Sized,
    {
        res.reset(ray, self.model.solid_count());
        let onehit = self.settings.onehit;
        let mut last_start = self.settings.backing_dist;
        let mut pending: Vec<SegmentId> = Vec::new();
        let mut any_segments = false;

        while let Some(cell) = traversal.advance(&ray) {
            trace!(
                "cell ({}, {}): {} solids, {} segments",
                cell.start,
                cell.end,
                cell.shot.len(),
                cell.segments.len()
            );
            for solid in &cell.shot {
                res.state.solids_shot.set(solid.0);
            }
            for seg in cell.segments {
                pending.push(res.state.add_segment(seg));
                any_segments = true;
            }

            if onehit != 0 && !pending.is_empty() {
                self.weave(res, &pending)?;
                pending.clear();
                let status = self.finalize(res, last_start, cell.end)?;
                last_start = cell.end;
                if status == FinalizeStatus::Satisfied {
                    debug!("hit quota met at {}", cell.end);
                    return Ok(HitPartition::collect(&res.state));
                }
            }
        }

        if !pending.is_empty() {
            self.weave(res, &pending)?;
        }
        if !any_segments {
            trace!("miss: no segments");
            return Ok(Vec::new());
        }
        self.finalize(res, self.settings.backing_dist, f64::INFINITY)?;
        Ok(HitPartition::collect(&res.state))
    }

    /// Evaluate independent rays in parallel, one [`Resource`] per
    /// worker. Results keep the order of `jobs`.
    pub fn shoot_many<T>(&self, jobs: Vec<(Ray, T)>) -> Vec<Result<Vec<HitPartition>>>
    where
        T: Traversal + Send,
    {
        jobs.into_par_iter()
            .map_init(
                || self.resource(),
                |res, (ray, mut traversal)| self.shoot(res, ray, &mut traversal),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use raybool_ir::{BooleanTree, Geometry, RegionDef};
    use raybool_math::{Point3, Tolerance, Vec3};

    fn model() -> Model {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .region(RegionDef::new("r1", BooleanTree::solid("a")))
            .region(RegionDef::new("r2", BooleanTree::solid("b")));
        Model::prep(&geom, Tolerance::DEFAULT).unwrap()
    }

    fn ray() -> Ray {
        Ray::new(Point3::origin(), Vec3::x())
    }

    #[test]
    fn test_miss() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        let mut cells = CellList::new(vec![CellShot::new(0.0, 10.0).with_solid(SolidId(0), Vec::new())]);
        assert!(ev.shoot(&mut res, ray(), &mut cells).unwrap().is_empty());
    }

    #[test]
    fn test_cells_in_order() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        let mut cells = CellList::new(vec![
            CellShot::new(0.0, 5.0).with_solid(SolidId(0), [Segment::new(SolidId(0), 1.0, 2.0)]),
            CellShot::new(5.0, 10.0).with_solid(SolidId(1), [Segment::new(SolidId(1), 6.0, 7.0)]),
        ]);
        let hits = ev.shoot(&mut res, ray(), &mut cells).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].region_name(&m), Some("r1"));
        assert_eq!(hits[1].region_name(&m), Some("r2"));
        assert_eq!(hits[1].in_surfno, 0);
        assert_eq!(hits[1].out_surfno, 1);
        assert_relative_eq!(hits[1].depth(), 1.0);
    }

    #[test]
    fn test_onehit_stops_traversal_early() {
        let m = model();
        let ev = Evaluator::with_settings(&m, crate::Settings::onehit(1)).unwrap();
        let mut res = ev.resource();
        let mut cells = CellList::new(vec![
            CellShot::new(0.0, 5.0).with_solid(SolidId(0), [Segment::new(SolidId(0), 1.0, 2.0)]),
            CellShot::new(5.0, 10.0).with_solid(SolidId(1), [Segment::new(SolidId(1), 6.0, 7.0)]),
        ]);
        let hits = ev.shoot(&mut res, ray(), &mut cells).unwrap();
        assert_eq!(hits.len(), 1);
        // The second cell was never pulled.
        assert!(cells.advance(&ray()).is_some());
    }

    #[test]
    fn test_shoot_many_keeps_order() {
        let m = model();
        let ev = Evaluator::new(&m);
        let jobs: Vec<_> = (0..32)
            .map(|i| {
                let seg = Segment::new(SolidId(i % 2), i as f64, i as f64 + 0.5);
                (ray().with_index(0), CellList::single(&[SolidId(0), SolidId(1)], vec![seg]))
            })
            .collect();
        let results = ev.shoot_many(jobs);
        assert_eq!(results.len(), 32);
        for (i, r) in results.into_iter().enumerate() {
            let hits = r.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].in_dist, i as f64);
            assert_eq!(hits[0].in_solid, SolidId(i % 2));
        }
    }
}

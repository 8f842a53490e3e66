//! Overlap resolution: choosing one owner when several regions claim
//! the same partition.
//!
//! FASTGEN regions are settled first by their fixed rules (volume
//! against volume by depth, then plate against volume). Whatever is
//! left is reduced pairwise: air loses to material, like air keeps the
//! incumbent, a FASTGEN region loses to a conventional one, a ray
//! bundle prefers the ray nearest its center, and anything else goes to
//! the caller's [`OverlapHandler`].

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use raybool_ir::FastgenMode;
use raybool_math::Tolerance;

use crate::error::Result;
use crate::model::{Model, RegionId};
use crate::partition::{Partition, PartitionId};
use crate::ray::{Ray, SegmentStore};
use crate::regiontable::region_segments;
use crate::resource::RayState;
use crate::settings::{FastgenRules, Settings};

/// Decision for a pair of regions claiming one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapAction {
    /// Discard the partition.
    Drop,
    /// The first region keeps the partition.
    KeepA,
    /// The second region keeps the partition.
    KeepB,
}

/// Read-only context handed to overlap hooks.
#[derive(Clone, Copy)]
pub struct OverlapView<'a> {
    /// The model.
    pub model: &'a Model,
    /// The ray being evaluated.
    pub ray: &'a Ray,
    /// Segments of the ray.
    pub segs: &'a SegmentStore,
    /// The contested partition.
    pub partition: &'a Partition,
    /// The most recently finalized partition, if any.
    pub previous: Option<&'a Partition>,
}

impl OverlapView<'_> {
    /// Entry distance of the contested partition.
    pub fn in_dist(&self) -> f64 {
        self.partition.in_dist(self.segs)
    }

    /// Exit distance of the contested partition.
    pub fn out_dist(&self) -> f64 {
        self.partition.out_dist(self.segs)
    }

    /// Thickness of the contested partition.
    pub fn depth(&self) -> f64 {
        self.out_dist() - self.in_dist()
    }
}

/// Pairwise overlap policy.
pub trait OverlapHandler: Send + Sync {
    /// Pick between regions `a` (the current holder) and `b`.
    fn choose(&self, view: &OverlapView<'_>, a: RegionId, b: RegionId) -> OverlapAction;
}

impl<F> OverlapHandler for F
where
    F: Fn(&OverlapView<'_>, RegionId, RegionId) -> OverlapAction + Send + Sync,
{
    fn choose(&self, view: &OverlapView<'_>, a: RegionId, b: RegionId) -> OverlapAction {
        self(view, a, b)
    }
}

/// Stock policy: air yields, then the region owning the previous
/// partition, then the lower region number.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOverlap;

impl OverlapHandler for DefaultOverlap {
    fn choose(&self, view: &OverlapView<'_>, a: RegionId, b: RegionId) -> OverlapAction {
        let ra = view.model.region(a);
        let rb = view.model.region(b);
        if ra.is_air() {
            return OverlapAction::KeepB;
        }
        if let Some(prev) = view.previous {
            if prev.region == Some(a) {
                return OverlapAction::KeepA;
            }
            if prev.region == Some(b) {
                return OverlapAction::KeepB;
            }
        }
        if ra.bit < rb.bit {
            OverlapAction::KeepA
        } else {
            OverlapAction::KeepB
        }
    }
}

/// Diagnostic hook called for every contested partition.
pub trait OverlapLogger: Send + Sync {
    /// Report `claimants` of the partition in `view`. Must not mutate
    /// evaluation state.
    fn log(&self, view: &OverlapView<'_>, claimants: &[RegionId]);
}

/// Logs each overlap as one grouped `warn!` record. After the first
/// hundred reports only every hundredth is written.
#[derive(Debug, Default)]
pub struct DefaultOverlapLogger {
    count: AtomicU64,
}

impl DefaultOverlapLogger {
    /// Logger with a zeroed report counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlaps seen so far, logged or not.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Render the report for one overlap.
    pub fn report(view: &OverlapView<'_>, claimants: &[RegionId]) -> String {
        let mut s = String::new();
        for (i, &r) in claimants.iter().enumerate() {
            let _ = writeln!(s, "OVERLAP{}: {}", i + 1, view.model.region(r).name);
        }
        let segs = view.segs;
        let (in_d, out_d) = (view.in_dist(), view.out_dist());
        let _ = writeln!(
            s,
            "OVERLAPa: dist=({}, {}) isol={} osol={}",
            in_d,
            out_d,
            view.model.solid(segs.solid(view.partition.in_seg())).name,
            view.model.solid(segs.solid(view.partition.out_seg())).name,
        );
        let pt = view.ray.at(in_d);
        let _ = write!(
            s,
            "OVERLAPb: depth {:.5}mm at ({}, {}, {})",
            out_d - in_d,
            pt.x,
            pt.y,
            pt.z
        );
        s
    }
}

impl OverlapLogger for DefaultOverlapLogger {
    fn log(&self, view: &OverlapView<'_>, claimants: &[RegionId]) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n > 100 {
            if n % 100 != 3 {
                return;
            }
            warn!("(overlaps omitted)");
        }
        warn!("\n{}", Self::report(view, claimants));
    }
}

/// Discards overlap reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOverlapLogger;

impl OverlapLogger for SilentOverlapLogger {
    fn log(&self, _view: &OverlapView<'_>, _claimants: &[RegionId]) {}
}

/// Unordered comparison of two overlap snapshots. Two missing
/// snapshots are equal; a missing and a present one are not.
pub fn overlap_tables_equal(a: Option<&[RegionId]>, b: Option<&[RegionId]>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.len() == b.len() && a.iter().all(|r| b.contains(r)),
        _ => false,
    }
}

/// Reduce `claims` (regions claiming partition `pid` of the input
/// list) to at most one.
///
/// Entries are cleared to `None` as regions lose. On return the caller
/// counts what is left. Returns the region of the previously finalized
/// partition if a plate/volume rule deleted it from the output list.
pub(crate) fn resolve_overlap(
    model: &Model,
    settings: &Settings,
    handler: &dyn OverlapHandler,
    logger: &dyn OverlapLogger,
    state: &mut RayState,
    pid: PartitionId,
    claims: &mut Vec<Option<RegionId>>,
) -> Result<Option<RegionId>> {
    let rules = settings.fastgen;
    let is_mode = |c: Option<RegionId>, mode: FastgenMode| {
        c.map_or(false, |r| model.region(r).fastgen == mode)
    };
    let mut deleted = None;

    let n_fastgen = claims
        .iter()
        .flatten()
        .filter(|&&r| model.region(r).fastgen.is_fastgen())
        .count();
    if n_fastgen >= 2 {
        debug!("{} FASTGEN regions overlap", n_fastgen);
        // Volume against volume; the inner search runs backwards.
        for i in 0..claims.len() {
            if !is_mode(claims[i], FastgenMode::Volume) {
                continue;
            }
            for j in (0..i).rev() {
                if !is_mode(claims[j], FastgenMode::Volume) {
                    continue;
                }
                volume_volume(model, &rules, &state.segs, &state.parts[pid], claims, i, j)?;
                if claims[i].is_none() {
                    break;
                }
            }
        }
        // Plate against volume.
        for i in 0..claims.len() {
            if !is_mode(claims[i], FastgenMode::Plate) {
                continue;
            }
            for j in 0..claims.len() {
                if !is_mode(claims[j], FastgenMode::Volume) {
                    continue;
                }
                if let Some(r) = plate_volume(&rules, state, pid, claims, j) {
                    deleted = Some(r);
                }
            }
        }
        claims.retain(Option::is_some);
    }

    let Some(&Some(first)) = claims.first() else {
        return Ok(deleted);
    };

    if claims.len() > 1 && settings.save_overlaps {
        state.parts[pid].overlap_regions = Some(claims.iter().flatten().copied().collect());
    }

    let contested = contested(model, claims);
    if contested.len() > 1 {
        logger.log(&view(model, state, pid), &contested);
    }

    let mut last = first;
    for i in 1..claims.len() {
        let Some(r) = claims[i] else { continue };
        match pairwise(model, handler, state, pid, last, r) {
            OverlapAction::Drop => {
                debug!("overlap handler dropped partition");
                claims.clear();
                return Ok(deleted);
            }
            OverlapAction::KeepA => claims[i] = None,
            OverlapAction::KeepB => {
                for c in claims.iter_mut() {
                    if *c == Some(last) {
                        *c = None;
                    }
                }
                last = r;
            }
        }
    }
    Ok(deleted)
}

fn pairwise(
    model: &Model,
    handler: &dyn OverlapHandler,
    state: &RayState,
    pid: PartitionId,
    a: RegionId,
    b: RegionId,
) -> OverlapAction {
    let ra = model.region(a);
    let rb = model.region(b);

    match (ra.is_air(), rb.is_air()) {
        (true, false) => return OverlapAction::KeepB,
        (false, true) => return OverlapAction::KeepA,
        (true, true) if ra.aircode == rb.aircode => return OverlapAction::KeepA,
        _ => {}
    }

    if ra.fastgen != rb.fastgen {
        return if ra.fastgen.is_fastgen() {
            OverlapAction::KeepB
        } else {
            OverlapAction::KeepA
        };
    }

    let part = &state.parts[pid];
    let r1 = ra.tree.max_ray_index(part, &state.segs);
    let r2 = rb.tree.max_ray_index(part, &state.segs);
    if r1.map_or(false, |r| r > 0) || r2.map_or(false, |r| r > 0) {
        debug!("overlap along ray bundle: r1={:?} r2={:?}", r1, r2);
        return if r1 < r2 {
            OverlapAction::KeepA
        } else {
            OverlapAction::KeepB
        };
    }

    handler.choose(&view(model, state, pid), a, b)
}

/// Read-only view of partition `pid` of the input list.
pub(crate) fn view<'a>(model: &'a Model, state: &'a RayState, pid: PartitionId) -> OverlapView<'a> {
    OverlapView {
        model,
        ray: &state.ray,
        segs: &state.segs,
        partition: &state.parts[pid],
        previous: state.output.last().map(|id| &state.parts[id]),
    }
}

/// Claimants that survive the fixed pairwise rules: air yields to
/// material, like air collapses to one, FASTGEN yields to conventional.
fn contested(model: &Model, claims: &[Option<RegionId>]) -> Vec<RegionId> {
    let mut left: Vec<RegionId> = claims.iter().flatten().copied().collect();
    if left.iter().any(|&r| !model.region(r).is_air()) {
        left.retain(|&r| !model.region(r).is_air());
    } else {
        let mut seen = Vec::new();
        left.retain(|&r| {
            let code = model.region(r).aircode;
            if seen.contains(&code) {
                false
            } else {
                seen.push(code);
                true
            }
        });
    }
    if left.iter().any(|&r| !model.region(r).fastgen.is_fastgen()) {
        left.retain(|&r| !model.region(r).fastgen.is_fastgen());
    }
    left
}

/// Earliest entry among `region`'s segments in `part`.
fn earliest_entry(
    model: &Model,
    segs: &SegmentStore,
    part: &Partition,
    region: RegionId,
) -> Result<f64> {
    Ok(region_segments(model, segs, part, region)?
        .iter()
        .map(|&s| segs.get(s).in_hit.dist)
        .fold(f64::INFINITY, f64::min))
}

/// Thin overlaps go to the region entered first, thick ones to the
/// region entered last. Clears exactly one of `claims[i]`, `claims[j]`.
fn volume_volume(
    model: &Model,
    rules: &FastgenRules,
    segs: &SegmentStore,
    part: &Partition,
    claims: &mut [Option<RegionId>],
    i: usize,
    j: usize,
) -> Result<()> {
    let (Some(r1), Some(r2)) = (claims[i], claims[j]) else {
        return Ok(());
    };
    let s1 = earliest_entry(model, segs, part, r1)?;
    let s2 = earliest_entry(model, segs, part, r2)?;
    let depth = part.out_dist(segs) - part.in_dist(segs);
    let keep_first = if depth < rules.thin_depth { s1 < s2 } else { s1 >= s2 };
    if keep_first {
        claims[j] = None;
    } else {
        claims[i] = None;
    }
    debug!(
        "FASTGEN volume/volume: {} wins (depth {})",
        model.region(if keep_first { r1 } else { r2 }).name,
        depth
    );
    Ok(())
}

/// The plate always takes the partition. A thin partition of the same
/// volume region ending where the plate begins is removed outright.
fn plate_volume(
    rules: &FastgenRules,
    state: &mut RayState,
    pid: PartitionId,
    claims: &mut [Option<RegionId>],
    j: usize,
) -> Option<RegionId> {
    let vol = claims[j].take()?;
    let prev = state.output.last()?;
    let p_in = state.parts[pid].in_dist(&state.segs);
    let prev_in = state.parts[prev].in_dist(&state.segs);
    let prev_out = state.parts[prev].out_dist(&state.segs);
    if !Tolerance::near_equal_within(prev_out, p_in, rules.gap_tol) {
        return None;
    }
    if state.parts[prev].region == Some(vol) && prev_out - prev_in < rules.thin_depth {
        debug!(
            "FASTGEN plate/volume: removing thin volume partition ({}, {})",
            prev_in, prev_out
        );
        state.parts.remove(&mut state.output, prev);
        return Some(vol);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SolidId;
    use crate::ray::Segment;
    use raybool_ir::{BooleanTree, Geometry, RegionDef};
    use raybool_math::{Point3, Vec3};

    fn model() -> Model {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .solid("c")
            .region(RegionDef::new("air", BooleanTree::solid("a")).with_aircode(1))
            .region(RegionDef::new("steel", BooleanTree::solid("b")))
            .region(RegionDef::new("paint", BooleanTree::solid("c")))
            .region(RegionDef::new("fg", BooleanTree::solid("c")).with_fastgen(FastgenMode::Plate))
            .region(RegionDef::new("va", BooleanTree::solid("a")).with_fastgen(FastgenMode::Volume))
            .region(RegionDef::new("vb", BooleanTree::solid("b")).with_fastgen(FastgenMode::Volume));
        Model::prep(&geom, Tolerance::DEFAULT).unwrap()
    }

    fn overlap_state(model: &Model) -> (RayState, PartitionId) {
        let mut st = RayState::new(Ray::new(Point3::origin(), Vec3::z()), model.solid_count());
        let a = st.add_segment(Segment::new(SolidId(0), 1.0, 2.0));
        let b = st.add_segment(Segment::new(SolidId(1), 1.0, 2.0));
        let c = st.add_segment(Segment::new(SolidId(2), 1.0, 2.0));
        let mut part = Partition::from_segment(a);
        part.add_segment(b);
        part.add_segment(c);
        let pid = st.parts.alloc(part);
        st.parts.push_back(&mut st.input, pid);
        (st, pid)
    }

    /// Resolve `names` over one partition; returns the survivors and the
    /// number of overlap reports.
    fn resolve_logged(model: &Model, names: &[&str], handler: &dyn OverlapHandler) -> (Vec<RegionId>, u64) {
        let (mut st, pid) = overlap_state(model);
        let logger = DefaultOverlapLogger::new();
        let mut claims: Vec<_> = names.iter().map(|n| model.region_id(n)).collect();
        resolve_overlap(model, &Settings::default(), handler, &logger, &mut st, pid, &mut claims).unwrap();
        (claims.into_iter().flatten().collect(), logger.count())
    }

    fn resolve(model: &Model, names: &[&str], handler: &dyn OverlapHandler) -> Vec<RegionId> {
        resolve_logged(model, names, handler).0
    }

    #[test]
    fn test_air_loses_to_material() {
        let m = model();
        let steel = m.region_id("steel").unwrap();
        assert_eq!(resolve(&m, &["air", "steel"], &DefaultOverlap), vec![steel]);
        assert_eq!(resolve(&m, &["steel", "air"], &DefaultOverlap), vec![steel]);
    }

    #[test]
    fn test_conventional_beats_fastgen() {
        let m = model();
        let paint = m.region_id("paint").unwrap();
        assert_eq!(resolve(&m, &["fg", "paint"], &DefaultOverlap), vec![paint]);
    }

    #[test]
    fn test_default_prefers_lower_bit() {
        let m = model();
        let steel = m.region_id("steel").unwrap();
        assert_eq!(resolve(&m, &["paint", "steel"], &DefaultOverlap), vec![steel]);
    }

    #[test]
    fn test_report_only_when_rules_leave_a_contest() {
        let m = model();
        let steel = m.region_id("steel").unwrap();
        let paint = m.region_id("paint").unwrap();
        assert_eq!(resolve_logged(&m, &["air", "steel"], &DefaultOverlap), (vec![steel], 0));
        assert_eq!(resolve_logged(&m, &["fg", "paint"], &DefaultOverlap), (vec![paint], 0));
        assert_eq!(resolve_logged(&m, &["va", "vb"], &DefaultOverlap).1, 0);
        assert_eq!(resolve_logged(&m, &["air", "steel", "paint"], &DefaultOverlap), (vec![steel], 1));
    }

    #[test]
    fn test_closure_handler() {
        let m = model();
        let drop_all = |_: &OverlapView<'_>, _: RegionId, _: RegionId| OverlapAction::Drop;
        assert!(resolve(&m, &["steel", "paint"], &drop_all).is_empty());

        let keep_b = |_: &OverlapView<'_>, _: RegionId, _: RegionId| OverlapAction::KeepB;
        let paint = m.region_id("paint").unwrap();
        assert_eq!(resolve(&m, &["steel", "paint"], &keep_b), vec![paint]);
    }

    #[test]
    fn test_snapshot_saved() {
        let m = model();
        let (mut st, pid) = overlap_state(&m);
        let mut claims: Vec<_> = ["steel", "paint"].iter().map(|n| m.region_id(n)).collect();
        let settings = Settings {
            save_overlaps: true,
            ..Settings::default()
        };
        resolve_overlap(&m, &settings, &DefaultOverlap, &SilentOverlapLogger, &mut st, pid, &mut claims).unwrap();
        let snap = st.parts[pid].overlap_regions.clone().unwrap();
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn test_overlap_tables_equal() {
        let r = [RegionId(0), RegionId(1), RegionId(2)];
        let s = [RegionId(2), RegionId(0), RegionId(1)];
        assert!(overlap_tables_equal(None, None));
        assert!(!overlap_tables_equal(Some(&r), None));
        assert!(overlap_tables_equal(Some(&r), Some(&s)));
        assert!(!overlap_tables_equal(Some(&r[..2]), Some(&s)));
        assert!(!overlap_tables_equal(Some(&r[..2]), Some(&s[..2])));
    }

    #[test]
    fn test_logger_report_and_count() {
        let m = model();
        let (st, pid) = overlap_state(&m);
        let view = OverlapView {
            model: &m,
            ray: &st.ray,
            segs: &st.segs,
            partition: &st.parts[pid],
            previous: None,
        };
        let claimants = [m.region_id("steel").unwrap(), m.region_id("paint").unwrap()];
        let report = DefaultOverlapLogger::report(&view, &claimants);
        assert!(report.contains("OVERLAP1: steel"));
        assert!(report.contains("OVERLAP2: paint"));
        assert!(report.contains("OVERLAPa: dist=(1, 2) isol=a osol=a"));
        assert!(report.contains("OVERLAPb: depth 1.00000mm at (0, 0, 1)"));

        let logger = DefaultOverlapLogger::new();
        for _ in 0..150 {
            logger.log(&view, &claimants);
        }
        assert_eq!(logger.count(), 150);
    }
}

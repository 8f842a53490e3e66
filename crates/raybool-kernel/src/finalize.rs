//! Turning woven partitions into owned, final partitions.

use log::{debug, error, log_enabled, trace, warn, Level};

use crate::booleval::{booleval, BoolValue};
use crate::eligible::partition_eligible;
use crate::error::{BoolError, Result};
use crate::evaluator::Evaluator;
use crate::model::RegionId;
use crate::overlap::{overlap_tables_equal, resolve_overlap, view};
use crate::partition::{describe_partitions, PartitionId};
use crate::resource::{RayState, Resource};

/// Outcome of one finalizer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStatus {
    /// The hit quota is met.
    Satisfied,
    /// Stopped at a partition whose fate depends on cells not yet
    /// traversed.
    NeedMore,
    /// Every input partition was processed without meeting the quota.
    Exhausted,
}

impl Evaluator<'_> {
    /// Finalize input partitions that lie within the traversed extent
    /// ending at `end`.
    ///
    /// Claimed partitions move from `res.state.input` to
    /// `res.state.output`, merging with the last output partition when
    /// they continue it. Unclaimed partitions stay on the input list.
    pub fn finalize(&self, res: &mut Resource, start: f64, end: f64) -> Result<FinalizeStatus> {
        let status = self.finalize_pass(res, end)?;
        if log_enabled!(Level::Trace) {
            let st = &res.state;
            trace!(
                "finalize({}, {}) -> {:?}\n{}{}",
                start,
                end,
                status,
                describe_partitions(self.model, &st.segs, &st.parts, &st.output, "final"),
                describe_partitions(self.model, &st.segs, &st.parts, &st.input, "pending"),
            );
        }
        Ok(status)
    }

    fn counts_toward_quota(&self, region: Option<RegionId>) -> bool {
        !(self.settings.onehit < 0 && region.map_or(false, |r| self.model.region(r).is_air()))
    }

    fn finalize_pass(&self, res: &mut Resource, end: f64) -> Result<FinalizeStatus> {
        let model = self.model;
        let tol = model.tol();
        let onehit = self.settings.onehit;
        let Resource {
            state,
            stack,
            table,
            claims,
        } = res;

        if end <= 0.0 {
            trace!("not done, behind start point");
            return Ok(FinalizeStatus::NeedMore);
        }

        let hits_needed = onehit.unsigned_abs() as usize;
        let mut hits_avail = 0usize;
        if onehit != 0 {
            for id in state.parts.iter(&state.output) {
                let p = &state.parts[id];
                if p.in_dist(&state.segs) < 0.0 || !self.counts_toward_quota(p.region) {
                    continue;
                }
                hits_avail += 2;
            }
            if hits_avail >= hits_needed {
                return Ok(FinalizeStatus::Satisfied);
            }
        }

        if self.settings.no_booleans {
            self.finalize_unevaluated(state);
            return Ok(FinalizeStatus::Exhausted);
        }

        let mut cur = state.input.first();
        while let Some(pid) = cur {
            let next = state.parts[pid].next();
            let in_hit = state.parts[pid].in_hit;
            let out_hit = state.parts[pid].out_hit;

            let in_d = state.segs.dist(in_hit);
            if tol.near_equal(in_d, state.segs.dist(out_hit)) {
                state.segs.set_dist(out_hit, in_d);
            }
            let out_d = state.segs.dist(out_hit);

            if in_d > out_d {
                warn!("inverted partition ({}, {})", in_d, out_d);
            }
            if let Some(next) = next {
                let next_in = state.parts[next].in_hit;
                let diff = out_d - state.segs.dist(next_in);
                if diff != 0.0 {
                    if tol.near_zero(diff) {
                        trace!("fusing adjacent partitions at {}", out_d);
                        state.segs.set_dist(next_in, out_d);
                    } else if diff > 0.0 {
                        let next_in_dist = state.segs.dist(next_in);
                        error!(
                            "sorting defect: {} > {}\n{}",
                            out_d,
                            next_in_dist,
                            describe_partitions(model, &state.segs, &state.parts, &state.input, "with defect")
                        );
                        return Err(BoolError::SortingDefect {
                            out_dist: out_d,
                            next_in_dist,
                        });
                    }
                }
            }

            if out_d < tol.dist {
                trace!("discarding partition behind ray start, out={}", out_d);
                state.parts.remove(&mut state.input, pid);
                cur = next;
                continue;
            }

            if in_d - end > tol.dist {
                trace!("partition begins beyond current extent");
                return Ok(FinalizeStatus::NeedMore);
            }

            let indefinite = out_d - end > tol.dist;
            if indefinite && onehit != 1 {
                trace!("partition ends beyond current extent");
                return Ok(FinalizeStatus::NeedMore);
            }

            table.build(model, &state.segs, &state.parts[pid])?;

            if indefinite && !partition_eligible(model, table, &state.solids_shot) {
                trace!("partition not yet eligible for evaluation");
                return Ok(FinalizeStatus::NeedMore);
            }

            claims.clear();
            let mut guard = false;
            for &r in table.as_slice() {
                let region = model.region(r);
                if region.all_unions {
                    claims.push(Some(r));
                    continue;
                }
                match booleval(&region.tree, &state.parts[pid], &state.segs, stack) {
                    BoolValue::False => {}
                    BoolValue::True => claims.push(Some(r)),
                    BoolValue::Guard => {
                        debug!("XOR guard tripped in region {}", region.name);
                        guard = true;
                        claims.push(Some(r));
                    }
                }
            }

            if guard {
                let found: Vec<RegionId> = claims.iter().flatten().copied().collect();
                self.logger.log(&view(model, state, pid), &found);
                state.parts.remove(&mut state.input, pid);
                cur = next;
                continue;
            }

            if claims.is_empty() {
                cur = next;
                continue;
            }

            if claims.len() > 1 {
                let deleted = resolve_overlap(
                    model,
                    &self.settings,
                    self.handler.as_ref(),
                    self.logger.as_ref(),
                    state,
                    pid,
                    claims,
                )?;
                if let Some(r) = deleted {
                    if self.counts_toward_quota(Some(r)) {
                        hits_avail = hits_avail.saturating_sub(2);
                    }
                }
                claims.retain(Option::is_some);
                if claims.len() > 1 {
                    let found: Vec<RegionId> = claims.iter().flatten().copied().collect();
                    self.logger.log(&view(model, state, pid), &found);
                    error!("overlap not resolved among {} regions, discarding partition", found.len());
                }
                if claims.len() != 1 {
                    state.parts.remove(&mut state.input, pid);
                    cur = next;
                    continue;
                }
            }

            let Some(&Some(region)) = claims.first() else {
                cur = next;
                continue;
            };
            if self.emit(state, pid, region) && self.counts_toward_quota(Some(region)) {
                hits_avail += 2;
            }

            if onehit != 0 && hits_avail >= hits_needed {
                return Ok(FinalizeStatus::Satisfied);
            }
            cur = next;
        }

        if onehit != 0 && hits_avail >= hits_needed {
            Ok(FinalizeStatus::Satisfied)
        } else {
            Ok(FinalizeStatus::Exhausted)
        }
    }

    /// Move `pid` to the output list owned by `region`. Returns false
    /// when it was merged into the last output partition instead.
    fn emit(&self, state: &mut RayState, pid: PartitionId, region: RegionId) -> bool {
        let tol = self.model.tol();
        state.parts.unlink(&mut state.input, pid);
        state.parts[pid].region = Some(region);

        if let Some(last) = state.output.last() {
            let (prev, new) = (&state.parts[last], &state.parts[pid]);
            let continues = prev.region == Some(region)
                && tol.near_equal(new.in_dist(&state.segs), prev.out_dist(&state.segs))
                && (!self.settings.save_overlaps
                    || overlap_tables_equal(
                        prev.overlap_regions.as_deref(),
                        new.overlap_regions.as_deref(),
                    ));
            if continues {
                trace!("extending last final partition");
                let new = state.parts[pid].clone();
                let prev = &mut state.parts[last];
                prev.out_hit = new.out_hit;
                prev.out_flip = new.out_flip;
                for &seg in new.segments() {
                    prev.add_segment(seg);
                }
                state.parts.free(pid);
                return false;
            }
        }
        state.parts.push_back(&mut state.output, pid);
        true
    }

    /// Boolean-free mode: every partition goes to the first region of
    /// its entry solid.
    fn finalize_unevaluated(&self, state: &mut RayState) {
        while let Some(pid) = state.input.first() {
            state.parts.unlink(&mut state.input, pid);
            let solid = state.segs.solid(state.parts[pid].in_seg());
            match self.model.regions_of(solid).first() {
                Some(&region) => {
                    state.parts[pid].region = Some(region);
                    state.parts.push_back(&mut state.output, pid);
                }
                None => {
                    debug!(
                        "solid {} belongs to no region, dropping partition",
                        self.model.solid(solid).name
                    );
                    state.parts.free(pid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, SolidId};
    use crate::ray::{Ray, Segment};
    use crate::settings::Settings;
    use raybool_ir::{BooleanTree, Geometry, RegionDef};
    use raybool_math::{Point3, Tolerance, Vec3};

    fn model() -> Model {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .solid("c")
            .region(RegionDef::new("ra", BooleanTree::solid("a")))
            .region(RegionDef::new("rb", BooleanTree::solid("b")))
            .region(RegionDef::new(
                "rc",
                BooleanTree::subtract(BooleanTree::solid("c"), BooleanTree::solid("a")),
            ));
        Model::prep(&geom, Tolerance::DEFAULT).unwrap()
    }

    fn load(ev: &Evaluator<'_>, res: &mut Resource, segs: &[(usize, f64, f64)]) {
        res.reset(Ray::new(Point3::origin(), Vec3::x()), ev.model().solid_count());
        let ids: Vec<_> = segs
            .iter()
            .map(|&(s, a, b)| res.state.add_segment(Segment::new(SolidId(s), a, b)))
            .collect();
        res.state.solids_shot.set_all();
        ev.weave(res, &ids).unwrap();
    }

    fn output(res: &Resource, model: &Model) -> Vec<(f64, f64, String)> {
        let st = &res.state;
        st.parts
            .iter(&st.output)
            .map(|id| {
                let p = &st.parts[id];
                (
                    p.in_dist(&st.segs),
                    p.out_dist(&st.segs),
                    model.region(p.region.unwrap()).name.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn test_claims_and_subtraction() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        // c minus a leaves (4, 6).
        load(&ev, &mut res, &[(2, 2.0, 6.0), (0, 0.0, 4.0)]);
        let status = ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap();
        assert_eq!(status, FinalizeStatus::Exhausted);
        assert_eq!(
            output(&res, &m),
            vec![(0.0, 4.0, "ra".to_string()), (4.0, 6.0, "rc".to_string())]
        );
        assert!(res.state.input.is_empty());
    }

    #[test]
    fn test_need_more_beyond_extent() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        load(&ev, &mut res, &[(0, 1.0, 2.0), (1, 10.0, 12.0)]);
        let status = ev.finalize(&mut res, -2.0, 5.0).unwrap();
        assert_eq!(status, FinalizeStatus::NeedMore);
        assert_eq!(output(&res, &m).len(), 1);
        assert_eq!(res.state.input.len(), 1);

        assert_eq!(ev.finalize(&mut res, -2.0, 0.0).unwrap(), FinalizeStatus::NeedMore);
    }

    #[test]
    fn test_behind_start_is_discarded() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        load(&ev, &mut res, &[(0, -5.0, -1.0), (1, 1.0, 2.0)]);
        ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap();
        assert_eq!(output(&res, &m), vec![(1.0, 2.0, "rb".to_string())]);
        assert!(res.state.input.is_empty());
    }

    #[test]
    fn test_onehit_quota() {
        let m = model();
        let ev = Evaluator::with_settings(&m, Settings::onehit(1)).unwrap();
        let mut res = ev.resource();
        load(&ev, &mut res, &[(0, 1.0, 2.0), (1, 3.0, 4.0)]);
        let status = ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap();
        assert_eq!(status, FinalizeStatus::Satisfied);
        assert_eq!(output(&res, &m).len(), 1);
        // Already satisfied on entry.
        assert_eq!(
            ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap(),
            FinalizeStatus::Satisfied
        );
    }

    #[test]
    fn test_sorting_defect_is_fatal() {
        let m = model();
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        load(&ev, &mut res, &[(0, 1.0, 2.0), (1, 3.0, 4.0)]);
        let first = res.state.input.first().unwrap();
        let out = res.state.parts[first].out_hit;
        res.state.segs.set_dist(out, 3.5);
        let err = ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap_err();
        assert_eq!(
            err,
            BoolError::SortingDefect {
                out_dist: 3.5,
                next_in_dist: 3.0
            }
        );
    }

    #[test]
    fn test_no_booleans_assigns_first_region() {
        let m = model();
        let settings = Settings {
            no_booleans: true,
            ..Settings::default()
        };
        let ev = Evaluator::with_settings(&m, settings).unwrap();
        let mut res = ev.resource();
        load(&ev, &mut res, &[(2, 2.0, 6.0), (0, 0.0, 4.0)]);
        assert_eq!(
            ev.finalize(&mut res, -2.0, f64::INFINITY).unwrap(),
            FinalizeStatus::Exhausted
        );
        assert_eq!(
            output(&res, &m),
            vec![(0.0, 4.0, "ra".to_string()), (2.0, 6.0, "rc".to_string())]
        );
    }
}

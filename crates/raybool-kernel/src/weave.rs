//! Weaving segments into the sorted partition list.
//!
//! Each partition edge is the entry or exit hit of some segment. A new
//! segment is folded in by walking the list once, splitting partitions
//! where the segment starts or ends inside them and fusing any pair of
//! boundaries closer than the distance tolerance into one exact value.
//!
//! Edge flips are recorded, never applied: an `out_flip` edge and the
//! following `in_flip` edge may be the very same hit.

use log::{debug, log_enabled, trace, warn, Level};
use raybool_math::Tolerance;

use crate::error::{BoolError, Result};
use crate::model::Model;
use crate::partition::{describe_partitions, Partition, PartitionArena, PartitionId, PartitionList};
use crate::ray::{HitRef, SegmentId, SegmentStore};
use crate::resource::RayState;
use crate::settings::Settings;

/// Weave `pending` (already stored in `state.segs`) into `state.input`.
///
/// Defective, inside-out and far-behind segments are logged and
/// skipped. Returns an error only when an invariant is broken.
pub fn weave(
    model: &Model,
    settings: &Settings,
    state: &mut RayState,
    pending: &[SegmentId],
) -> Result<()> {
    let mut weaver = Weaver {
        model,
        settings,
        tol: model.tol(),
        segs: &mut state.segs,
        parts: &mut state.parts,
        list: &mut state.input,
    };
    weaver.check_order()?;
    for &seg in pending {
        weaver.weave_segment(seg)?;
    }
    if log_enabled!(Level::Trace) {
        trace!(
            "{}",
            describe_partitions(model, &state.segs, &state.parts, &state.input, "after weave")
        );
    }
    Ok(())
}

enum Flow {
    /// Segment fully consumed.
    Done,
    /// Segment continues past the partition; resume from this hit.
    Resume(HitRef),
}

struct Weaver<'a> {
    model: &'a Model,
    settings: &'a Settings,
    tol: Tolerance,
    segs: &'a mut SegmentStore,
    parts: &'a mut PartitionArena,
    list: &'a mut PartitionList,
}

impl Weaver<'_> {
    #[inline]
    fn in_of(&self, id: PartitionId) -> f64 {
        self.parts[id].in_dist(self.segs)
    }

    #[inline]
    fn out_of(&self, id: PartitionId) -> f64 {
        self.parts[id].out_dist(self.segs)
    }

    fn check_order(&self) -> Result<()> {
        let mut cur = self.list.first();
        while let Some(id) = cur {
            let next = self.parts[id].next();
            if let Some(next) = next {
                let (prev_key, next_in) = if self.settings.no_booleans {
                    (self.in_of(id), self.in_of(next))
                } else {
                    (self.out_of(id), self.in_of(next))
                };
                if prev_key - next_in > self.tol.dist {
                    return Err(BoolError::UnsortedPartitions {
                        out_dist: prev_key,
                        next_in_dist: next_in,
                    });
                }
            }
            cur = next;
        }
        Ok(())
    }

    fn new_partition(&mut self, seg: SegmentId) -> PartitionId {
        self.parts.alloc(Partition::from_segment(seg))
    }

    fn weave_segment(&mut self, seg: SegmentId) -> Result<()> {
        let solid = self.segs.solid(seg);
        if solid.0 >= self.model.solid_count() {
            return Err(BoolError::SolidOutOfRange {
                solid: solid.0,
                count: self.model.solid_count(),
            });
        }

        {
            let tol = self.tol;
            let s = self.segs.get_mut(seg);
            if tol.near_zero(s.in_hit.dist) {
                s.in_hit.dist = 0.0;
            }
            if tol.near_zero(s.out_hit.dist) {
                s.out_hit.dist = 0.0;
            }
        }
        let s = *self.segs.get(seg);
        let name = &self.model.solid(solid).name;

        if s.out_hit.dist < self.settings.behind_dist {
            return Ok(());
        }

        let inf = self.settings.infinity;
        if !self.model.solid(solid).infinite
            && !(s.in_hit.dist >= -inf && s.out_hit.dist <= inf)
        {
            warn!(
                "defective segment {} ({:.18e}, {:.18e}) {}, {}",
                name, s.in_hit.dist, s.out_hit.dist, s.in_hit.surfno, s.out_hit.surfno
            );
            return Ok(());
        }
        if s.in_hit.dist > s.out_hit.dist {
            warn!(
                "inside-out segment {} ({:.18e}, {:.18e}) {}, {}",
                name, s.in_hit.dist, s.out_hit.dist, s.in_hit.surfno, s.out_hit.surfno
            );
            return Ok(());
        }

        let Some(tail) = self.list.last() else {
            let id = self.new_partition(seg);
            self.parts.push_back(self.list, id);
            trace!("no partitions yet, segment forms the first one");
            return Ok(());
        };

        if self.settings.no_booleans {
            self.insert_sorted(seg);
            return Ok(());
        }

        if self.tol.near_zero(s.in_hit.dist - s.out_hit.dist) {
            return self.weave_zero_thickness(seg);
        }

        if s.in_hit.dist >= self.out_of(tail) {
            let id = self.new_partition(seg);
            self.parts.push_back(self.list, id);
            trace!("segment starts beyond last partition end, appending");
            return Ok(());
        }

        self.weave_overlapping(seg);
        Ok(())
    }

    /// Sort by entry distance only; partitions may overlap.
    fn insert_sorted(&mut self, seg: SegmentId) {
        let in_dist = self.segs.get(seg).in_hit.dist;
        let id = self.new_partition(seg);
        let mut cur = self.list.first();
        while let Some(pp) = cur {
            if in_dist < self.in_of(pp) {
                self.parts.insert_before(self.list, id, pp);
                return;
            }
            cur = self.parts[pp].next();
        }
        self.parts.push_back(self.list, id);
    }

    /// A segment whose entry and exit coincide within tolerance.
    ///
    /// It becomes a partition of its own only when it lies in a gap
    /// between partitions. Touching or inside an existing partition it
    /// is a pass-through (tangent, wire edge) and is dropped.
    fn weave_zero_thickness(&mut self, seg: SegmentId) -> Result<()> {
        let s = *self.segs.get(seg);
        let (in_d, out_d) = (s.in_hit.dist, s.out_hit.dist);
        debug!(
            "zero thickness segment {} ({:.18e}, {:.18e}) {}, {}",
            self.model.solid(s.solid).name,
            in_d,
            out_d,
            s.in_hit.surfno,
            s.out_hit.surfno
        );

        let first = self.list.first().ok_or(BoolError::ZeroThicknessEmptyList)?;
        if out_d < self.in_of(first) {
            let id = self.new_partition(seg);
            self.parts.push_front(self.list, id);
            trace!("zero thickness segment ends before the first partition");
            return Ok(());
        }

        let tol = self.tol;
        let mut cur = Some(first);
        while let Some(pp) = cur {
            let (p_in, p_out) = (self.in_of(pp), self.out_of(pp));
            if tol.near_equal(in_d, p_in) || tol.near_equal(out_d, p_in) {
                trace!("zero thickness segment at partition start, dropped");
                return Ok(());
            }
            if tol.near_equal(in_d, p_out) || tol.near_equal(out_d, p_out) {
                trace!("zero thickness segment at partition end, dropped");
                return Ok(());
            }
            if out_d <= p_out && in_d >= p_in {
                trace!("zero thickness segment inside partition, dropped");
                return Ok(());
            }
            let next = self.parts[pp].next();
            let before_next = match next {
                None => true,
                Some(n) => out_d < self.in_of(n),
            };
            if before_next {
                let id = self.new_partition(seg);
                self.parts.insert_after(self.list, id, pp);
                trace!("zero thickness segment between partitions");
                return Ok(());
            }
            cur = next;
        }
        Err(BoolError::ZeroThicknessFallthrough(in_d))
    }

    /// The general case: the segment starts before the last partition
    /// ends. `last` tracks where the unconsumed rest of the segment
    /// begins; it moves forward as the segment is woven in.
    fn weave_overlapping(&mut self, seg: SegmentId) {
        let tol = self.tol.dist;
        let mut last = HitRef::entry(seg);
        let mut last_flip = false;

        let mut cur = self.list.first();
        while let Some(pp) = cur {
            let last_d = self.segs.dist(last);
            let p_out = self.out_of(pp);

            let diff_se = last_d - p_out;
            if diff_se > tol {
                // Segment starts beyond the end of this partition.
                cur = self.parts[pp].next();
                continue;
            }
            let diff = last_d - self.in_of(pp);
            if diff_se > -tol && diff > tol {
                // Starts at the partition end: fuse and move on.
                self.segs.set_dist(last, p_out);
                trace!("segment start fused to partition end, diff={}", diff);
                cur = self.parts[pp].next();
                continue;
            }

            let flow = if diff > tol {
                // Starts inside the partition: split it at the segment start.
                let mut front = self.parts[pp].duplicate();
                front.out_hit = HitRef::entry(seg);
                front.out_flip = true;
                {
                    let p = &mut self.parts[pp];
                    p.in_hit = HitRef::entry(seg);
                    p.in_flip = false;
                }
                let id = self.parts.alloc(front);
                self.parts.insert_before(self.list, id, pp);
                trace!("segment starts within partition, split, diff={}", diff);
                self.equal_start(seg, pp)
            } else if diff > -tol {
                // Same start within tolerance. Prefer the segment's own
                // entry if it is nearer and does not cross the previous
                // partition.
                let seg_in = self.segs.get(seg).in_hit.dist;
                let d = seg_in - self.in_of(pp);
                let clear_of_prev = match self.parts[pp].prev() {
                    None => true,
                    Some(prev) => self.out_of(prev) <= seg_in,
                };
                if clear_of_prev && self.tol.near_zero(d) && d < 0.0 {
                    let p = &mut self.parts[pp];
                    p.in_hit = HitRef::entry(seg);
                    p.in_flip = false;
                }
                self.equal_start(seg, pp)
            } else {
                // Starts before the partition, after the previous one.
                let mut front = Partition::from_segment(seg);
                front.in_hit = last;
                front.in_flip = last_flip;
                let p_in = self.in_of(pp);
                let d = self.segs.get(seg).out_hit.dist - p_in;
                if d < -tol {
                    // Entirely in the gap.
                    front.out_hit = HitRef::exit(seg);
                    let id = self.parts.alloc(front);
                    self.parts.insert_before(self.list, id, pp);
                    trace!("segment between two partitions");
                    Flow::Done
                } else if d < tol {
                    // Ends at the partition start: fuse.
                    front.out_hit = HitRef::exit(seg);
                    self.segs.set_dist(HitRef::exit(seg), p_in);
                    let id = self.parts.alloc(front);
                    self.parts.insert_before(self.list, id, pp);
                    trace!("segment ends at partition start, fused");
                    Flow::Done
                } else {
                    let p_in_hit = self.parts[pp].in_hit;
                    front.out_hit = p_in_hit;
                    front.out_flip = true;
                    let id = self.parts.alloc(front);
                    self.parts.insert_before(self.list, id, pp);
                    trace!("segment starts before partition and runs into it");
                    self.equal_start(seg, pp)
                }
            };

            match flow {
                Flow::Done => return,
                Flow::Resume(hit) => {
                    last = hit;
                    last_flip = true;
                }
            }
            cur = self.parts[pp].next();
        }

        // Remainder beyond the end of the last partition.
        let mut tail = Partition::from_segment(seg);
        tail.in_hit = last;
        tail.in_flip = last_flip;
        let id = self.parts.alloc(tail);
        self.parts.push_back(self.list, id);
        trace!("segment extends beyond the last partition");
    }

    /// Segment and partition `pp` start together (after any fusing).
    fn equal_start(&mut self, seg: SegmentId, pp: PartitionId) -> Flow {
        let tol = self.tol.dist;
        let diff = self.segs.get(seg).out_hit.dist - self.out_of(pp);
        if diff > tol {
            // Segment spans the partition and continues past it.
            let p = &mut self.parts[pp];
            p.add_segment(seg);
            Flow::Resume(p.out_hit)
        } else if diff > -tol {
            self.parts[pp].add_segment(seg);
            Flow::Done
        } else {
            // Segment ends inside the partition: split at the segment end.
            let mut front = self.parts[pp].duplicate();
            front.add_segment(seg);
            front.out_hit = HitRef::exit(seg);
            front.out_flip = false;
            {
                let p = &mut self.parts[pp];
                p.in_hit = HitRef::exit(seg);
                p.in_flip = true;
            }
            let id = self.parts.alloc(front);
            self.parts.insert_before(self.list, id, pp);
            Flow::Done
        }
    }
}

//! Splitting resolved overlaps back out into one partition per claimant.

use log::trace;
use raybool_ir::FastgenMode;

use crate::model::{Model, RegionId};
use crate::partition::PartitionId;
use crate::resource::RayState;

/// Rework the output list of `state` so that every region recorded in
/// an overlap snapshot owns a partition of its own.
///
/// A claimant extends an open partition it already owns when one
/// exists; otherwise it takes over the contested partition, or a copy
/// linked right after it. A partition with no snapshot extends an open
/// partition of its own region that it touches. With `plates_only`,
/// only FASTGEN plate-mode regions are rebuilt and any other partition
/// closes everything open.
///
/// Requires overlap snapshots, i.e. `Settings::save_overlaps`.
pub fn rebuild_overlaps(model: &Model, state: &mut RayState, plates_only: bool) {
    let is_plate = |r: Option<RegionId>| r.map_or(false, |r| model.region(r).fastgen == FastgenMode::Plate);
    let mut open: Vec<Option<PartitionId>> = Vec::new();
    let mut cur = state.output.first();

    while let Some(pp) = cur {
        let next = state.parts[pp].next();

        if plates_only && !is_plate(state.parts[pp].region) {
            open.clear();
            cur = next;
            continue;
        }

        let mut claims: Option<Vec<Option<RegionId>>> = state.parts[pp]
            .overlap_regions
            .take()
            .map(|v| v.into_iter().map(Some).collect());
        let mut alive = true;

        for slot in open.iter_mut() {
            if !alive {
                break;
            }
            let Some(op) = *slot else {
                continue;
            };
            let open_region = state.parts[op].region;
            let mut keep_open = false;

            match claims.as_mut() {
                Some(claims) => {
                    for claim in claims.iter_mut() {
                        if claim.is_some() && *claim == open_region {
                            extend(state, op, pp);
                            if state.parts[pp].region == *claim {
                                state.parts[pp].region = None;
                            }
                            *claim = None;
                            keep_open = true;
                        }
                    }
                }
                None => {
                    let touches = state.parts[pp].in_dist(&state.segs) <= state.parts[op].out_dist(&state.segs);
                    if state.parts[pp].region == open_region && touches {
                        extend(state, op, pp);
                        state.parts.remove(&mut state.output, pp);
                        alive = false;
                        keep_open = true;
                    }
                }
            }

            if !keep_open {
                *slot = None;
            }
        }

        if alive {
            if let Some(claims) = claims.as_ref() {
                if claims.iter().all(Option::is_none) {
                    trace!("rebuild: every claim absorbed, dropping partition");
                    state.parts.remove(&mut state.output, pp);
                    alive = false;
                }
            }
        }

        if alive {
            match claims {
                Some(claims) => {
                    let mut curr = pp;
                    for region in claims.into_iter().flatten() {
                        if plates_only && !is_plate(Some(region)) {
                            continue;
                        }
                        let owner = state.parts[pp].region;
                        if owner.is_none() || owner == Some(region) {
                            state.parts[pp].region = Some(region);
                            open.push(Some(pp));
                        } else {
                            let mut dup = state.parts[pp].duplicate();
                            dup.region = Some(region);
                            let id = state.parts.alloc(dup);
                            state.parts.insert_after(&mut state.output, id, curr);
                            open.push(Some(id));
                            curr = id;
                        }
                    }
                }
                None => {
                    if !plates_only || is_plate(state.parts[pp].region) {
                        open.push(Some(pp));
                    }
                }
            }
        }

        cur = next;
    }
}

/// Stretch `open` to end where `pp` ends and take over its segments.
fn extend(state: &mut RayState, open: PartitionId, pp: PartitionId) {
    let src = &state.parts[pp];
    let (out_hit, out_flip, segs) = (src.out_hit, src.out_flip, src.segments().to_vec());
    let dst = &mut state.parts[open];
    dst.out_hit = out_hit;
    dst.out_flip = out_flip;
    for seg in segs {
        dst.add_segment(seg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::model::SolidId;
    use crate::ray::{Ray, Segment};
    use crate::settings::Settings;
    use crate::shoot::{CellList, HitPartition};
    use raybool_ir::{BooleanTree, Geometry, RegionDef};
    use raybool_math::{Point3, Tolerance, Vec3};

    fn model(fastgen: FastgenMode) -> Model {
        let geom = Geometry::new()
            .solid("a")
            .solid("b")
            .region(RegionDef::new("ra", BooleanTree::solid("a")).with_fastgen(fastgen))
            .region(RegionDef::new("rb", BooleanTree::solid("b")).with_fastgen(fastgen));
        Model::prep(&geom, Tolerance::DEFAULT).unwrap()
    }

    fn shoot_overlap(m: &Model) -> crate::Resource {
        let settings = Settings {
            save_overlaps: true,
            ..Settings::default()
        };
        let ev = Evaluator::with_settings(m, settings).unwrap();
        let mut res = ev.resource();
        let mut cells = CellList::single(
            &[SolidId(0), SolidId(1)],
            vec![Segment::new(SolidId(0), 0.0, 5.0), Segment::new(SolidId(1), 2.0, 8.0)],
        );
        let ray = Ray::new(Point3::origin(), Vec3::z());
        ev.shoot(&mut res, ray, &mut cells).unwrap();
        res
    }

    fn spans(m: &Model, state: &RayState) -> Vec<(f64, f64, String)> {
        HitPartition::collect(state)
            .iter()
            .map(|h| (h.in_dist, h.out_dist, h.region_name(m).unwrap_or("-").to_string()))
            .collect()
    }

    #[test]
    fn test_overlap_split_per_claimant() {
        let m = model(FastgenMode::NonFastgen);
        let mut res = shoot_overlap(&m);
        assert_eq!(
            spans(&m, &res.state),
            vec![
                (0.0, 2.0, "ra".to_string()),
                (2.0, 5.0, "ra".to_string()),
                (5.0, 8.0, "rb".to_string()),
            ]
        );

        rebuild_overlaps(&m, &mut res.state, false);
        assert_eq!(
            spans(&m, &res.state),
            vec![(0.0, 5.0, "ra".to_string()), (2.0, 8.0, "rb".to_string())]
        );
        assert!(res.state.parts.iter(&res.state.output).all(|id| res.state.parts[id].overlap_regions.is_none()));
    }

    #[test]
    fn test_plates_only_skips_conventional_regions() {
        let m = model(FastgenMode::NonFastgen);
        let mut res = shoot_overlap(&m);
        let before = spans(&m, &res.state);
        rebuild_overlaps(&m, &mut res.state, true);
        assert_eq!(spans(&m, &res.state), before);
    }

    #[test]
    fn test_untouched_without_snapshots() {
        let m = model(FastgenMode::NonFastgen);
        let ev = Evaluator::new(&m);
        let mut res = ev.resource();
        let mut cells = CellList::single(
            &[SolidId(0), SolidId(1)],
            vec![Segment::new(SolidId(0), 0.0, 1.0), Segment::new(SolidId(1), 3.0, 4.0)],
        );
        ev.shoot(&mut res, Ray::new(Point3::origin(), Vec3::z()), &mut cells).unwrap();
        rebuild_overlaps(&m, &mut res.state, false);
        assert_eq!(
            spans(&m, &res.state),
            vec![(0.0, 1.0, "ra".to_string()), (3.0, 4.0, "rb".to_string())]
        );
    }
}

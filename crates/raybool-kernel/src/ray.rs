//! Rays, hits and the segments primitive intersection produces.

use raybool_math::{Dir3, Point3, Vec3};
use slotmap::{new_key_type, SlotMap};

use crate::model::SolidId;

/// A ray in 3D space defined by origin and direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Point3,
    /// Unit direction of the ray.
    pub direction: Dir3,
    /// Index within a ray bundle; 0 is the main ray.
    pub index: usize,
}

impl Ray {
    /// Create a new main ray from origin and direction.
    ///
    /// The direction will be normalized.
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: Dir3::new_normalize(direction),
            index: 0,
        }
    }

    /// Same ray with a bundle index.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Evaluate the ray at parameter `t`: `origin + t * direction`.
    #[inline]
    pub fn at(&self, t: f64) -> Point3 {
        self.origin + t * self.direction.as_ref()
    }
}

/// One ray/surface crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Parametric distance along the ray.
    pub dist: f64,
    /// Surface (face) number on the solid.
    pub surfno: i32,
    /// Bundle index of the ray that produced the hit.
    pub ray: usize,
}

impl Hit {
    /// Hit on the main ray.
    pub fn new(dist: f64, surfno: i32) -> Self {
        Self { dist, surfno, ray: 0 }
    }
}

/// Entry/exit pair for one ray crossing one solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Solid that was crossed.
    pub solid: SolidId,
    /// Entry hit.
    pub in_hit: Hit,
    /// Exit hit.
    pub out_hit: Hit,
}

impl Segment {
    /// Segment on the main ray with surface numbers 0 (entry) and 1 (exit).
    pub fn new(solid: SolidId, in_dist: f64, out_dist: f64) -> Self {
        Self {
            solid,
            in_hit: Hit::new(in_dist, 0),
            out_hit: Hit::new(out_dist, 1),
        }
    }

    /// Same segment attributed to a bundle ray.
    pub fn on_ray(mut self, ray: usize) -> Self {
        self.in_hit.ray = ray;
        self.out_hit.ray = ray;
        self
    }

    /// Hit on one side of the segment.
    #[inline]
    pub fn hit(&self, side: HitSide) -> &Hit {
        match side {
            HitSide::In => &self.in_hit,
            HitSide::Out => &self.out_hit,
        }
    }

    #[inline]
    fn hit_mut(&mut self, side: HitSide) -> &mut Hit {
        match side {
            HitSide::In => &mut self.in_hit,
            HitSide::Out => &mut self.out_hit,
        }
    }
}

new_key_type! {
    /// Handle of a segment in a [`SegmentStore`].
    pub struct SegmentId;
}

/// Which end of a segment a hit handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitSide {
    /// The entry hit.
    In,
    /// The exit hit.
    Out,
}

/// Handle of one hit inside a stored segment.
///
/// Partition boundaries are hit handles, not copies: fusing a boundary
/// writes through to the segment, so every partition sharing that hit
/// sees the same distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitRef {
    /// Owning segment.
    pub seg: SegmentId,
    /// Entry or exit.
    pub side: HitSide,
}

impl HitRef {
    /// Entry hit of `seg`.
    pub fn entry(seg: SegmentId) -> Self {
        Self {
            seg,
            side: HitSide::In,
        }
    }

    /// Exit hit of `seg`.
    pub fn exit(seg: SegmentId) -> Self {
        Self {
            seg,
            side: HitSide::Out,
        }
    }
}

/// Per-ray arena owning every segment woven so far.
#[derive(Debug, Default, Clone)]
pub struct SegmentStore {
    segs: SlotMap<SegmentId, Segment>,
}

impl SegmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a segment.
    pub fn insert(&mut self, seg: Segment) -> SegmentId {
        self.segs.insert(seg)
    }

    /// Segment by handle.
    ///
    /// Handles are only minted by this store and segments are never
    /// removed before [`SegmentStore::clear`], so lookups always succeed
    /// for handles of the current ray.
    #[inline]
    pub fn get(&self, id: SegmentId) -> &Segment {
        &self.segs[id]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segs[id]
    }

    /// The hit a handle refers to.
    #[inline]
    pub fn hit(&self, r: HitRef) -> &Hit {
        self.segs[r.seg].hit(r.side)
    }

    /// Distance of the hit a handle refers to.
    #[inline]
    pub fn dist(&self, r: HitRef) -> f64 {
        self.hit(r).dist
    }

    /// Move a boundary. Every partition sharing the hit moves with it.
    #[inline]
    pub fn set_dist(&mut self, r: HitRef, dist: f64) {
        self.segs[r.seg].hit_mut(r.side).dist = dist;
    }

    /// Solid a segment belongs to.
    #[inline]
    pub fn solid(&self, id: SegmentId) -> SolidId {
        self.segs[id].solid
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        self.segs.len()
    }

    /// True when no segment has been stored.
    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Drop every segment, keeping the allocation for the next ray.
    pub fn clear(&mut self) {
        self.segs.clear();
    }
}

//! Per-thread scratch state.
//!
//! Everything mutable during evaluation lives here. A [`Resource`] is
//! owned by exactly one worker and reused across rays, so the hot loop
//! only allocates when a list outgrows what an earlier ray needed.

use raybool_math::{Point3, Vec3};

use crate::bits::SolidBits;
use crate::booleval::BoolStack;
use crate::model::RegionId;
use crate::partition::{PartitionArena, PartitionList};
use crate::ray::{Ray, Segment, SegmentId, SegmentStore};
use crate::regiontable::RegionTable;

/// State of the ray currently being evaluated.
#[derive(Debug, Clone)]
pub struct RayState {
    /// The ray.
    pub ray: Ray,
    /// Every segment produced for this ray.
    pub segs: SegmentStore,
    /// Storage for both partition lists.
    pub parts: PartitionArena,
    /// Woven partitions not yet finalized.
    pub input: PartitionList,
    /// Finalized partitions.
    pub output: PartitionList,
    /// Solids intersected so far.
    pub solids_shot: SolidBits,
}

impl RayState {
    /// Empty state for a model with `nsolids` solids.
    pub fn new(ray: Ray, nsolids: usize) -> Self {
        Self {
            ray,
            segs: SegmentStore::new(),
            parts: PartitionArena::new(),
            input: PartitionList::new(),
            output: PartitionList::new(),
            solids_shot: SolidBits::new(nsolids),
        }
    }

    /// Forget the previous ray.
    pub fn reset(&mut self, ray: Ray, nsolids: usize) {
        self.ray = ray;
        self.segs.clear();
        self.parts.clear();
        self.input = PartitionList::new();
        self.output = PartitionList::new();
        self.solids_shot.reset(nsolids);
    }

    /// Store a segment produced for this ray.
    pub fn add_segment(&mut self, seg: Segment) -> SegmentId {
        self.segs.insert(seg)
    }
}

/// Per-worker evaluation context.
#[derive(Debug, Clone)]
pub struct Resource {
    /// State of the current ray.
    pub state: RayState,
    pub(crate) stack: BoolStack,
    pub(crate) table: RegionTable,
    pub(crate) claims: Vec<Option<RegionId>>,
}

impl Resource {
    /// Fresh context for a model with `nsolids` solids.
    pub fn new(nsolids: usize) -> Self {
        let ray = Ray::new(Point3::origin(), Vec3::x());
        Self {
            state: RayState::new(ray, nsolids),
            stack: BoolStack::new(),
            table: RegionTable::new(),
            claims: Vec::new(),
        }
    }

    /// Prepare for a new ray.
    pub fn reset(&mut self, ray: Ray, nsolids: usize) {
        self.state.reset(ray, nsolids);
        self.table.clear();
        self.claims.clear();
    }
}

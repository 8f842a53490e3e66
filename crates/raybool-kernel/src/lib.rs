#![warn(missing_docs)]

//! Boolean evaluation of ray partitions.
//!
//! Primitive intersection hands the kernel segments: intervals where a
//! ray is inside one solid. The kernel turns them into the ordered list
//! of intervals owned by exactly one region.
//!
//! Evaluation of one ray has 4 stages:
//! 1. **Weave**: merge segments into a sorted, non-overlapping list of
//!    partitions, each recording the segments that span it
//! 2. **Region table**: collect the regions any contributing solid
//!    belongs to
//! 3. **Evaluate**: run each candidate region's Boolean tree against
//!    the partition
//! 4. **Resolve**: settle partitions claimed by several regions and
//!    move the result to the output list
//!
//! [`Evaluator::shoot`] drives the stages cell by cell along a ray;
//! [`Evaluator::shoot_many`] does so for a batch of rays in parallel.

mod bits;
pub mod booleval;
mod eligible;
mod error;
mod evaluator;
mod finalize;
pub mod model;
pub mod overlap;
pub mod partition;
pub mod ray;
mod rebuild;
pub mod regiontable;
mod resource;
mod settings;
pub mod shoot;
pub mod tree;
mod weave;

pub use bits::SolidBits;
pub use booleval::{booleval, BoolStack, BoolValue};
pub use eligible::partition_eligible;
pub use error::{BoolError, PrepError, Result};
pub use evaluator::Evaluator;
pub use finalize::FinalizeStatus;
pub use model::{Model, Region, RegionId, Solid, SolidId};
pub use overlap::{
    overlap_tables_equal, DefaultOverlap, DefaultOverlapLogger, OverlapAction, OverlapHandler, OverlapLogger,
    OverlapView, SilentOverlapLogger,
};
pub use partition::{describe_partitions, Partition, PartitionArena, PartitionId, PartitionList};
pub use ray::{Hit, HitRef, HitSide, Ray, Segment, SegmentId, SegmentStore};
pub use rebuild::rebuild_overlaps;
pub use regiontable::{region_segments, regions_for, RegionTable};
pub use resource::{RayState, Resource};
pub use settings::{FastgenRules, Settings};
pub use shoot::{CellList, CellShot, HitPartition, Traversal};
pub use tree::{NodeIndex, RegionTree, TreeNode};
pub use weave::weave;

pub use raybool_ir::{BooleanTree, FastgenMode, Geometry, RegionDef, SolidDef};
pub use raybool_math::Tolerance;

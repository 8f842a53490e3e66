//! Error types for the partition evaluator.
//!
//! Everything returned as `Err` here is a broken internal invariant: the
//! ray that produced it must be abandoned. Recoverable per-segment
//! anomalies are logged and skipped instead, and never surface here.

use thiserror::Error;

/// Fatal errors raised while weaving or finalizing a ray.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoolError {
    /// A segment names a solid the model does not have.
    #[error("segment solid index {solid} out of range ({count} solids in model)")]
    SolidOutOfRange {
        /// Offending solid index.
        solid: usize,
        /// Number of solids in the model.
        count: usize,
    },

    /// The weaver was handed a partition list that is not sorted.
    #[error("partition list not sorted: partition ending at {out_dist} followed by one starting at {next_in_dist}")]
    UnsortedPartitions {
        /// Exit distance of the earlier partition.
        out_dist: f64,
        /// Entry distance of the later partition.
        next_in_dist: f64,
    },

    /// The zero-thickness weave found no place for a segment.
    #[error("zero-thickness segment at {0} fell out of the partition loop")]
    ZeroThicknessFallthrough(f64),

    /// A zero-thickness weave was attempted on an empty list.
    #[error("zero-thickness weave on an empty partition list")]
    ZeroThicknessEmptyList,

    /// A partition with no contributing segments reached evaluation.
    #[error("partition ({in_dist}, {out_dist}) has no contributing segments")]
    EmptySegmentList {
        /// Entry distance.
        in_dist: f64,
        /// Exit distance.
        out_dist: f64,
    },

    /// A claiming region has no segment in the partition it claims.
    #[error("region {0} claims a partition without contributing any segment to it")]
    RegionWithoutSegments(String),

    /// Adjacent partitions are out of order beyond tolerance.
    #[error("sorting defect: partition ends at {out_dist} > next partition start {next_in_dist}")]
    SortingDefect {
        /// Exit distance of the earlier partition.
        out_dist: f64,
        /// Entry distance of the later partition.
        next_in_dist: f64,
    },

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Errors raised while prepping a geometry description into a model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepError {
    /// A region's tree references an undeclared solid.
    #[error("region {region} references unknown solid {solid}")]
    UnknownSolid {
        /// Region name.
        region: String,
        /// Missing solid name.
        solid: String,
    },

    /// Two solids share a name.
    #[error("duplicate solid name: {0}")]
    DuplicateSolid(String),

    /// Two regions share a name.
    #[error("duplicate region name: {0}")]
    DuplicateRegion(String),
}

/// Result type for evaluator operations.
pub type Result<T> = std::result::Result<T, BoolError>;

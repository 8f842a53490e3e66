//! Evaluation settings.

use serde::{Deserialize, Serialize};

use crate::error::{BoolError, Result};

/// Legacy FASTGEN overlap constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastgenRules {
    /// Thickness (mm) below which a volume/volume overlap keeps the
    /// nearer region and a volume ahead of a plate is removed.
    pub thin_depth: f64,
    /// Largest gap (mm) between a volume's exit and a plate's entry that
    /// still counts as touching.
    pub gap_tol: f64,
}

impl Default for FastgenRules {
    fn default() -> Self {
        Self {
            thin_depth: 6.35,
            gap_tol: 0.001,
        }
    }
}

/// Per-evaluator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hit quota: 0 wants every partition, N > 0 stops after N hits,
    /// N < 0 stops after |N| hits and does not count air.
    pub onehit: i32,
    /// Keep the list of claimants on partitions whose overlap was resolved.
    pub save_overlaps: bool,
    /// Skip Boolean evaluation: every segment is its own partition.
    pub no_booleans: bool,
    /// Segments ending before this distance are ignored (mm).
    pub behind_dist: f64,
    /// Start distance of the final finalizer pass (mm).
    pub backing_dist: f64,
    /// Distances beyond this magnitude are treated as defective.
    pub infinity: f64,
    /// FASTGEN overlap constants.
    pub fastgen: FastgenRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            onehit: 0,
            save_overlaps: false,
            no_booleans: false,
            behind_dist: -10.0,
            backing_dist: -2.0,
            infinity: 1.0e40,
            fastgen: FastgenRules::default(),
        }
    }
}

impl Settings {
    /// Settings that stop after the first `n` hits.
    pub fn onehit(n: i32) -> Self {
        Self {
            onehit: n,
            ..Self::default()
        }
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.infinity.is_finite() && self.infinity > 0.0) {
            return Err(BoolError::InvalidSettings(
                "infinity must be positive and finite".into(),
            ));
        }
        if !self.behind_dist.is_finite() || self.behind_dist > 0.0 {
            return Err(BoolError::InvalidSettings(
                "behind_dist must be finite and not positive".into(),
            ));
        }
        if !self.backing_dist.is_finite() || self.backing_dist > 0.0 {
            return Err(BoolError::InvalidSettings(
                "backing_dist must be finite and not positive".into(),
            ));
        }
        if self.fastgen.thin_depth < 0.0 || self.fastgen.gap_tol < 0.0 {
            return Err(BoolError::InvalidSettings(
                "FASTGEN thresholds must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

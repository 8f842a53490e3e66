#![warn(missing_docs)]

//! Math types for the raybool partition evaluator.
//!
//! Thin wrappers around nalgebra providing the handful of types the
//! evaluator needs to report where along a ray something happened,
//! plus the distance tolerance every boundary comparison goes through.

use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// Distance tolerance used when comparing hit distances along a ray.
///
/// Two distances closer than [`Tolerance::dist`] are the same boundary.
/// Callers that decide two values are "equal" this way must then force
/// them to be exactly equal, otherwise later comparisons disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Distance tolerance in mm.
    pub dist: f64,
}

impl Tolerance {
    /// Default ray tolerance (0.0005 mm).
    pub const DEFAULT: Self = Self { dist: 0.0005 };

    /// Create a tolerance with the given distance.
    pub fn new(dist: f64) -> Self {
        Self { dist }
    }

    /// Check if a scalar distance is effectively zero.
    #[inline]
    pub fn near_zero(&self, d: f64) -> bool {
        d > -self.dist && d < self.dist
    }

    /// Check if two distances are effectively equal.
    #[inline]
    pub fn near_equal(&self, a: f64, b: f64) -> bool {
        self.near_zero(a - b)
    }

    /// Check if two distances are equal within an explicit tolerance.
    ///
    /// Used by rules that carry their own legacy tolerance instead of
    /// the model's.
    #[inline]
    pub fn near_equal_within(a: f64, b: f64, tol: f64) -> bool {
        let d = a - b;
        d > -tol && d < tol
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

use crate::FtError;

/// Floating point type used throughout system
pub type Real = f64;

/// Default distance tolerance for point coincidence and collinearity.
pub const DISTANCE_EPSILON: Real = 1e-5;

/// Cosine of 0.001 degrees, the default angular tolerance.
pub const COS_ANGLE_EPSILON: Real = 0.999_999_999_847_691_28;

/// Geometric tolerances handed to the tree at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeomTolerance {
    /// Distance below which two points are the same point.
    pub distance: Real,
    /// Cosine above which two directions are treated as parallel.
    pub cos_angle: Real,
}

impl Default for GeomTolerance {
    fn default() -> Self {
        Self {
            distance: DISTANCE_EPSILON,
            cos_angle: COS_ANGLE_EPSILON,
        }
    }
}

impl GeomTolerance {
    /// Same angular tolerance, custom distance tolerance.
    pub fn with_distance(distance: Real) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }
}

/// Scalar comparison with an absolute tolerance.
pub fn approx_eq(a: Real, b: Real, tol: Real) -> bool {
    (a - b).abs() <= tol
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, FtError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FtError::NonFinite { what, value: v })
    }
}

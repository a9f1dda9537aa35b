//! Rotation helpers used by the feedback law and the dynamics model.

use nalgebra::{Matrix3, Rotation3, Vector3};

/// Orientation error as a rotation vector (axis × angle).
///
/// The error is the rotation taking `current` to `desired`,
/// `R_err = R_d · Rᵀ`, expressed in the world frame. The axis and angle are
/// combined into one vector rather than split into per-axis Euler errors, so
/// the PD law acts on the small-angle linearization directly.
pub fn rotation_error(desired: &Rotation3<f64>, current: &Rotation3<f64>) -> Vector3<f64> {
    (desired * current.inverse()).scaled_axis()
}

/// Compute the skew-symmetric (cross product) matrix of a 3D vector.
///
/// ```text
/// [v]_× = [ 0   -vz   vy ]
///         [ vz   0   -vx ]
///         [-vy   vx   0  ]
/// ```
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

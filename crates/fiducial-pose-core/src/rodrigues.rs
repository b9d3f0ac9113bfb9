//! Axis-angle (Rodrigues) rotation vectors.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Convert a Rodrigues rotation vector into a 3×3 rotation matrix.
///
/// The vector direction is the rotation axis and its norm the angle in
/// radians. A vector shorter than `f64::EPSILON` yields the exact identity.
pub fn rotation_from_vector(rvec: &Vector3<f64>) -> Matrix3<f64> {
    let theta = rvec.norm();
    if theta < f64::EPSILON {
        return Matrix3::identity();
    }

    let k = rvec / theta;
    let (s, c) = theta.sin_cos();

    // R = cos(θ) I + (1 - cos(θ)) k kᵀ + sin(θ) [k]ₓ
    Matrix3::identity() * c + (k * k.transpose()) * (1.0 - c) + k.cross_matrix() * s
}

/// Convert a rotation matrix back into a Rodrigues vector with angle in `[0, π]`.
///
/// The matrix is assumed orthonormal; the conversion goes through a unit
/// quaternion so rotations close to π keep a well-defined axis.
pub fn vector_from_rotation(rotation: &Matrix3<f64>) -> Vector3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
    q.scaled_axis()
}

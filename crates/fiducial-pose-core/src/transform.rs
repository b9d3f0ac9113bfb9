//! 4×4 homogeneous rigid transforms and the pose composition steps.
//!
//! Naming follows `a_to_b`: the transform maps coordinates expressed in frame
//! `a` into frame `b`, so `b_to_c * a_to_b == a_to_c`.

use std::fmt;

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::rodrigues::{rotation_from_vector, vector_from_rotation};

/// Tolerance used when checking that a rotation block is orthonormal.
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// Determinants below this magnitude are treated as singular.
const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Errors produced when a transform cannot be inverted as a rigid motion.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum PoseError {
    #[error("rotation block is singular (det={determinant:.3e})")]
    Singular { determinant: f64 },

    #[error(
        "rotation block is not a proper rotation \
         (max |R*R^T - I|={orthogonality_error:.3e}, det={determinant:.6})"
    )]
    NotRigid {
        orthogonality_error: f64,
        determinant: f64,
    },

    #[error("bottom row is not [0, 0, 0, 1]")]
    NotHomogeneous,
}

/// A rigid transform between two 3D frames stored as a 4×4 matrix.
///
/// The upper-left 3×3 block is the rotation, the top three entries of the last
/// column are the translation, and the bottom row is `[0, 0, 0, 1]`.
///
/// Serialized as four rows of four numbers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 4]; 4]", into = "[[f64; 4]; 4]")]
pub struct HomogeneousTransform {
    pub m: Matrix4<f64>,
}

impl HomogeneousTransform {
    pub fn new(m: Matrix4<f64>) -> Self {
        Self { m }
    }

    pub fn identity() -> Self {
        Self::new(Matrix4::identity())
    }

    /// Build from a rotation block and a translation column.
    pub fn from_parts(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self::new(m)
    }

    /// Pure translation, identity rotation.
    pub fn from_translation(translation: &Vector3<f64>) -> Self {
        Self::from_parts(&Matrix3::identity(), translation)
    }

    pub fn from_array(rows: [[f64; 4]; 4]) -> Self {
        Self::new(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    pub fn to_array(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.m[(r, c)];
            }
        }
        rows
    }

    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        self.m.fixed_view::<3, 3>(0, 0).into_owned()
    }

    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        self.m.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Rodrigues vector of the rotation block.
    pub fn rotation_vector(&self) -> Vector3<f64> {
        vector_from_rotation(&self.rotation())
    }

    /// Map a point from the source frame into the target frame.
    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation() * p.coords + self.translation())
    }

    /// `self * rhs`: apply `rhs` first, then `self`.
    #[inline]
    pub fn compose(&self, rhs: &HomogeneousTransform) -> HomogeneousTransform {
        Self::new(self.m * rhs.m)
    }

    /// Rigid inverse, see [`invert`].
    pub fn inverse(&self) -> Result<HomogeneousTransform, PoseError> {
        invert(self)
    }
}

impl Default for HomogeneousTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[f64; 4]; 4]> for HomogeneousTransform {
    fn from(rows: [[f64; 4]; 4]) -> Self {
        Self::from_array(rows)
    }
}

impl From<HomogeneousTransform> for [[f64; 4]; 4] {
    fn from(t: HomogeneousTransform) -> Self {
        t.to_array()
    }
}

/// Row-major bracket form: `[a, b, c, d;\n e, ...]`.
///
/// A precision in the format spec (`{:.4}`) is applied to every entry.
impl fmt::Display for HomogeneousTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for r in 0..4 {
            if r > 0 {
                write!(f, ";\n ")?;
            }
            for c in 0..4 {
                if c > 0 {
                    write!(f, ", ")?;
                }
                let v = self.m[(r, c)];
                match f.precision() {
                    Some(p) => write!(f, "{v:.p$}")?,
                    None => write!(f, "{v}")?,
                }
            }
        }
        write!(f, "]")
    }
}

/// Object-to-camera transform from a Rodrigues rotation vector and a translation.
///
/// Assumes well-formed inputs from an upstream pose solver; there is no
/// failure mode.
pub fn build_object_to_camera(
    rotation_vector: &Vector3<f64>,
    translation_vector: &Vector3<f64>,
) -> HomogeneousTransform {
    HomogeneousTransform::from_parts(&rotation_from_vector(rotation_vector), translation_vector)
}

/// Invert a rigid transform: `[R | t]⁻¹ = [Rᵀ | -Rᵀt]`.
///
/// The rotation block is validated first. A singular block, a block that is
/// not orthonormal with determinant 1 (within [`RIGIDITY_TOLERANCE`]), or a
/// bottom row other than `[0, 0, 0, 1]` is reported as an error instead of
/// producing a silently wrong inverse.
pub fn invert(transform: &HomogeneousTransform) -> Result<HomogeneousTransform, PoseError> {
    let m = &transform.m;
    if m[(3, 0)] != 0.0 || m[(3, 1)] != 0.0 || m[(3, 2)] != 0.0 || m[(3, 3)] != 1.0 {
        return Err(PoseError::NotHomogeneous);
    }

    let r = transform.rotation();
    let determinant = r.determinant();
    if !determinant.is_finite() || determinant.abs() < SINGULAR_DETERMINANT {
        return Err(PoseError::Singular { determinant });
    }

    let orthogonality_error = (r * r.transpose() - Matrix3::identity()).abs().max();
    if orthogonality_error > RIGIDITY_TOLERANCE || (determinant - 1.0).abs() > RIGIDITY_TOLERANCE
    {
        return Err(PoseError::NotRigid {
            orthogonality_error,
            determinant,
        });
    }

    let r_t = r.transpose();
    let t = transform.translation();
    Ok(HomogeneousTransform::from_parts(&r_t, &(-(r_t * t))))
}

/// Object-to-world transform for a marker whose world position is known.
///
/// The marker axes are taken as aligned with the world axes, so only the
/// translation column is filled.
pub fn object_to_world(world_position: &Vector3<f64>) -> HomogeneousTransform {
    HomogeneousTransform::from_translation(world_position)
}

/// Camera-to-world transform: `object_to_world * camera_to_object`.
pub fn compose_camera_to_world(
    object_to_world: &HomogeneousTransform,
    camera_to_object: &HomogeneousTransform,
) -> HomogeneousTransform {
    object_to_world.compose(camera_to_object)
}

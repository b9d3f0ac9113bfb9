//! Single-marker pose from the four corners of a square marker.
//!
//! The marker lies on `z = 0` in its own frame. Its image corners are
//! undistorted to normalized coordinates, a plane-to-image homography is fit
//! to the four correspondences, and the homography is decomposed into a
//! rotation and translation.

use nalgebra::{Matrix3, Point2, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::capability::{DetectError, PoseEstimator};
use crate::homography::homography_from_4pt;
use crate::intrinsics::CameraIntrinsics;
use crate::marker::{marker_object_points, MarkerObservation, MarkerPose};
use crate::rodrigues::vector_from_rotation;

/// Pure-Rust [`PoseEstimator`] based on homography decomposition.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanarPoseEstimator;

impl PlanarPoseEstimator {
    /// Pose of one marker in the camera frame.
    pub fn estimate_single(
        &self,
        observation: &MarkerObservation,
        marker_length: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<MarkerPose, DetectError> {
        let degenerate = || DetectError::DegenerateCorners { id: observation.id };

        let object = marker_object_points(marker_length).map(|p| Point2::new(p.x, p.y));
        let image = observation
            .corners
            .map(|c| intrinsics.pixel_to_normalized(&Point2::new(c.x as f64, c.y as f64)));

        let h = homography_from_4pt(&object, &image).ok_or_else(degenerate)?;
        let (rotation, tvec) = decompose_plane_homography(&h.h).ok_or_else(degenerate)?;

        Ok(MarkerPose {
            id: observation.id,
            rvec: vector_from_rotation(&rotation),
            tvec,
        })
    }
}

impl PoseEstimator for PlanarPoseEstimator {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, observations, intrinsics), fields(markers = observations.len()))
    )]
    fn estimate_pose(
        &self,
        observations: &[MarkerObservation],
        marker_length: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Vec<MarkerPose>, DetectError> {
        observations
            .iter()
            .map(|obs| self.estimate_single(obs, marker_length, intrinsics))
            .collect()
    }
}

/// Split `H ~ [r1 r2 t]` (plane to normalized image) into `R`, `t`.
///
/// The scale is taken from the mean norm of the first two columns, the sign
/// from `t.z > 0`, and the rotation is projected onto SO(3) with an SVD.
fn decompose_plane_homography(h: &Matrix3<f64>) -> Option<(Matrix3<f64>, Vector3<f64>)> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let denom = 0.5 * (h1.norm() + h2.norm());
    if denom <= 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / denom;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let t = h3 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        rotation = u_flipped * v_t;
    }

    Some((rotation, t))
}

//! Injected detection capabilities.
//!
//! Marker detection and single-marker pose solving are provided by an external
//! vision backend. The tracking loop only sees these two traits, so tests can
//! drive it with synthetic observations and no camera.

use crate::intrinsics::CameraIntrinsics;
use crate::marker::{MarkerObservation, MarkerPose};

/// Errors reported by detection backends.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("detection backend failed: {0}")]
    Backend(String),

    #[error("marker {id} has degenerate corners")]
    DegenerateCorners { id: u32 },

    #[error("pose estimator returned {got} poses for {expected} observations")]
    PoseCount { expected: usize, got: usize },
}

/// Finds markers in a frame.
pub trait MarkerDetector {
    type Frame;

    fn detect_markers(&mut self, frame: &Self::Frame) -> Result<Vec<MarkerObservation>, DetectError>;
}

/// Estimates one pose per observation, in the same order.
pub trait PoseEstimator {
    /// `marker_length` is the printed side length; translations come back in
    /// the same unit.
    fn estimate_pose(
        &self,
        observations: &[MarkerObservation],
        marker_length: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Vec<MarkerPose>, DetectError>;
}

//! Core types and pose arithmetic for fiducial marker camera localisation.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete marker detector, capture device or image type:
//! detection and pose solving are described by the traits in [`capability`]
//! and injected by the caller.
//!
//! The central piece is [`HomogeneousTransform`] together with the three
//! composition steps run for every detection:
//!
//! ```
//! use fiducial_pose_core::{build_object_to_camera, compose_camera_to_world, invert, object_to_world};
//! use nalgebra::Vector3;
//!
//! # fn main() -> Result<(), fiducial_pose_core::PoseError> {
//! let object_to_camera = build_object_to_camera(
//!     &Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
//!     &Vector3::new(0.0, 0.0, 1.5),
//! );
//! let camera_to_object = invert(&object_to_camera)?;
//! let camera_to_world =
//!     compose_camera_to_world(&object_to_world(&Vector3::new(2.0, 3.0, 0.0)), &camera_to_object);
//! println!("{camera_to_world:.4}");
//! # Ok(())
//! # }
//! ```

pub mod capability;
mod calibration;
mod dictionary;
mod homography;
mod intrinsics;
mod logger;
mod marker;
mod planar_pose;
mod rodrigues;
mod transform;

pub use calibration::{CalibrationError, DEFAULT_CALIBRATION_PATH};
pub use capability::{DetectError, MarkerDetector, PoseEstimator};
pub use dictionary::{PredefinedDictionary, UnknownDictionary};
pub use homography::{homography_from_4pt, Homography};
pub use intrinsics::{CameraIntrinsics, Distortion};
pub use marker::{marker_object_points, MarkerObservation, MarkerPose, WorldPosition};
pub use planar_pose::PlanarPoseEstimator;
pub use rodrigues::{rotation_from_vector, vector_from_rotation};
pub use transform::{
    build_object_to_camera, compose_camera_to_world, invert, object_to_world,
    HomogeneousTransform, PoseError, RIGIDITY_TOLERANCE,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

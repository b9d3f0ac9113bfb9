//! Camera localisation from ArUco markers.
//!
//! This crate provides:
//! - a re-export of [`fiducial_pose_core`] (transforms, intrinsics, capability traits),
//! - the per-frame tracking loop ([`pipeline`]) that detects markers, solves the
//!   first marker's pose and composes the camera-to-world transform,
//! - a non-blocking world-position input channel ([`world`]),
//! - a JSON-lines replay backend ([`replay`]) for headless runs and tests,
//! - (feature `opencv`) live capture, ArUco detection and a HighGUI window,
//! - (feature `cli`) the `fiducial-pose` binary.
//!
//! ## Quickstart
//!
//! ```no_run
//! use fiducial_pose::core::{CameraIntrinsics, PlanarPoseEstimator};
//! use fiducial_pose::pipeline::{NullViewer, Tracker, TrackerSettings};
//! use fiducial_pose::replay::{ReplayDetector, ReplaySource};
//! use fiducial_pose::report::TextReport;
//! use fiducial_pose::world::WorldPositions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let intrinsics = CameraIntrinsics::load_json("calibration_params.json")?;
//! let mut tracker = Tracker::new(
//!     ReplayDetector,
//!     PlanarPoseEstimator,
//!     intrinsics,
//!     TrackerSettings::default(),
//! );
//! let mut source = ReplaySource::open("session.jsonl")?;
//! let mut world = WorldPositions::default();
//! let mut out = TextReport::new(std::io::stdout());
//! let summary = tracker.run(&mut source, &mut NullViewer, &mut world, &mut out)?;
//! println!("{} frames, {} with markers", summary.frames, summary.detections);
//! # Ok(())
//! # }
//! ```

pub use fiducial_pose_core as core;

pub mod config;
pub mod pipeline;
pub mod replay;
pub mod report;
pub mod world;

#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use config::{ConfigError, TrackerConfig, VideoSource};
pub use pipeline::{
    compose_frame, ComposedPose, FrameSource, NullViewer, RunSummary, StopReason, TrackError,
    Tracker, TrackerSettings, Viewer, ViewerControl,
};
pub use report::{FrameReport, JsonLinesReport, ReportSink, TextReport};
pub use world::{WorldInputError, WorldPositionProvider, WorldPositions, WorldUpdate};

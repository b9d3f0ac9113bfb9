//! The per-frame tracking loop.
//!
//! Each frame is pulled from a [`FrameSource`], markers are detected, poses
//! are estimated, and the first marker's pose is turned into the
//! camera-to-world transform. Frame capture, detection, pose solving and
//! display are all injected, so the loop runs the same against a live camera,
//! a replay file, or a test fixture.

use std::collections::HashSet;

use fiducial_pose_core::{
    compose_camera_to_world, invert, object_to_world, CalibrationError, CameraIntrinsics,
    DetectError, HomogeneousTransform, MarkerDetector, MarkerObservation, MarkerPose,
    PoseError, PoseEstimator, WorldPosition,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::ConfigError;
use crate::report::{FrameReport, ReportSink};
use crate::world::WorldPositionProvider;

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("frame source failed: {0}")]
    Source(String),

    #[error("replay line {line}: {source}")]
    Replay {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("viewer failed: {0}")]
    Viewer(String),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Yields frames until the stream ends.
pub trait FrameSource {
    type Frame;

    /// `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>, TrackError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerControl {
    Continue,
    Quit,
}

/// Shows each frame with its detections and reports whether to keep going.
pub trait Viewer<F> {
    fn show(&mut self, frame: &F, markers: &[MarkerObservation])
        -> Result<ViewerControl, TrackError>;
}

/// Headless viewer: never displays anything and never quits.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullViewer;

impl<F> Viewer<F> for NullViewer {
    fn show(
        &mut self,
        _frame: &F,
        _markers: &[MarkerObservation],
    ) -> Result<ViewerControl, TrackError> {
        Ok(ViewerControl::Continue)
    }
}

/// Transforms derived from one marker pose.
///
/// The world-frame transforms are present only when the marker's world
/// position is known.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComposedPose {
    pub marker_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_position: Option<WorldPosition>,
    pub object_to_camera: HomogeneousTransform,
    pub camera_to_object: HomogeneousTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_to_world: Option<HomogeneousTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_to_world: Option<HomogeneousTransform>,
}

/// Build object-to-camera from the pose, invert it, and place the camera in
/// the world when the marker position is known.
pub fn compose_frame(
    pose: &MarkerPose,
    world_position: Option<WorldPosition>,
) -> Result<ComposedPose, PoseError> {
    let object_to_camera = pose.object_to_camera();
    let camera_to_object = invert(&object_to_camera)?;
    let to_world = world_position.map(|p| object_to_world(&p));
    let camera_to_world = to_world.map(|t| compose_camera_to_world(&t, &camera_to_object));

    Ok(ComposedPose {
        marker_id: pose.id,
        world_position,
        object_to_camera,
        camera_to_object,
        object_to_world: to_world,
        camera_to_world,
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Printed marker side length; translations use the same unit.
    pub marker_length: f64,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            marker_length: 0.2,
            max_frames: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum StopReason {
    #[default]
    EndOfStream,
    UserQuit,
    FrameLimit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    /// Frames with at least one marker.
    pub detections: u64,
    pub stop_reason: StopReason,
}

pub struct Tracker<D, E> {
    detector: D,
    estimator: E,
    intrinsics: CameraIntrinsics,
    settings: TrackerSettings,
    warned_without_world: HashSet<u32>,
}

impl<D, E> Tracker<D, E>
where
    D: MarkerDetector,
    E: PoseEstimator,
{
    pub fn new(
        detector: D,
        estimator: E,
        intrinsics: CameraIntrinsics,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            detector,
            estimator,
            intrinsics,
            settings,
            warned_without_world: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Detect, estimate and compose for one frame.
    ///
    /// Returns `None` when the frame has no markers.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, world), fields(frame = frame_index))
    )]
    pub fn process_frame<W>(
        &mut self,
        frame_index: u64,
        frame: &D::Frame,
        world: &mut W,
    ) -> Result<Option<FrameReport>, TrackError>
    where
        W: WorldPositionProvider + ?Sized,
    {
        let markers = self.detector.detect_markers(frame)?;
        if markers.is_empty() {
            return Ok(None);
        }

        let poses =
            self.estimator
                .estimate_pose(&markers, self.settings.marker_length, &self.intrinsics)?;
        if poses.len() != markers.len() {
            return Err(DetectError::PoseCount {
                expected: markers.len(),
                got: poses.len(),
            }
            .into());
        }

        let first = poses[0];
        let world_position = world.world_position(first.id);
        if world_position.is_none() && self.warned_without_world.insert(first.id) {
            warn!(
                "no world position for marker {}; camera_to_world is skipped until one is given",
                first.id
            );
        }

        let composed = compose_frame(&first, world_position)?;
        debug!(
            "frame {frame_index}: {} markers, first id {} at t={:?}",
            markers.len(),
            first.id,
            first.tvec.as_slice()
        );

        Ok(Some(FrameReport {
            frame_index,
            markers,
            poses,
            composed,
        }))
    }

    /// Run until the source ends, the viewer quits, or the frame limit is hit.
    ///
    /// Any detection, pose or output error aborts the run.
    pub fn run<S, V, W, R>(
        &mut self,
        source: &mut S,
        viewer: &mut V,
        world: &mut W,
        sink: &mut R,
    ) -> Result<RunSummary, TrackError>
    where
        S: FrameSource<Frame = D::Frame> + ?Sized,
        V: Viewer<D::Frame> + ?Sized,
        W: WorldPositionProvider + ?Sized,
        R: ReportSink + ?Sized,
    {
        let mut summary = RunSummary::default();
        loop {
            if self
                .settings
                .max_frames
                .is_some_and(|max| summary.frames >= max)
            {
                summary.stop_reason = StopReason::FrameLimit;
                break;
            }

            let Some(frame) = source.next_frame()? else {
                summary.stop_reason = StopReason::EndOfStream;
                break;
            };

            let report = self.process_frame(summary.frames, &frame, world)?;
            summary.frames += 1;
            if let Some(report) = &report {
                summary.detections += 1;
                sink.emit(report)?;
            }

            let markers = report.as_ref().map_or(&[][..], |r| r.markers.as_slice());
            if viewer.show(&frame, markers)? == ViewerControl::Quit {
                summary.stop_reason = StopReason::UserQuit;
                break;
            }
        }

        info!(
            "stopped ({:?}) after {} frames, {} with markers",
            summary.stop_reason, summary.frames, summary.detections
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldPositions;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Point3, Vector3};
    use std::collections::VecDeque;

    /// Frames are the observations themselves.
    struct PassThrough;

    impl MarkerDetector for PassThrough {
        type Frame = Vec<MarkerObservation>;

        fn detect_markers(
            &mut self,
            frame: &Self::Frame,
        ) -> Result<Vec<MarkerObservation>, DetectError> {
            Ok(frame.clone())
        }
    }

    /// Returns the same pose for every observation, keeping its id.
    struct FixedPose {
        rvec: Vector3<f64>,
        tvec: Vector3<f64>,
        drop_last: bool,
    }

    impl PoseEstimator for FixedPose {
        fn estimate_pose(
            &self,
            observations: &[MarkerObservation],
            _marker_length: f64,
            _intrinsics: &CameraIntrinsics,
        ) -> Result<Vec<MarkerPose>, DetectError> {
            let mut poses: Vec<_> = observations
                .iter()
                .map(|o| MarkerPose {
                    id: o.id,
                    rvec: self.rvec,
                    tvec: self.tvec,
                })
                .collect();
            if self.drop_last {
                poses.pop();
            }
            Ok(poses)
        }
    }

    struct Frames(VecDeque<Vec<MarkerObservation>>);

    impl FrameSource for Frames {
        type Frame = Vec<MarkerObservation>;

        fn next_frame(&mut self) -> Result<Option<Self::Frame>, TrackError> {
            Ok(self.0.pop_front())
        }
    }

    /// Quits after showing `n` frames, like pressing ESC.
    struct QuitAfter(usize);

    impl<F> Viewer<F> for QuitAfter {
        fn show(&mut self, _: &F, _: &[MarkerObservation]) -> Result<ViewerControl, TrackError> {
            self.0 = self.0.saturating_sub(1);
            Ok(if self.0 == 0 {
                ViewerControl::Quit
            } else {
                ViewerControl::Continue
            })
        }
    }

    fn marker(id: u32) -> MarkerObservation {
        MarkerObservation::new(
            id,
            [
                Point2::new(1.5, 1.0),
                Point2::new(3.0, 1.0),
                Point2::new(4.5, 3.0),
                Point2::new(0.0, 3.0),
            ],
        )
    }

    fn tracker(drop_last: bool) -> Tracker<PassThrough, FixedPose> {
        Tracker::new(
            PassThrough,
            FixedPose {
                rvec: Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
                tvec: Vector3::new(0.1, -0.2, 1.5),
                drop_last,
            },
            CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0),
            TrackerSettings::default(),
        )
    }

    fn frames(frames: Vec<Vec<MarkerObservation>>) -> Frames {
        Frames(frames.into())
    }

    #[test]
    fn composed_pose_places_camera_in_world() {
        let pose = MarkerPose {
            id: 1,
            rvec: Vector3::new(0.3, -0.2, 0.1),
            tvec: Vector3::new(0.2, 0.1, 2.0),
        };
        let position = WorldPosition::new(2.0, 3.0, 4.0);
        let c = compose_frame(&pose, Some(position)).expect("compose");

        let camera_to_world = c.camera_to_world.expect("world");
        let expected = position - c.object_to_camera.rotation().transpose() * pose.tvec;
        assert_relative_eq!(camera_to_world.translation(), expected, epsilon = 1e-12);

        // The marker origin seen from the camera lands on its world position.
        let origin_in_camera = c.object_to_camera.transform_point(&Point3::origin());
        assert_relative_eq!(
            camera_to_world.transform_point(&origin_in_camera).coords,
            position,
            epsilon = 1e-12
        );
    }

    #[test]
    fn compose_without_world_keeps_camera_frame_only() {
        let pose = MarkerPose {
            id: 1,
            rvec: Vector3::zeros(),
            tvec: Vector3::new(0.0, 0.0, 1.0),
        };
        let c = compose_frame(&pose, None).expect("compose");
        assert_eq!(c.object_to_world, None);
        assert_eq!(c.camera_to_world, None);
        assert_eq!(
            c.camera_to_object.translation(),
            Vector3::new(0.0, 0.0, -1.0)
        );
    }

    #[test]
    fn reports_only_frames_with_markers() {
        let mut source = frames(vec![
            vec![marker(3)],
            vec![],
            vec![marker(7), marker(3)],
        ]);
        let mut world = WorldPositions::default();
        world.markers.insert(7, WorldPosition::new(1.0, 0.0, 0.0));
        let mut reports: Vec<FrameReport> = Vec::new();

        let summary = tracker(false)
            .run(&mut source, &mut NullViewer, &mut world, &mut reports)
            .expect("run");

        assert_eq!(
            summary,
            RunSummary {
                frames: 3,
                detections: 2,
                stop_reason: StopReason::EndOfStream
            }
        );
        assert_eq!(
            reports.iter().map(|r| r.frame_index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(reports[0].composed.marker_id, 3);
        assert_eq!(reports[0].composed.camera_to_world, None);
        assert_eq!(reports[1].composed.marker_id, 7);
        assert_eq!(reports[1].poses.len(), 2);
        assert!(reports[1].composed.camera_to_world.is_some());
    }

    #[test]
    fn viewer_quit_stops_the_loop() {
        let mut source = frames(vec![vec![marker(0)]; 5]);
        let mut reports: Vec<FrameReport> = Vec::new();
        let summary = tracker(false)
            .run(
                &mut source,
                &mut QuitAfter(2),
                &mut WorldPositions::default(),
                &mut reports,
            )
            .expect("run");
        assert_eq!(summary.stop_reason, StopReason::UserQuit);
        assert_eq!(summary.frames, 2);
        assert_eq!(reports.len(), 2);
        assert_eq!(source.0.len(), 3);
    }

    #[test]
    fn frame_limit_stops_the_loop() {
        let mut t = tracker(false);
        t.settings.max_frames = Some(1);
        let mut source = frames(vec![vec![marker(0)]; 3]);
        let summary = t
            .run(
                &mut source,
                &mut NullViewer,
                &mut WorldPositions::default(),
                &mut Vec::<FrameReport>::new(),
            )
            .expect("run");
        assert_eq!(summary.stop_reason, StopReason::FrameLimit);
        assert_eq!(summary.frames, 1);
    }

    #[test]
    fn pose_count_mismatch_aborts() {
        let mut source = frames(vec![vec![marker(0), marker(1)]]);
        let err = tracker(true)
            .run(
                &mut source,
                &mut NullViewer,
                &mut WorldPositions::default(),
                &mut Vec::<FrameReport>::new(),
            )
            .expect_err("mismatch");
        assert!(matches!(
            err,
            TrackError::Detect(DetectError::PoseCount {
                expected: 2,
                got: 1
            })
        ));
    }
}

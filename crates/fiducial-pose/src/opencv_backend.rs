//! Live capture, ArUco detection and a preview window through OpenCV.

use fiducial_pose_core::{
    marker_object_points, CameraIntrinsics, DetectError, MarkerDetector, MarkerObservation,
    MarkerPose, PoseEstimator, PredefinedDictionary,
};
use log::info;
use nalgebra::{Point2, Vector3};
use opencv::core::{Mat, Point2f, Point3f, Scalar, Vector, CV_64F};
use opencv::objdetect::{self, ArucoDetector};
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, VideoCaptureAPIs};
use opencv::{calib3d, highgui};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::VideoSource;
use crate::pipeline::{FrameSource, TrackError, Viewer, ViewerControl};

pub const WINDOW_NAME: &str = "Detected markers";

const ESC: i32 = 27;

fn backend(err: opencv::Error) -> DetectError {
    DetectError::Backend(err.to_string())
}

fn source(err: opencv::Error) -> TrackError {
    TrackError::Source(err.to_string())
}

fn viewer(err: opencv::Error) -> TrackError {
    TrackError::Viewer(err.to_string())
}

/// Frames from a camera device or a video file.
pub struct CaptureSource {
    capture: VideoCapture,
}

impl CaptureSource {
    pub fn open(video: &VideoSource) -> Result<Self, TrackError> {
        let api = VideoCaptureAPIs::CAP_ANY as i32;
        let capture = match video {
            VideoSource::Device(index) => VideoCapture::new(*index, api),
            VideoSource::Path(path) => VideoCapture::from_file(&path.to_string_lossy(), api),
        }
        .map_err(source)?;

        if !capture.is_opened().map_err(source)? {
            return Err(TrackError::Source(format!("cannot open {video}")));
        }
        info!("opened {video}");
        Ok(Self { capture })
    }
}

impl FrameSource for CaptureSource {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>, TrackError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame).map_err(source)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// ArUco marker detection with one predefined dictionary.
pub struct ArucoMarkerDetector {
    detector: ArucoDetector,
}

impl ArucoMarkerDetector {
    pub fn new(dictionary: PredefinedDictionary) -> Result<Self, DetectError> {
        let dict = objdetect::get_predefined_dictionary_i32(i32::from(dictionary.id()))
            .map_err(backend)?;
        let detector = ArucoDetector::new_def(&dict).map_err(backend)?;
        info!("detecting markers from {dictionary}");
        Ok(Self { detector })
    }
}

impl MarkerDetector for ArucoMarkerDetector {
    type Frame = Mat;

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    fn detect_markers(&mut self, frame: &Mat) -> Result<Vec<MarkerObservation>, DetectError> {
        let mut corners: Vector<Vector<Point2f>> = Vector::new();
        let mut ids: Vector<i32> = Vector::new();
        let mut rejected: Vector<Vector<Point2f>> = Vector::new();
        self.detector
            .detect_markers(frame, &mut corners, &mut ids, &mut rejected)
            .map_err(backend)?;

        ids.iter()
            .zip(corners.iter())
            .map(|(id, quad)| {
                let id = u32::try_from(id)
                    .map_err(|_| DetectError::Backend(format!("negative marker id {id}")))?;
                if quad.len() != 4 {
                    return Err(DetectError::DegenerateCorners { id });
                }
                let mut pts = [Point2::origin(); 4];
                for (dst, src) in pts.iter_mut().zip(quad.iter()) {
                    *dst = Point2::new(src.x, src.y);
                }
                Ok(MarkerObservation::new(id, pts))
            })
            .collect()
    }
}

fn mat_from_rows(rows: usize, cols: usize, values: &[f64]) -> opencv::Result<Mat> {
    let mut m = Mat::zeros(rows as i32, cols as i32, CV_64F)?.to_mat()?;
    for r in 0..rows {
        for c in 0..cols {
            *m.at_2d_mut::<f64>(r as i32, c as i32)? = values[r * cols + c];
        }
    }
    Ok(m)
}

fn vec3_from_mat(m: &Mat) -> opencv::Result<Vector3<f64>> {
    let at = |i: i32| {
        if m.rows() == 1 {
            m.at_2d::<f64>(0, i).copied()
        } else {
            m.at_2d::<f64>(i, 0).copied()
        }
    };
    Ok(Vector3::new(at(0)?, at(1)?, at(2)?))
}

fn intrinsics_to_mats(intrinsics: &CameraIntrinsics) -> opencv::Result<(Mat, Mat)> {
    let k = intrinsics.camera_matrix;
    let rows: Vec<f64> = (0..3)
        .flat_map(|r| (0..3).map(move |c| k[(r, c)]))
        .collect();
    let camera_matrix = mat_from_rows(3, 3, &rows)?;
    let dist_coeffs = mat_from_rows(1, 8, &intrinsics.distortion.coefficients())?;
    Ok((camera_matrix, dist_coeffs))
}

/// Per-marker `solvePnP` with the square-marker IPPE solver.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvPoseEstimator;

impl PoseEstimator for OpenCvPoseEstimator {
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
        let (camera_matrix, dist_coeffs) = intrinsics_to_mats(intrinsics).map_err(backend)?;
        let object: Vector<Point3f> = marker_object_points(marker_length)
            .iter()
            .map(|p| Point3f::new(p.x as f32, p.y as f32, p.z as f32))
            .collect();

        observations
            .iter()
            .map(|obs| {
                let image: Vector<Point2f> = obs
                    .corners
                    .iter()
                    .map(|c| Point2f::new(c.x, c.y))
                    .collect();
                let mut rvec = Mat::default();
                let mut tvec = Mat::default();
                let ok = calib3d::solve_pnp(
                    &object,
                    &image,
                    &camera_matrix,
                    &dist_coeffs,
                    &mut rvec,
                    &mut tvec,
                    false,
                    calib3d::SOLVEPNP_IPPE_SQUARE,
                )
                .map_err(backend)?;
                if !ok {
                    return Err(DetectError::DegenerateCorners { id: obs.id });
                }
                Ok(MarkerPose {
                    id: obs.id,
                    rvec: vec3_from_mat(&rvec).map_err(backend)?,
                    tvec: vec3_from_mat(&tvec).map_err(backend)?,
                })
            })
            .collect()
    }
}

/// HighGUI window with marker outlines; ESC quits.
pub struct HighGuiViewer {
    wait_ms: i32,
}

impl HighGuiViewer {
    pub fn new(wait_ms: u32) -> Self {
        Self {
            wait_ms: i32::try_from(wait_ms).unwrap_or(i32::MAX),
        }
    }
}

impl Viewer<Mat> for HighGuiViewer {
    fn show(&mut self, frame: &Mat, markers: &[MarkerObservation]) -> Result<ViewerControl, TrackError> {
        let mut canvas = frame.try_clone().map_err(viewer)?;
        if !markers.is_empty() {
            let corners: Vector<Vector<Point2f>> = markers
                .iter()
                .map(|m| m.corners.iter().map(|c| Point2f::new(c.x, c.y)).collect())
                .collect();
            let ids: Vector<i32> = markers
                .iter()
                .map(|m| i32::try_from(m.id).unwrap_or(i32::MAX))
                .collect();
            objdetect::draw_detected_markers(
                &mut canvas,
                &corners,
                &ids,
                Scalar::new(0.0, 255.0, 0.0, 0.0),
            )
            .map_err(viewer)?;
        }

        highgui::imshow(WINDOW_NAME, &canvas).map_err(viewer)?;
        let key = highgui::wait_key(self.wait_ms).map_err(viewer)?;
        Ok(if key & 0xff == ESC {
            ViewerControl::Quit
        } else {
            ViewerControl::Continue
        })
    }
}

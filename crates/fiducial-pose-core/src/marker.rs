use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::transform::{build_object_to_camera, HomogeneousTransform};

/// Known position of a marker in the world frame.
pub type WorldPosition = Vector3<f64>;

/// One detected marker in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    /// Dictionary index of the marker.
    pub id: u32,
    /// Pixel corners in TL, TR, BR, BL order.
    pub corners: [Point2<f32>; 4],
}

impl MarkerObservation {
    pub fn new(id: u32, corners: [Point2<f32>; 4]) -> Self {
        Self { id, corners }
    }

    /// Mean of the four corners.
    pub fn center(&self) -> Point2<f32> {
        let sum = self
            .corners
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }
}

/// Marker pose in the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub id: u32,
    /// Rodrigues rotation vector.
    pub rvec: Vector3<f64>,
    /// Translation in the same unit as the marker length.
    pub tvec: Vector3<f64>,
}

impl MarkerPose {
    pub fn object_to_camera(&self) -> HomogeneousTransform {
        build_object_to_camera(&self.rvec, &self.tvec)
    }
}

/// Marker corners in the marker's own frame (z = 0), TL, TR, BR, BL.
///
/// The marker is centred on its origin with x to the right and y up, matching
/// the single-marker convention of OpenCV's ArUco module.
pub fn marker_object_points(marker_length: f64) -> [Point3<f64>; 4] {
    let h = 0.5 * marker_length;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

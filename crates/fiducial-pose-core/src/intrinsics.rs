//! Pinhole intrinsics with OpenCV-ordered lens distortion.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationError;

/// Fixed-point iterations used by [`Distortion::undistort`].
const UNDISTORT_ITERS: usize = 10;

/// Radial/tangential distortion in OpenCV coefficient order
/// `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
///
/// `k4..k6` form the denominator of the rational model and are zero for the
/// common 4- and 5-coefficient calibrations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    /// How many coefficients the calibration provided (0, 4, 5 or 8).
    #[serde(default)]
    pub count: usize,
}

impl Distortion {
    /// Build from a raw OpenCV coefficient vector of length 0, 4, 5 or 8.
    ///
    /// Thin-prism (12) and tilted-sensor (14) models are rejected.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self, CalibrationError> {
        let get = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        match coeffs.len() {
            0 | 4 | 5 | 8 => Ok(Self {
                k1: get(0),
                k2: get(1),
                p1: get(2),
                p2: get(3),
                k3: get(4),
                k4: get(5),
                k5: get(6),
                k6: get(7),
                count: coeffs.len(),
            }),
            n => Err(CalibrationError::UnsupportedDistortion { count: n }),
        }
    }

    /// The eight coefficients in OpenCV order.
    pub fn coefficients(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    /// The coefficients as the calibration listed them, without padding.
    pub fn provided_coefficients(&self) -> Vec<f64> {
        self.coefficients()[..self.count.min(8)].to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients().iter().all(|&c| c == 0.0)
    }

    /// Radial gain `num / den` for squared radius `r2`.
    fn radial(&self, r2: f64) -> (f64, f64) {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        (num, den)
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> Vector2<f64> {
        Vector2::new(
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Apply distortion to an ideal normalized point.
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let r2 = n.norm_squared();
        let (num, den) = self.radial(r2);
        n * (num / den) + self.tangential(n.x, n.y, r2)
    }

    /// Remove distortion from a normalized point.
    ///
    /// Fixed-point iteration `x = (x_d - δ(x)) * den/num`, the scheme used by
    /// OpenCV's `undistortPoints`. Converges for the mild distortion of
    /// ordinary webcam lenses.
    pub fn undistort(&self, n_dist: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *n_dist;
        }
        let mut n = *n_dist;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = n.norm_squared();
            let (num, den) = self.radial(r2);
            if num.abs() < 1e-12 {
                break;
            }
            n = (n_dist - self.tangential(n.x, n.y, r2)) * (den / num);
        }
        n
    }
}

/// Camera matrix and distortion, loaded once at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// `[[fx, s, cx], [0, fy, cy], [0, 0, 1]]`.
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Distortion,
}

impl CameraIntrinsics {
    pub fn new(camera_matrix: Matrix3<f64>, distortion: Distortion) -> Self {
        Self {
            camera_matrix,
            distortion,
        }
    }

    /// Ideal pinhole camera without skew or distortion.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(
            Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            Distortion::default(),
        )
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.camera_matrix[(0, 2)]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.camera_matrix[(1, 2)]
    }

    #[inline]
    fn skew(&self) -> f64 {
        self.camera_matrix[(0, 1)]
    }

    /// Pixel to undistorted normalized coordinates on the `z = 1` plane.
    pub fn pixel_to_normalized(&self, pixel: &Point2<f64>) -> Point2<f64> {
        let y = (pixel.y - self.cy()) / self.fy();
        let x = (pixel.x - self.cx() - self.skew() * y) / self.fx();
        Point2::from(self.distortion.undistort(&Vector2::new(x, y)))
    }

    /// Project a camera-frame point to pixels, distortion included.
    ///
    /// Returns `None` for points at or behind the camera centre.
    pub fn project(&self, p_cam: &Point3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= f64::EPSILON {
            return None;
        }
        let n = self
            .distortion
            .distort(&Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z));
        Some(Point2::new(
            self.fx() * n.x + self.skew() * n.y + self.cx(),
            self.fy() * n.y + self.cy(),
        ))
    }
}

//! Loading camera intrinsics from a calibration file.
//!
//! The expected document is what OpenCV's `FileStorage` writes for a `.json`
//! target: top-level keys `camera_matrix` and `distortion_coefficients`, each
//! an `opencv-matrix` node:
//!
//! ```json
//! {
//!   "camera_matrix": {
//!     "type_id": "opencv-matrix", "rows": 3, "cols": 3, "dt": "d",
//!     "data": [812.0, 0.0, 319.5, 0.0, 808.0, 241.0, 0.0, 0.0, 1.0]
//!   },
//!   "distortion_coefficients": {
//!     "type_id": "opencv-matrix", "rows": 1, "cols": 5, "dt": "d",
//!     "data": [-0.12, 0.03, 0.0008, -0.0004, 0.0]
//!   }
//! }
//! ```
//!
//! Plain nested arrays (`[[fx, 0, cx], ...]`) and flat arrays are accepted for
//! either key. Other keys in the document are ignored.

use std::{fs, path::Path};

use nalgebra::Matrix3;
use serde::Deserialize;

use crate::intrinsics::{CameraIntrinsics, Distortion};

/// File name looked up when no calibration path is configured.
pub const DEFAULT_CALIBRATION_PATH: &str = "calibration_params.json";

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read calibration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed calibration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "calibration is OpenCV YAML; re-save it with cv::FileStorage under a .json name"
    )]
    Yaml,

    #[error("calibration document has no `{key}` entry")]
    MissingKey { key: &'static str },

    #[error("`{key}` must be {expected}, got {rows}x{cols}")]
    Shape {
        key: &'static str,
        expected: &'static str,
        rows: usize,
        cols: usize,
    },

    #[error("`{key}` declares {rows}x{cols} but carries {len} values")]
    DataLength {
        key: &'static str,
        rows: usize,
        cols: usize,
        len: usize,
    },

    #[error("camera matrix has non-positive focal length (fx={fx}, fy={fy})")]
    DegenerateCameraMatrix { fx: f64, fy: f64 },

    #[error("unsupported distortion model with {count} coefficients (expected 0, 4, 5 or 8)")]
    UnsupportedDistortion { count: usize },
}

#[derive(Debug, Deserialize)]
struct OpenCvMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MatrixNode {
    OpenCv(OpenCvMatrix),
    Rows(Vec<Vec<f64>>),
    Flat(Vec<f64>),
}

#[derive(Debug, Deserialize)]
struct CalibrationDocument {
    #[serde(default)]
    camera_matrix: Option<MatrixNode>,
    #[serde(default)]
    distortion_coefficients: Option<MatrixNode>,
}

/// Row-major dense matrix after shape validation.
struct Dense {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatrixNode {
    fn into_dense(self, key: &'static str) -> Result<Dense, CalibrationError> {
        let (rows, cols, data) = match self {
            MatrixNode::OpenCv(m) => (m.rows, m.cols, m.data),
            MatrixNode::Rows(rows) => {
                let n = rows.len();
                let cols = rows.first().map_or(0, Vec::len);
                if rows.iter().any(|r| r.len() != cols) {
                    let len = rows.iter().map(Vec::len).sum();
                    return Err(CalibrationError::DataLength {
                        key,
                        rows: n,
                        cols,
                        len,
                    });
                }
                (n, cols, rows.into_iter().flatten().collect())
            }
            MatrixNode::Flat(data) => (1, data.len(), data),
        };
        if rows * cols != data.len() {
            return Err(CalibrationError::DataLength {
                key,
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Dense { rows, cols, data })
    }
}

impl CameraIntrinsics {
    /// Load intrinsics from a calibration JSON file on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse intrinsics from calibration JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, CalibrationError> {
        if raw.trim_start().starts_with("%YAML") {
            return Err(CalibrationError::Yaml);
        }
        let doc: CalibrationDocument = serde_json::from_str(raw)?;

        let km = doc
            .camera_matrix
            .ok_or(CalibrationError::MissingKey {
                key: "camera_matrix",
            })?
            .into_dense("camera_matrix")?;
        if km.rows != 3 || km.cols != 3 {
            return Err(CalibrationError::Shape {
                key: "camera_matrix",
                expected: "3x3",
                rows: km.rows,
                cols: km.cols,
            });
        }
        let camera_matrix = Matrix3::from_row_slice(&km.data);
        let (fx, fy) = (camera_matrix[(0, 0)], camera_matrix[(1, 1)]);
        if !(fx > 0.0 && fy > 0.0) {
            return Err(CalibrationError::DegenerateCameraMatrix { fx, fy });
        }

        let dm = doc
            .distortion_coefficients
            .ok_or(CalibrationError::MissingKey {
                key: "distortion_coefficients",
            })?
            .into_dense("distortion_coefficients")?;
        if dm.rows != 1 && dm.cols != 1 && !dm.data.is_empty() {
            return Err(CalibrationError::Shape {
                key: "distortion_coefficients",
                expected: "a row or column vector",
                rows: dm.rows,
                cols: dm.cols,
            });
        }
        let distortion = Distortion::from_coefficients(&dm.data)?;

        log::debug!(
            "calibration: fx={fx} fy={fy} cx={} cy={} distortion={:?}",
            camera_matrix[(0, 2)],
            camera_matrix[(1, 2)],
            distortion.provided_coefficients()
        );
        Ok(Self::new(camera_matrix, distortion))
    }
}

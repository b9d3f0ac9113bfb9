//! JSON configuration for the tracking binary.
//!
//! Every field is optional in the file; command-line flags override whatever
//! the file provides.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fiducial_pose_core::{PredefinedDictionary, DEFAULT_CALIBRATION_PATH};
use serde::{Deserialize, Serialize};

use crate::world::{WorldInputError, WorldPositions};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid world position: {0}")]
    World(#[from] WorldInputError),

    #[error("marker length must be positive and finite, got {0}")]
    MarkerLength(f64),
}

/// Where frames come from: a capture device index or a video file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoSource {
    Device(i32),
    Path(PathBuf),
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::Device(0)
    }
}

impl FromStr for VideoSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i32>() {
            Ok(index) => Self::Device(index),
            Err(_) => Self::Path(PathBuf::from(s)),
        })
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(index) => write!(f, "camera {index}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

fn default_calibration_path() -> PathBuf {
    PathBuf::from(DEFAULT_CALIBRATION_PATH)
}

fn default_marker_length() -> f64 {
    0.2
}

fn default_wait_ms() -> u32 {
    10
}

/// Settings of one tracking session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_calibration_path")]
    pub calibration_path: PathBuf,
    #[serde(default)]
    pub dictionary: PredefinedDictionary,
    /// Printed marker side length; poses are reported in the same unit.
    #[serde(default = "default_marker_length")]
    pub marker_length_m: f64,
    /// Milliseconds the preview window waits for a key per frame.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u32,
    #[serde(default)]
    pub video: VideoSource,
    #[serde(default)]
    pub world_positions: WorldPositions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            calibration_path: default_calibration_path(),
            dictionary: PredefinedDictionary::default(),
            marker_length_m: default_marker_length(),
            wait_ms: default_wait_ms(),
            video: VideoSource::default(),
            world_positions: WorldPositions::default(),
        }
    }
}

impl TrackerConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.marker_length_m.is_finite() && self.marker_length_m > 0.0) {
            return Err(ConfigError::MarkerLength(self.marker_length_m));
        }
        Ok(())
    }
}

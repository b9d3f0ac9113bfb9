//! Recorded detections, one JSON object per line.
//!
//! ```text
//! {"markers": [{"id": 3, "corners": [[412.0, 220.5], [501.2, 224.0], [497.8, 310.1], [409.9, 305.7]]}]}
//! {"markers": []}
//! ```
//!
//! Each line is one frame. Blank lines are skipped. Running the tracker on a
//! replay needs no camera and no vision backend.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use fiducial_pose_core::{DetectError, MarkerDetector, MarkerObservation};
use serde::{Deserialize, Serialize};

use crate::pipeline::{FrameSource, TrackError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub markers: Vec<MarkerObservation>,
}

pub struct ReplaySource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Result<Option<ReplayFrame>, TrackError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line)
                .map(Some)
                .map_err(|source| TrackError::Replay {
                    line: self.line_no,
                    source,
                });
        }
        Ok(None)
    }
}

/// Hands back the markers recorded in each replay frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayDetector;

impl MarkerDetector for ReplayDetector {
    type Frame = ReplayFrame;

    fn detect_markers(&mut self, frame: &ReplayFrame) -> Result<Vec<MarkerObservation>, DetectError> {
        Ok(frame.markers.clone())
    }
}

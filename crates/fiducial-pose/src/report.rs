//! Per-frame output of the tracking loop.

use std::io::Write;

use fiducial_pose_core::{HomogeneousTransform, MarkerObservation, MarkerPose};
use serde::{Deserialize, Serialize};

use crate::pipeline::ComposedPose;

/// Everything the loop learned from one frame with at least one marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub markers: Vec<MarkerObservation>,
    pub poses: Vec<MarkerPose>,
    /// Transforms for the first marker of the frame.
    #[serde(flatten)]
    pub composed: ComposedPose,
}

/// Receives frame reports as they are produced.
pub trait ReportSink {
    fn emit(&mut self, report: &FrameReport) -> std::io::Result<()>;
}

/// Collects reports in memory.
impl ReportSink for Vec<FrameReport> {
    fn emit(&mut self, report: &FrameReport) -> std::io::Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Human-readable matrices, one labelled block per transform.
pub struct TextReport<W> {
    out: W,
    precision: Option<usize>,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            precision: None,
        }
    }

    /// Print matrix entries with a fixed number of decimals.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_transform(&mut self, label: &str, t: &HomogeneousTransform) -> std::io::Result<()> {
        match self.precision {
            Some(p) => writeln!(self.out, "{label} =\n{t:.p$}"),
            None => writeln!(self.out, "{label} =\n{t}"),
        }
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn emit(&mut self, report: &FrameReport) -> std::io::Result<()> {
        let c = &report.composed;
        writeln!(
            self.out,
            "frame {}: marker {} ({} detected)",
            report.frame_index,
            c.marker_id,
            report.markers.len()
        )?;
        self.write_transform("object_to_camera", &c.object_to_camera)?;
        self.write_transform("camera_to_object", &c.camera_to_object)?;
        if let Some(t) = &c.object_to_world {
            self.write_transform("object_to_world", t)?;
        }
        if let Some(t) = &c.camera_to_world {
            self.write_transform("camera_to_world", t)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// One JSON object per line.
pub struct JsonLinesReport<W> {
    out: W,
}

impl<W: Write> JsonLinesReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonLinesReport<W> {
    fn emit(&mut self, report: &FrameReport) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, report)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose_frame;
    use fiducial_pose_core::WorldPosition;
    use nalgebra::{Point2, Vector3};

    fn sample_report(world: Option<WorldPosition>) -> FrameReport {
        let pose = MarkerPose {
            id: 5,
            rvec: Vector3::zeros(),
            tvec: Vector3::new(0.0, 0.0, 2.0),
        };
        let marker = MarkerObservation::new(
            5,
            [
                Point2::new(10.0, 10.0),
                Point2::new(20.0, 10.0),
                Point2::new(20.0, 20.0),
                Point2::new(10.0, 20.0),
            ],
        );
        FrameReport {
            frame_index: 3,
            markers: vec![marker],
            poses: vec![pose],
            composed: compose_frame(&pose, world).expect("compose"),
        }
    }

    #[test]
    fn text_report_lists_all_transforms() {
        let mut sink = TextReport::new(Vec::new()).with_precision(2);
        sink.emit(&sample_report(Some(WorldPosition::new(1.0, 0.0, 0.0))))
            .expect("emit");
        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        assert!(text.starts_with("frame 3: marker 5 (1 detected)\n"));
        for label in [
            "object_to_camera =",
            "camera_to_object =",
            "object_to_world =",
            "camera_to_world =",
        ] {
            assert!(text.contains(label), "missing {label} in:\n{text}");
        }
        assert!(text.contains("[1.00, 0.00, 0.00, 1.00;"));
        assert!(text.contains(" 0.00, 0.00, 1.00, -2.00;"));
    }

    #[test]
    fn text_report_skips_world_blocks_without_position() {
        let mut sink = TextReport::new(Vec::new());
        sink.emit(&sample_report(None)).expect("emit");
        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        assert!(text.contains("camera_to_object ="));
        assert!(!text.contains("camera_to_world"));
    }

    #[test]
    fn json_lines_are_flat_objects() {
        let mut sink = JsonLinesReport::new(Vec::new());
        sink.emit(&sample_report(Some(WorldPosition::new(1.0, 2.0, 3.0))))
            .expect("emit");
        sink.emit(&sample_report(None)).expect("emit");
        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["frame_index"], 3);
        assert_eq!(first["marker_id"], 5);
        assert_eq!(first["camera_to_world"][2][3], 1.0);

        let second: FrameReport = serde_json::from_str(lines[1]).expect("report");
        assert_eq!(second.composed.camera_to_world, None);
        assert_eq!(second, sample_report(None));
    }
}

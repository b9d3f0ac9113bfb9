use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// 800 px focal length, principal point (320, 240), OpenCV FileStorage layout.
const CALIBRATION: &str = r#"{
    "camera_matrix": {
        "type_id": "opencv-matrix", "rows": 3, "cols": 3, "dt": "d",
        "data": [800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0]
    },
    "distortion_coefficients": {
        "type_id": "opencv-matrix", "rows": 1, "cols": 5, "dt": "d",
        "data": [0.0, 0.0, 0.0, 0.0, 0.0]
    }
}"#;

/// A 0.2 m marker facing the camera 2 m away, then an empty frame, then the
/// same marker again.
const REPLAY: &str = concat!(
    r#"{"markers": [{"id": 0, "corners": [[280, 280], [360, 280], [360, 200], [280, 200]]}]}"#,
    "\n",
    r#"{"markers": []}"#,
    "\n",
    r#"{"markers": [{"id": 0, "corners": [[280, 280], [360, 280], [360, 200], [280, 200]]}]}"#,
    "\n",
);

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("calibration_params.json"), CALIBRATION).expect("calibration");
        fs::write(dir.path().join("session.jsonl"), REPLAY).expect("replay");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("fiducial-pose").expect("binary");
        cmd.current_dir(self.dir.path())
            .arg("--replay")
            .arg(self.path("session.jsonl"));
        cmd
    }
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn translation(matrix: &serde_json::Value) -> [f64; 3] {
    [0, 1, 2].map(|r| matrix[r][3].as_f64().expect("number"))
}

fn assert_close(actual: [f64; 3], expected: [f64; 3]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
    }
}

#[test]
fn prints_transforms_for_replayed_frames() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["--world", "0:1,2,3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("camera_matrix ="))
        .stdout(predicate::str::contains("frame 0: marker 0 (1 detected)"))
        .stdout(predicate::str::contains("frame 2: marker 0 (1 detected)"))
        .stdout(predicate::str::contains("frame 1:").not())
        .stdout(predicate::str::contains("object_to_camera ="))
        .stdout(predicate::str::contains("camera_to_object ="))
        .stdout(predicate::str::contains("object_to_world =\n[1, 0, 0, 1;"))
        .stdout(predicate::str::contains("camera_to_world ="));
}

#[test]
fn json_output_places_camera_behind_marker() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--world", "0:1,2,3"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["frame_index"], 0);
    assert_eq!(reports[1]["frame_index"], 2);
    assert_eq!(reports[0]["marker_id"], 0);

    assert_close(translation(&reports[0]["object_to_camera"]), [0.0, 0.0, 2.0]);
    assert_close(translation(&reports[0]["camera_to_object"]), [0.0, 0.0, -2.0]);
    assert_close(translation(&reports[0]["camera_to_world"]), [1.0, 2.0, 1.0]);
}

#[test]
fn default_world_position_applies_to_any_marker() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--world", "0.5,0,0"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let reports = json_lines(&output.stdout);
    assert_close(translation(&reports[0]["camera_to_world"]), [0.5, 0.0, -2.0]);
}

#[test]
fn world_positions_come_from_config() {
    let fx = Fixture::new();
    fs::write(
        fx.path("tracker.json"),
        r#"{"marker_length_m": 0.4, "world_positions": {"markers": {"0": [0, 0, 5]}}}"#,
    )
    .expect("config");

    let output = fx
        .cmd()
        .arg("--json")
        .arg("--config")
        .arg(fx.path("tracker.json"))
        .output()
        .expect("run");
    assert!(output.status.success());
    let reports = json_lines(&output.stdout);
    // Twice the marker length at the same pixel size puts it twice as far.
    assert_close(translation(&reports[0]["object_to_camera"]), [0.0, 0.0, 4.0]);
    assert_close(translation(&reports[0]["camera_to_world"]), [0.0, 0.0, 1.0]);
}

#[test]
fn missing_world_position_is_warned_once() {
    let fx = Fixture::new();
    let output = fx.cmd().arg("--json").output().expect("run");
    assert!(output.status.success());

    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.get("camera_to_world").is_none()));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("no world position for marker 0").count(), 1);
}

#[test]
fn log_level_filters_stderr() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--log-level", "error"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("no world position"), "{stderr}");

    fx.cmd()
        .args(["--log-level", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--log-level"));
}

#[test]
fn echoes_only_the_loaded_distortion_coefficients() {
    let fx = Fixture::new();
    fx.cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "distortion_coefficients =\n[0, 0, 0, 0, 0]\n",
        ));
}

#[test]
fn blocking_input_keeps_known_positions() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--blocking-input", "--world", "0:1,2,3"])
        .write_stdin("")
        .output()
        .expect("run");
    assert!(output.status.success());

    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_close(translation(&report["camera_to_world"]), [1.0, 2.0, 1.0]);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("world position of marker"), "{stderr}");
}

#[test]
fn blocking_input_answer_is_remembered() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--blocking-input"])
        .write_stdin("0 0 5\n")
        .output()
        .expect("run");
    assert!(output.status.success());

    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_close(translation(&report["camera_to_world"]), [0.0, 0.0, 3.0]);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("world position of marker 0").count(), 1);
}

#[test]
fn blocking_input_accepts_marker_id_prefix() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--blocking-input"])
        .write_stdin("0 1 2 3\n")
        .output()
        .expect("run");
    assert!(output.status.success());

    let reports = json_lines(&output.stdout);
    assert_close(translation(&reports[0]["camera_to_world"]), [1.0, 2.0, 1.0]);
    assert_close(translation(&reports[1]["camera_to_world"]), [1.0, 2.0, 1.0]);
}

#[test]
fn max_frames_limits_the_run() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "--max-frames", "1"])
        .output()
        .expect("run");
    assert!(output.status.success());
    assert_eq!(json_lines(&output.stdout).len(), 1);
}

#[test]
fn missing_calibration_fails() {
    let fx = Fixture::new();
    fx.cmd()
        .arg("--calibration")
        .arg(Path::new("nope.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn bad_replay_line_fails_with_line_number() {
    let fx = Fixture::new();
    fs::write(fx.path("session.jsonl"), "{\"markers\": []}\nnot json\n").expect("replay");
    fx.cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("replay line 2"));
}

#[test]
fn rejects_unknown_dictionary() {
    let fx = Fixture::new();
    fx.cmd().args(["-d", "17"]).assert().failure();
}

#[test]
fn rejects_malformed_world_flag() {
    let fx = Fixture::new();
    fx.cmd().args(["--world", "0:1,2"]).assert().failure();
}

#[cfg(not(feature = "opencv"))]
#[test]
fn live_capture_needs_opencv() {
    let fx = Fixture::new();
    Command::cargo_bin("fiducial-pose")
        .expect("binary")
        .current_dir(fx.dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--replay"));
}

//! `fiducial-pose`: detect ArUco markers and print where the camera is in the
//! world.

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fiducial_pose::core::{CameraIntrinsics, PlanarPoseEstimator, PredefinedDictionary};
use fiducial_pose::replay::{ReplayDetector, ReplaySource};
use fiducial_pose::world::{spawn_stdin_reader, BlockingWorldInput, LiveWorldPositions};
use fiducial_pose::{
    JsonLinesReport, NullViewer, ReportSink, RunSummary, TextReport, TrackError, Tracker,
    TrackerConfig, TrackerSettings, VideoSource, WorldInputError, WorldPositionProvider,
    WorldUpdate,
};
use log::{info, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "fiducial-pose", version)]
#[command(about = "Locate a calibrated camera in the world from ArUco markers")]
struct Args {
    /// Marker dictionary: 0..=16 or a name such as DICT_6X6_50.
    #[arg(short = 'd', long)]
    dictionary: Option<PredefinedDictionary>,

    /// Camera index or video file.
    #[arg(short = 'v', long)]
    video: Option<VideoSource>,

    /// Calibration JSON with `camera_matrix` and `distortion_coefficients`.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Printed marker side length in meters.
    #[arg(long)]
    marker_length: Option<f64>,

    /// Milliseconds the preview window waits for a key.
    #[arg(long)]
    wait_ms: Option<u32>,

    /// JSON config; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// World position of a marker (`ID:X,Y,Z`) or of every marker (`X,Y,Z`). Repeatable.
    #[arg(long = "world", value_name = "ID:X,Y,Z", value_parser = parse_world)]
    world: Vec<WorldUpdate>,

    /// Read recorded detections from a JSON-lines file instead of a camera.
    #[arg(long, value_name = "JSONL")]
    replay: Option<PathBuf>,

    /// Print one JSON object per frame instead of matrices.
    #[arg(long)]
    json: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Prompt for `x y z` on stdin for every frame with a marker.
    #[arg(long)]
    blocking_input: bool,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn parse_world(s: &str) -> Result<WorldUpdate, WorldInputError> {
    WorldUpdate::parse_flag(s)
}

impl Args {
    fn apply_to(&self, cfg: &mut TrackerConfig) {
        if let Some(dictionary) = self.dictionary {
            cfg.dictionary = dictionary;
        }
        if let Some(video) = &self.video {
            cfg.video = video.clone();
        }
        if let Some(path) = &self.calibration {
            cfg.calibration_path = path.clone();
        }
        if let Some(length) = self.marker_length {
            cfg.marker_length_m = length;
        }
        if let Some(wait_ms) = self.wait_ms {
            cfg.wait_ms = wait_ms;
        }
        for update in &self.world {
            cfg.world_positions.apply(*update);
        }
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    let mut cfg = match &args.config {
        Some(path) => TrackerConfig::load_json(path)?,
        None => TrackerConfig::default(),
    };
    args.apply_to(&mut cfg);
    cfg.validate()?;

    let intrinsics = CameraIntrinsics::load_json(&cfg.calibration_path)?;
    info!("loaded calibration from {}", cfg.calibration_path.display());
    if !args.json {
        print_calibration(&intrinsics);
    }

    let settings = TrackerSettings {
        marker_length: cfg.marker_length_m,
        max_frames: args.max_frames,
    };

    let mut world: Box<dyn WorldPositionProvider> = if args.blocking_input {
        Box::new(BlockingWorldInput::new(
            cfg.world_positions.clone(),
            io::stdin().lock(),
        ))
    } else {
        Box::new(LiveWorldPositions::new(
            cfg.world_positions.clone(),
            Some(spawn_stdin_reader()?),
        ))
    };

    let mut sink: Box<dyn ReportSink> = if args.json {
        Box::new(JsonLinesReport::new(io::stdout()))
    } else {
        Box::new(TextReport::new(io::stdout()))
    };

    let summary = match &args.replay {
        Some(path) => {
            let mut source = ReplaySource::open(path)?;
            let mut tracker =
                Tracker::new(ReplayDetector, PlanarPoseEstimator, intrinsics, settings);
            tracker.run(&mut source, &mut NullViewer, world.as_mut(), sink.as_mut())?
        }
        None => run_live(&cfg, intrinsics, settings, world.as_mut(), sink.as_mut())?,
    };
    info!(
        "{} frames processed, {} with markers",
        summary.frames, summary.detections
    );
    Ok(())
}

#[cfg(feature = "opencv")]
fn run_live(
    cfg: &TrackerConfig,
    intrinsics: CameraIntrinsics,
    settings: TrackerSettings,
    world: &mut dyn WorldPositionProvider,
    sink: &mut dyn ReportSink,
) -> Result<RunSummary, TrackError> {
    use fiducial_pose::opencv_backend::{
        ArucoMarkerDetector, CaptureSource, HighGuiViewer, OpenCvPoseEstimator,
    };

    let mut source = CaptureSource::open(&cfg.video)?;
    let detector = ArucoMarkerDetector::new(cfg.dictionary)?;
    let mut viewer = HighGuiViewer::new(cfg.wait_ms);
    let mut tracker = Tracker::new(detector, OpenCvPoseEstimator, intrinsics, settings);
    tracker.run(&mut source, &mut viewer, world, sink)
}

#[cfg(not(feature = "opencv"))]
fn run_live(
    cfg: &TrackerConfig,
    _intrinsics: CameraIntrinsics,
    _settings: TrackerSettings,
    _world: &mut dyn WorldPositionProvider,
    _sink: &mut dyn ReportSink,
) -> Result<RunSummary, TrackError> {
    Err(TrackError::Source(format!(
        "cannot open {}: built without the `opencv` feature, use --replay",
        cfg.video
    )))
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "tracing")]
    {
        fiducial_pose::core::init_tracing(&level.to_string().to_ascii_lowercase(), false);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        fiducial_pose::core::init_with_level(level)?;
        Ok(())
    }
}

fn print_calibration(intrinsics: &CameraIntrinsics) {
    let k = &intrinsics.camera_matrix;
    println!("camera_matrix =");
    println!(
        "[{}, {}, {};\n {}, {}, {};\n {}, {}, {}]",
        k[(0, 0)],
        k[(0, 1)],
        k[(0, 2)],
        k[(1, 0)],
        k[(1, 1)],
        k[(1, 2)],
        k[(2, 0)],
        k[(2, 1)],
        k[(2, 2)]
    );
    let coeffs = intrinsics
        .distortion
        .provided_coefficients()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("distortion_coefficients =\n[{coeffs}]");
    println!();
}

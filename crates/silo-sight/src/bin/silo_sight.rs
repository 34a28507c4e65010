//! `silo-sight`: calibrate a stereo rig, validate a calibration, and score
//! one front/side frame pair.
//!
//! Exit codes of `detect`: 0 real human, 1 deepfake or failure, 2 no face in
//! a view.

use clap::{Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use silo_sight::calib::{
    validate_calibration, CalibrationError, CalibrationIoError, CalibrationSolver,
};
use silo_sight::detect::{default_chess_config, ChessboardCornerDetector, DetectError};
use silo_sight::frames::{
    crop_for_split, image_size, load_all, load_gray, paired_image_lists, split_combined,
    to_core_image, FrameError, FrontPosition, Layout, DEFAULT_CROP_THRESHOLD,
};
use silo_sight::score::SinkError;
use silo_sight::stereo::TriangulationError;
use silo_sight::{
    CalibrationConfig, ConfigError, DetectorConfig, LandmarkError, Pipeline, PipelineError,
    SidecarLandmarks, StereoCalibration, Triangulator, View, ViewFrame,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "silo-sight",
    version,
    about = "Stereo-consistency deepfake detection"
)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calibrate the camera pair from chessboard images or videos
    Calibrate(CalibrateArgs),
    /// Score one front/side frame pair against a calibration
    Detect(DetectArgs),
    /// Check a saved calibration for physical plausibility
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Directory of camera 1 (front) chessboard images.
    #[arg(long, requires = "cam2_dir", conflicts_with_all = ["cam1_video", "cam2_video"])]
    cam1_dir: Option<PathBuf>,
    /// Directory of camera 2 (side) chessboard images.
    #[arg(long, requires = "cam1_dir")]
    cam2_dir: Option<PathBuf>,
    /// Camera 1 calibration video.
    #[arg(long, requires = "cam2_video")]
    cam1_video: Option<PathBuf>,
    /// Camera 2 calibration video.
    #[arg(long, requires = "cam1_video")]
    cam2_video: Option<PathBuf>,
    /// One recording showing both cameras, e.g. a captured video call.
    #[arg(long, conflicts_with_all = ["cam1_dir", "cam2_dir", "cam1_video", "cam2_video"])]
    combined_video: Option<PathBuf>,
    /// Arrangement of the views in `--combined-video`.
    #[arg(long, default_value = "side-by-side")]
    layout: Layout,
    /// Half of `--combined-video` holding camera 1.
    #[arg(long, default_value = "left")]
    front: FrontPosition,
    /// Keep every N-th video frame.
    #[arg(long)]
    frame_interval: Option<usize>,
    /// Inner corners per chessboard row.
    #[arg(long)]
    cols: Option<usize>,
    /// Inner corners per chessboard column.
    #[arg(long)]
    rows: Option<usize>,
    /// Chessboard square edge in meters.
    #[arg(long)]
    square_size: Option<f64>,
    /// Minimum detections per camera and synchronized pairs.
    #[arg(long)]
    min_images: Option<usize>,
    #[arg(short, long, default_value = "stereo_calibration.json")]
    output: PathBuf,
    /// Calibration settings (JSON); flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long, default_value = "stereo_calibration.json")]
    calibration: PathBuf,
    /// Landmark sidecar JSON with `front` and `side` records.
    #[arg(long)]
    landmarks: PathBuf,
    /// One frame holding both views.
    #[arg(long, conflicts_with_all = ["front_image", "side_image"])]
    combined: Option<PathBuf>,
    #[arg(long, default_value = "side-by-side")]
    layout: Layout,
    /// Half of the combined frame holding the front view.
    #[arg(long, default_value = "left")]
    front: FrontPosition,
    #[arg(long, requires = "side_image")]
    front_image: Option<PathBuf>,
    #[arg(long, requires = "front_image")]
    side_image: Option<PathBuf>,
    /// Write the result as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
    /// Append the result to a CSV log.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Detector settings (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long, default_value = "stereo_calibration.json")]
    calibration: PathBuf,
    /// Detector settings (JSON) carrying the validation policy.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frames(#[from] FrameError),

    #[error(transparent)]
    Detector(#[from] DetectError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    CalibrationIo(#[from] CalibrationIoError),

    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    #[error(transparent)]
    Landmarks(#[from] LandmarkError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to write result: {0}")]
    Sink(#[from] SinkError),

    #[cfg(feature = "video")]
    #[error(transparent)]
    Video(#[from] silo_sight::video::VideoError),

    #[error("{0}")]
    Input(String),
}

/// Outcome of a `detect` run.
enum Verdict {
    Real,
    Deepfake,
    NoFace,
}

impl From<Verdict> for ExitCode {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Real => ExitCode::SUCCESS,
            Verdict::Deepfake => ExitCode::from(1),
            Verdict::NoFace => ExitCode::from(2),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Calibrate(args) => calibrate(args),
        Command::Detect(args) => detect(args).map(ExitCode::from),
        Command::Validate(args) => validate(args),
    };
    outcome.unwrap_or_else(|err| {
        eprintln!("error: {err}");
        ExitCode::from(1)
    })
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        silo_sight::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = silo_sight::core::init_with_level(level);
    }
}

fn calibrate(args: CalibrateArgs) -> Result<ExitCode, CliError> {
    let mut config = match &args.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig::default(),
    };
    if let Some(cols) = args.cols {
        config.target.cols = cols;
    }
    if let Some(rows) = args.rows {
        config.target.rows = rows;
    }
    if let Some(square_size) = args.square_size {
        config.target.square_size = square_size;
    }
    if let Some(min_images) = args.min_images {
        config.solver.min_detections = min_images;
    }
    if let Some(interval) = args.frame_interval {
        config.frame_interval = interval;
    }
    config.validate()?;

    let (first, second) = calibration_frames(&args, config.frame_interval)?;
    let Some(size) = first.first().map(image_size) else {
        return Err(CliError::Input("no calibration frames".to_string()));
    };
    if let Some(other) = second.first().map(image_size) {
        if other != size {
            warn!(
                "camera 2 frames are {}x{}, camera 1 frames {}x{}",
                other.width, other.height, size.width, size.height
            );
        }
    }

    let detector = ChessboardCornerDetector::new(default_chess_config(), config.chessboard_params())?;
    let solver = CalibrationSolver::new(config.target, config.solver)?;
    let outcome = solver.calibrate_images(&detector, &first, &second, size)?;

    outcome.calibration.save_json(&args.output)?;
    println!("{}", outcome.calibration.summary());
    for diagnostic in &outcome.diagnostics {
        println!("{diagnostic}");
    }
    println!("calibration saved to {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

fn calibration_frames(
    args: &CalibrateArgs,
    interval: usize,
) -> Result<(Vec<::image::GrayImage>, Vec<::image::GrayImage>), CliError> {
    if let (Some(dir1), Some(dir2)) = (&args.cam1_dir, &args.cam2_dir) {
        let (paths1, paths2) = paired_image_lists(dir1, dir2)?;
        info!("{} image pairs", paths1.len());
        return Ok((load_all(&paths1)?, load_all(&paths2)?));
    }
    if let (Some(video1), Some(video2)) = (&args.cam1_video, &args.cam2_video) {
        return video_frames(video1, video2, interval);
    }
    if let Some(video) = &args.combined_video {
        return combined_video_frames(video, interval, args.layout, args.front);
    }
    Err(CliError::Input(
        "pass --cam1-dir/--cam2-dir, --cam1-video/--cam2-video or --combined-video".to_string(),
    ))
}

#[cfg(feature = "video")]
fn video_frames(
    first: &std::path::Path,
    second: &std::path::Path,
    interval: usize,
) -> Result<(Vec<::image::GrayImage>, Vec<::image::GrayImage>), CliError> {
    use silo_sight::video::extract_frames;

    let mut frames1 = extract_frames(first, interval)?;
    let mut frames2 = extract_frames(second, interval)?;
    if frames1.len() != frames2.len() {
        warn!(
            "videos differ in sampled length ({} vs {}); truncating to the shorter",
            frames1.len(),
            frames2.len()
        );
        let n = frames1.len().min(frames2.len());
        frames1.truncate(n);
        frames2.truncate(n);
    }
    Ok((frames1, frames2))
}

#[cfg(feature = "video")]
fn combined_video_frames(
    path: &std::path::Path,
    interval: usize,
    layout: Layout,
    front: FrontPosition,
) -> Result<(Vec<::image::GrayImage>, Vec<::image::GrayImage>), CliError> {
    let frames = silo_sight::video::split_video_frames(
        path,
        interval,
        layout,
        front,
        DEFAULT_CROP_THRESHOLD,
    )?;
    info!("{} frame pairs from {}", frames.0.len(), path.display());
    Ok(frames)
}

#[cfg(not(feature = "video"))]
fn combined_video_frames(
    _path: &std::path::Path,
    _interval: usize,
    _layout: Layout,
    _front: FrontPosition,
) -> Result<(Vec<::image::GrayImage>, Vec<::image::GrayImage>), CliError> {
    Err(CliError::Input(
        "video input needs a build with the `video` feature".to_string(),
    ))
}

#[cfg(not(feature = "video"))]
fn video_frames(
    _first: &std::path::Path,
    _second: &std::path::Path,
    _interval: usize,
) -> Result<(Vec<::image::GrayImage>, Vec<::image::GrayImage>), CliError> {
    Err(CliError::Input(
        "video input needs a build with the `video` feature".to_string(),
    ))
}

fn detect(args: DetectArgs) -> Result<Verdict, CliError> {
    let config = match &args.config {
        Some(path) => DetectorConfig::load_json(path)?,
        None => DetectorConfig::default(),
    };
    let triangulator = Arc::new(Triangulator::from_file(&args.calibration)?);
    let provider = SidecarLandmarks::load_json(&args.landmarks)?;
    let (front, side) = view_frames(&args, triangulator.calibration())?;

    let pipeline = Pipeline::new(triangulator, config);
    let Some(result) = pipeline.detect_pair(&provider, &front, &side)? else {
        println!("no face detected in at least one view");
        return Ok(Verdict::NoFace);
    };

    if let Some(path) = &args.json {
        result.write_json(path)?;
    }
    if let Some(path) = &args.csv {
        result.append_csv(path)?;
    }
    println!("{}", result.to_report());
    Ok(if result.is_deepfake {
        Verdict::Deepfake
    } else {
        Verdict::Real
    })
}

/// Frames handed to the landmark provider. Without images, both views take
/// the calibrated image size.
fn view_frames(
    args: &DetectArgs,
    calib: &StereoCalibration,
) -> Result<(ViewFrame, ViewFrame), CliError> {
    if let Some(path) = &args.combined {
        let combined = crop_for_split(&load_gray(path)?, DEFAULT_CROP_THRESHOLD, args.layout);
        let (front, side) = split_combined(&combined, args.layout, args.front)?;
        return Ok((
            ViewFrame::with_image(View::Front, to_core_image(&front)),
            ViewFrame::with_image(View::Side, to_core_image(&side)),
        ));
    }
    if let (Some(front), Some(side)) = (&args.front_image, &args.side_image) {
        return Ok((
            ViewFrame::with_image(View::Front, to_core_image(&load_gray(front)?)),
            ViewFrame::with_image(View::Side, to_core_image(&load_gray(side)?)),
        ));
    }
    let size = calib.image_size;
    Ok((
        ViewFrame::new(View::Front, size.width, size.height),
        ViewFrame::new(View::Side, size.width, size.height),
    ))
}

fn validate(args: ValidateArgs) -> Result<ExitCode, CliError> {
    let calib = StereoCalibration::load_json(&args.calibration)?;
    let policy = match &args.config {
        Some(path) => DetectorConfig::load_json(path)?.validation,
        None => DetectorConfig::default().validation,
    };
    let report = validate_calibration(&calib, &policy);
    for diagnostic in &report.diagnostics {
        println!("{diagnostic}");
    }
    println!("{}", calib.summary());
    if report.passed() {
        println!("calibration passed");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("calibration FAILED");
        Ok(ExitCode::from(1))
    }
}

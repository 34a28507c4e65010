//! High-level facade crate for the `silo-sight-*` workspace.
//!
//! Two cameras watch the same subject from different angles. A real face is
//! a rigid 3-D point cloud, so landmarks observed in both views triangulate
//! to points that reproject almost exactly onto the observations. A flat
//! replay (a screen or a print held in front of the rig) cannot satisfy both
//! projections at once and leaves a large reprojection error.
//!
//! This crate provides:
//! - stable re-exports of the underlying crates
//! - the [`Pipeline`] orchestrator: landmarks in, [`DetectionResult`] out
//! - the [`LandmarkProvider`] contract and a JSON sidecar provider
//! - (feature `image`) image ingestion and chessboard detection wired into
//!   the calibration solver
//! - (feature `video`) frame extraction from video files with `ffmpeg-next`
//!
//! ## Quickstart
//!
//! ```
//! use std::sync::Arc;
//! use silo_sight::calib::synthetic::SyntheticRig;
//! use silo_sight::stereo::Triangulator;
//! use silo_sight::{DetectorConfig, Pipeline};
//! use nalgebra::Point3;
//!
//! let rig = SyntheticRig::reference();
//! let triangulator = Arc::new(Triangulator::new(rig.calibration(0.2)));
//! let pipeline = Pipeline::new(triangulator, DetectorConfig::default());
//!
//! // a rigid face: every landmark is seen consistently by both cameras
//! let face = [
//!     Point3::new(0.0, 0.0, 0.6),
//!     Point3::new(0.03, -0.02, 0.62),
//!     Point3::new(-0.03, -0.02, 0.62),
//!     Point3::new(0.0, 0.05, 0.61),
//!     Point3::new(0.05, 0.01, 0.64),
//!     Point3::new(-0.05, 0.01, 0.64),
//! ];
//! let (front, side): (Vec<_>, Vec<_>) =
//!     face.iter().filter_map(|p| rig.project_pair(p)).unzip();
//!
//! let result = pipeline.detect_landmarks(&front, &side).expect("detection");
//! assert!(!result.is_deepfake);
//! ```
//!
//! ## API map
//! - `silo_sight::core`: cameras, distortion, poses, Levenberg-Marquardt.
//! - `silo_sight::chessboard`: chessboard ordering from ChESS corners.
//! - `silo_sight::calib`: per-camera and stereo calibration, validation.
//! - `silo_sight::stereo`: DLT triangulation and reprojection.
//! - `silo_sight::score`: reprojection statistics, confidence, sinks.
//! - `silo_sight::frames` (feature `image`): image loading, cropping, splitting.
//! - `silo_sight::detect` (feature `image`): chessboard detection from `image::GrayImage`.
//! - `silo_sight::video` (feature `video`): sampled frame extraction.

pub use silo_sight_calib as calib;
pub use silo_sight_chessboard as chessboard;
pub use silo_sight_core as core;
pub use silo_sight_score as score;
pub use silo_sight_stereo as stereo;

mod config;
mod error;
mod landmarks;
mod pipeline;

pub use config::{CalibrationConfig, ConfigError, DetectorConfig, DEFAULT_FRAME_INTERVAL};
pub use error::PipelineError;
pub use landmarks::{
    LandmarkError, LandmarkProvider, LandmarkSelection, SidecarLandmarks, SidecarRecord, View,
    ViewFrame, DEFAULT_LANDMARK_IDS,
};
pub use pipeline::Pipeline;

pub use silo_sight_calib::{StereoCalibration, ValidationReport};
pub use silo_sight_core::CameraId;
pub use silo_sight_score::{DetectionResult, ErrorReport, ScoringThresholds};
pub use silo_sight_stereo::Triangulator;

#[cfg(feature = "image")]
pub mod detect;
#[cfg(feature = "image")]
pub mod frames;
#[cfg(feature = "video")]
pub mod video;

/// Install the workspace `tracing` subscriber and route `log` records into it.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    silo_sight_core::init_tracing(json);
    // no-op when the subscriber already installed the bridge
    let _ = tracing_log::LogTracer::init();
}

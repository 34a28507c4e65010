//! JSON-backed run configuration for the two phases.

use crate::LandmarkSelection;
use serde::{Deserialize, Serialize};
use silo_sight_calib::{CalibrationTarget, SolverPolicy, ValidationPolicy};
use silo_sight_chessboard::ChessboardParams;
use silo_sight_score::ScoringThresholds;
use std::path::Path;

/// Keep every N-th decoded video frame during calibration.
pub const DEFAULT_FRAME_INTERVAL: usize = 15;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings of the detection phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub thresholds: ScoringThresholds,
    pub landmarks: LandmarkSelection,
    /// Applied once to the loaded calibration; findings are logged, never fatal.
    pub validation: ValidationPolicy,
}

impl DetectorConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if !(t.real_threshold.is_finite() && t.deepfake_threshold.is_finite()) {
            return Err(ConfigError::Invalid(
                "scoring thresholds must be finite".to_string(),
            ));
        }
        if t.real_threshold >= t.deepfake_threshold {
            return Err(ConfigError::Invalid(format!(
                "real_threshold ({}) must be below deepfake_threshold ({})",
                t.real_threshold, t.deepfake_threshold
            )));
        }
        if !(0.0..=100.0).contains(&t.human_confidence_cutoff) {
            return Err(ConfigError::Invalid(format!(
                "human_confidence_cutoff ({}) must lie in [0, 100]",
                t.human_confidence_cutoff
            )));
        }
        if self.landmarks.is_empty() {
            return Err(ConfigError::Invalid(
                "landmark selection is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the calibration phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub target: CalibrationTarget,
    pub solver: SolverPolicy,
    /// Corner graph and sub-pixel settings; the board size always follows
    /// `target`.
    pub chessboard: ChessboardParams,
    pub frame_interval: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let target = CalibrationTarget::default();
        Self {
            target,
            solver: SolverPolicy::default(),
            chessboard: ChessboardParams::for_board(target.cols, target.rows),
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

impl CalibrationConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.frame_interval == 0 {
            return Err(ConfigError::Invalid(
                "frame_interval must be at least 1".to_string(),
            ));
        }
        if self.solver.min_detections == 0 {
            return Err(ConfigError::Invalid(
                "min_detections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Chessboard parameters sized to the calibration target.
    pub fn chessboard_params(&self) -> ChessboardParams {
        ChessboardParams {
            cols: self.target.cols,
            rows: self.target.rows,
            ..self.chessboard.clone()
        }
    }
}

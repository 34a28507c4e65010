use crate::SolveError;
use silo_sight_core::CameraId;

/// Hard failures of the calibration solver. No partial calibration is ever
/// returned alongside one of these.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("not enough calibration views for {camera}: found {found}, need at least {required}")]
    InsufficientData {
        camera: CameraId,
        found: usize,
        required: usize,
    },

    #[error("not enough synchronized pairs for stereo calibration: found {found}, need at least {required}")]
    InsufficientSyncPairs { found: usize, required: usize },

    #[error("camera image lists differ in length ({first} vs {second})")]
    CameraCountMismatch { first: usize, second: usize },

    #[error("observation has {got} corners, target has {expected}")]
    ObservationSize { expected: usize, got: usize },

    #[error("invalid calibration target: {0}")]
    InvalidTarget(String),

    #[error("degenerate calibration input ({stage}): {reason}")]
    Degenerate { stage: String, reason: String },

    #[error("{stage} failed to converge: {reason}")]
    NonConvergence { stage: String, reason: String },
}

impl CalibrationError {
    pub(crate) fn non_convergence(stage: impl ToString, err: SolveError) -> Self {
        CalibrationError::NonConvergence {
            stage: stage.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn degenerate(stage: impl ToString, reason: impl ToString) -> Self {
        CalibrationError::Degenerate {
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors when reading or writing a calibration record.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

use silo_sight_calib::CalibrationIoError;
use silo_sight_core::UnknownCamera;

#[derive(thiserror::Error, Debug)]
pub enum TriangulationError {
    #[error("point sets differ in length (first {first}, second {second})")]
    ShapeMismatch { first: usize, second: usize },

    #[error("no points to triangulate")]
    Empty,

    #[error(transparent)]
    InvalidCamera(#[from] UnknownCamera),

    #[error("failed to load calibration: {0}")]
    Calibration(#[from] CalibrationIoError),
}

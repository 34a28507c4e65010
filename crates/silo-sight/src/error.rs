use crate::LandmarkError;
use silo_sight_score::ScoreError;
use silo_sight_stereo::TriangulationError;

/// Failure of one detection event.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Landmarks(#[from] LandmarkError),
}

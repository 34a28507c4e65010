#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("observed and reprojected point sets differ in length ({observed} vs {reprojected})")]
    ShapeMismatch { observed: usize, reprojected: usize },

    #[error("no points to score")]
    Empty,

    #[error("every reprojection error is non-finite")]
    AllDegenerate,
}

/// Errors while writing a detection result.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

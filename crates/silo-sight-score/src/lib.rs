//! Geometric-consistency scoring.
//!
//! Observed landmarks are compared with their reprojections; the combined
//! mean error goes through a fixed piecewise-linear curve to a confidence in
//! `[0, 100]`, and confidence below the cutoff means deepfake.
//!
//! ```
//! use silo_sight_score::{DetectionResult, ErrorReport, ScoringThresholds};
//!
//! let thresholds = ScoringThresholds::default();
//! assert_eq!(thresholds.confidence(10.0), 50.0);
//! assert!(thresholds.classify(50.0));
//!
//! let errors = ErrorReport::from_errors(vec![0.8, 1.1], vec![0.9, 1.4]).unwrap();
//! let result = DetectionResult::evaluate(errors, thresholds, vec![1, 4]);
//! assert!(!result.is_deepfake);
//! ```

mod error;
mod metrics;
mod result;
mod thresholds;

pub use error::{ScoreError, SinkError};
pub use metrics::{aggregate, per_point_error, ErrorReport};
pub use result::{DetectionResult, CSV_FIELDS};
pub use thresholds::ScoringThresholds;

use crate::{CalibrationError, CalibrationTarget};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Sub-pixel corners of one camera image, index-aligned with
/// [`CalibrationTarget::object_points`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerObservation {
    pub points: Vec<Point2<f64>>,
}

impl CornerObservation {
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        Self { points }
    }

    pub fn check_against(&self, target: &CalibrationTarget) -> Result<(), CalibrationError> {
        if self.points.len() != target.len() {
            return Err(CalibrationError::ObservationSize {
                expected: target.len(),
                got: self.points.len(),
            });
        }
        Ok(())
    }
}

/// Finds and refines calibration-target corners in one image.
///
/// Returning `None` marks the image as unusable; it is a normal outcome,
/// not an error.
pub trait CornerDetector: Sync {
    type Image: Sync;

    fn detect(&self, image: &Self::Image, target: &CalibrationTarget) -> Option<CornerObservation>;
}

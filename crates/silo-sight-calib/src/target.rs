use crate::CalibrationError;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Planar chessboard geometry: inner-corner counts and square size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationTarget {
    /// Inner corners along a row.
    pub cols: usize,
    /// Inner corners along a column.
    pub rows: usize,
    /// Square edge length in meters.
    pub square_size: f64,
}

impl Default for CalibrationTarget {
    /// 11x8 squares (10x7 inner corners) of 5/8 inch.
    fn default() -> Self {
        Self {
            cols: 10,
            rows: 7,
            square_size: 0.015875,
        }
    }
}

impl CalibrationTarget {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Result<Self, CalibrationError> {
        let target = Self {
            cols,
            rows,
            square_size,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.cols < 2 || self.rows < 2 {
            return Err(CalibrationError::InvalidTarget(format!(
                "need at least 2x2 inner corners, got {}x{}",
                self.cols, self.rows
            )));
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(CalibrationError::InvalidTarget(format!(
                "square size must be positive, got {}",
                self.square_size
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major points `(col * s, row * s, 0)`.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|r| {
                (0..self.cols).map(move |c| {
                    Point3::new(c as f64 * self.square_size, r as f64 * self.square_size, 0.0)
                })
            })
            .collect()
    }

    /// The same points on the board plane.
    pub fn planar_points(&self) -> Vec<Point2<f64>> {
        self.object_points()
            .into_iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major() {
        let target = CalibrationTarget::new(3, 2, 0.5).expect("target");
        let pts = target.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Point3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 0.5, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn default_is_the_ten_by_seven_board() {
        let target = CalibrationTarget::default();
        assert_eq!(target.len(), 70);
        assert_eq!(target.square_size, 0.015875);
    }

    #[test]
    fn rejects_degenerate_targets() {
        assert!(matches!(
            CalibrationTarget::new(1, 7, 0.01),
            Err(CalibrationError::InvalidTarget(_))
        ));
        assert!(CalibrationTarget::new(10, 7, 0.0).is_err());
    }
}

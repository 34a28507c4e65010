//! Per-point and aggregate reprojection errors.

use crate::ScoreError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Euclidean distance between corresponding rows.
pub fn per_point_error(
    observed: &[Point2<f64>],
    reprojected: &[Point2<f64>],
) -> Result<Vec<f64>, ScoreError> {
    if observed.len() != reprojected.len() {
        return Err(ScoreError::ShapeMismatch {
            observed: observed.len(),
            reprojected: reprojected.len(),
        });
    }
    Ok(observed
        .iter()
        .zip(reprojected)
        .map(|(o, r)| (o - r).norm())
        .collect())
}

/// Errors of both views plus statistics over their concatenation.
///
/// Statistics cover the finite errors only; the others are counted in
/// `degenerate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub first: Vec<f64>,
    pub second: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub first_mean: f64,
    pub second_mean: f64,
    pub degenerate: usize,
}

impl ErrorReport {
    /// Build a report from the per-point errors of both views.
    pub fn from_errors(first: Vec<f64>, second: Vec<f64>) -> Result<Self, ScoreError> {
        if first.is_empty() && second.is_empty() {
            return Err(ScoreError::Empty);
        }
        let finite: Vec<f64> = first
            .iter()
            .chain(&second)
            .copied()
            .filter(|e| e.is_finite())
            .collect();
        if finite.is_empty() {
            return Err(ScoreError::AllDegenerate);
        }
        let degenerate = first.len() + second.len() - finite.len();

        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let var = finite.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            first_mean: finite_mean(&first),
            second_mean: finite_mean(&second),
            first,
            second,
            mean,
            std: var.sqrt(),
            min,
            max,
            degenerate,
        })
    }

    /// Number of landmarks per view.
    pub fn landmark_count(&self) -> usize {
        self.first.len().max(self.second.len())
    }

    /// The error fed to the confidence curve: `mean`, or `+inf` as soon as
    /// any point could not be triangulated or projected.
    pub fn scoring_error(&self) -> f64 {
        if self.degenerate == 0 {
            self.mean
        } else {
            f64::INFINITY
        }
    }

    /// Landmark positions whose error exceeds `mean + 2 std` in either view.
    pub fn outliers(&self) -> Vec<usize> {
        let limit = self.mean + 2.0 * self.std;
        let n = self.landmark_count();
        (0..n)
            .filter(|&i| {
                [self.first.get(i), self.second.get(i)]
                    .into_iter()
                    .flatten()
                    .any(|e| e.is_finite() && *e > limit)
            })
            .collect()
    }
}

/// Per-point errors of both views, concatenated into one report.
pub fn aggregate(
    observed_first: &[Point2<f64>],
    reprojected_first: &[Point2<f64>],
    observed_second: &[Point2<f64>],
    reprojected_second: &[Point2<f64>],
) -> Result<ErrorReport, ScoreError> {
    let first = per_point_error(observed_first, reprojected_first)?;
    let second = per_point_error(observed_second, reprojected_second)?;
    ErrorReport::from_errors(first, second)
}

fn finite_mean(errors: &[f64]) -> f64 {
    let (sum, n) = errors
        .iter()
        .filter(|e| e.is_finite())
        .fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(v: &[(f64, f64)]) -> Vec<Point2<f64>> {
        v.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn per_point_error_is_euclidean() {
        let e = per_point_error(&pts(&[(0.0, 0.0), (1.0, 1.0)]), &pts(&[(3.0, 4.0), (1.0, 1.0)]))
            .expect("errors");
        assert_eq!(e, vec![5.0, 0.0]);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let err = per_point_error(&pts(&[(0.0, 0.0)]), &pts(&[])).unwrap_err();
        assert_eq!(
            err,
            ScoreError::ShapeMismatch {
                observed: 1,
                reprojected: 0
            }
        );
    }

    #[test]
    fn statistics_cover_the_concatenation() {
        // first view: 1, 3; second view: 2, 2, 7
        let report =
            ErrorReport::from_errors(vec![1.0, 3.0], vec![2.0, 2.0, 7.0]).expect("report");
        assert_relative_eq!(report.mean, 3.0);
        assert_relative_eq!(report.std, (22.0f64 / 5.0).sqrt());
        assert_eq!(report.min, 1.0);
        assert_eq!(report.max, 7.0);
        assert_relative_eq!(report.first_mean, 2.0);
        assert_relative_eq!(report.second_mean, 11.0 / 3.0);
        // concatenated mean differs from the mean of the view means
        assert!((report.mean - 0.5 * (report.first_mean + report.second_mean)).abs() > 1e-3);
        assert_eq!(report.degenerate, 0);
        assert_eq!(report.scoring_error(), report.mean);
    }

    #[test]
    fn non_finite_errors_are_counted_and_poison_the_score() {
        let report =
            ErrorReport::from_errors(vec![1.0, f64::NAN], vec![1.0, 3.0]).expect("report");
        assert_eq!(report.degenerate, 1);
        assert_relative_eq!(report.mean, 5.0 / 3.0);
        assert_relative_eq!(report.first_mean, 1.0);
        assert_eq!(report.scoring_error(), f64::INFINITY);

        assert_eq!(
            ErrorReport::from_errors(vec![f64::NAN], vec![f64::INFINITY]),
            Err(ScoreError::AllDegenerate)
        );
        assert_eq!(
            ErrorReport::from_errors(vec![], vec![]),
            Err(ScoreError::Empty)
        );
    }

    #[test]
    fn outliers_flag_positions_in_either_view() {
        let first = vec![1.0; 10];
        let mut second = vec![1.0; 10];
        second[6] = 20.0;
        let report = ErrorReport::from_errors(first, second).expect("report");
        assert_eq!(report.outliers(), vec![6]);
    }

    #[test]
    fn aggregate_checks_both_views() {
        let a = pts(&[(0.0, 0.0), (1.0, 0.0)]);
        let err = aggregate(&a, &a, &a, &a[..1]).unwrap_err();
        assert!(matches!(err, ScoreError::ShapeMismatch { .. }));
        let report = aggregate(&a, &a, &a, &a).expect("report");
        assert_eq!(report.mean, 0.0);
        assert_eq!(report.landmark_count(), 2);
    }
}

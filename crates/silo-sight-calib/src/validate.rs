//! Quality checks on a calibration record.
//!
//! Checks produce structured [`Diagnostic`]s; none of them aborts anything by
//! itself. Callers decide what a failed report means.

use crate::{SingleCalibration, StereoCalibration};
use serde::{Deserialize, Serialize};
use silo_sight_core::{orthogonality_error, projection_matrix, CameraId, Pose};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Rms,
    SingleMeanError,
    Intrinsics,
    Rotation,
    Baseline,
    Distortion,
    Projection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub check: Check,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(check: Check, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            check,
            message: message.into(),
        }
    }

    pub fn critical(check: Check, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            check,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "WARN",
            Severity::Critical => "FAIL",
        };
        write!(f, "[{tag}] {:?}: {}", self.check, self.message)
    }
}

/// Thresholds of the validation checks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub max_rms_px: f64,
    pub rotation_tolerance: f64,
    /// Plausible camera separation in meters, inclusive.
    pub baseline_range_m: [f64; 2],
    pub max_abs_distortion: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_rms_px: 1.0,
            rotation_tolerance: 1e-6,
            baseline_range_m: [0.05, 2.0],
            max_abs_distortion: 2.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    /// True when no critical diagnostic was raised.
    pub fn passed(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.severity < Severity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn critical(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Critical)
    }
}

/// Run every check against `calib`.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn validate_calibration(calib: &StereoCalibration, policy: &ValidationPolicy) -> ValidationReport {
    let mut diagnostics = Vec::new();

    if !(calib.rms.is_finite() && calib.rms < policy.max_rms_px) {
        diagnostics.push(Diagnostic::critical(
            Check::Rms,
            format!(
                "stereo rms {:.4} px is not below {:.2} px",
                calib.rms, policy.max_rms_px
            ),
        ));
    }

    for id in CameraId::BOTH {
        let cam = calib.camera(id).intrinsics;
        let ok = [cam.fx, cam.fy, cam.cx, cam.cy]
            .iter()
            .all(|v| v.is_finite())
            && cam.fx > 0.0
            && cam.fy > 0.0;
        if !ok {
            diagnostics.push(Diagnostic::critical(
                Check::Intrinsics,
                format!("{id} has invalid focal lengths fx={} fy={}", cam.fx, cam.fy),
            ));
        }

        let worst = calib
            .camera(id)
            .distortion
            .coefficients()
            .iter()
            .fold(0.0f64, |m, c| m.max(c.abs()));
        if !(worst < policy.max_abs_distortion) {
            diagnostics.push(Diagnostic::warning(
                Check::Distortion,
                format!(
                    "{id} distortion coefficient magnitude {worst:.3} exceeds {:.2}",
                    policy.max_abs_distortion
                ),
            ));
        }
    }

    let ortho = orthogonality_error(&calib.rotation);
    let det = calib.rotation.determinant();
    if !(ortho < policy.rotation_tolerance && (det - 1.0).abs() < policy.rotation_tolerance) {
        diagnostics.push(Diagnostic::critical(
            Check::Rotation,
            format!("rotation is not proper: |R^T R - I| = {ortho:.3e}, det = {det:.9}"),
        ));
    }

    let baseline = calib.baseline();
    let [lo, hi] = policy.baseline_range_m;
    if !(lo..=hi).contains(&baseline) {
        diagnostics.push(Diagnostic::warning(
            Check::Baseline,
            format!("baseline {baseline:.4} m outside plausible range [{lo}, {hi}] m"),
        ));
    }

    let expected_p1 = projection_matrix(&calib.camera1.intrinsics.matrix(), &Pose::identity());
    let expected_p2 = projection_matrix(
        &calib.camera2.intrinsics.matrix(),
        &Pose::new(calib.rotation, calib.translation),
    );
    for (name, got, expected) in [("P1", &calib.p1, &expected_p1), ("P2", &calib.p2, &expected_p2)] {
        let scale = expected.norm().max(1.0);
        if !((got - expected).norm() <= 1e-9 * scale) {
            diagnostics.push(Diagnostic::critical(
                Check::Projection,
                format!("{name} does not match K [R | T]"),
            ));
        }
    }

    ValidationReport { diagnostics }
}

/// Warn when a camera's mean reprojection error exceeds `max_error_px`.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub(crate) fn single_mean_error_diagnostic(
    camera: CameraId,
    calibration: &SingleCalibration,
    max_error_px: f64,
) -> Option<Diagnostic> {
    let mean = calibration.mean_error;
    (!(mean <= max_error_px)).then(|| {
        Diagnostic::warning(
            Check::SingleMeanError,
            format!("{camera} mean reprojection error {mean:.4} px exceeds {max_error_px:.2} px"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticRig;
    use nalgebra::Matrix3;

    fn good() -> StereoCalibration {
        SyntheticRig::reference().calibration(0.2)
    }

    #[test]
    fn ground_truth_record_passes() {
        let report = validate_calibration(&good(), &ValidationPolicy::default());
        assert!(report.passed(), "{:?}", report.diagnostics);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn high_rms_is_critical() {
        let mut calib = good();
        calib.rms = 2.5;
        let report = validate_calibration(&calib, &ValidationPolicy::default());
        assert!(!report.passed());
        assert_eq!(report.critical().next().map(|d| d.check), Some(Check::Rms));
    }

    #[test]
    fn reflected_rotation_is_critical() {
        let mut calib = good();
        calib.rotation = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, -1.0));
        let report = validate_calibration(&calib, &ValidationPolicy::default());
        assert!(report.critical().any(|d| d.check == Check::Rotation));
        // P2 no longer matches K2 [R | T] either.
        assert!(report.critical().any(|d| d.check == Check::Projection));
    }

    #[test]
    fn short_baseline_only_warns() {
        let mut calib = good();
        calib.translation *= 0.01;
        calib.p2 = projection_matrix(
            &calib.camera2.intrinsics.matrix(),
            &Pose::new(calib.rotation, calib.translation),
        );
        let report = validate_calibration(&calib, &ValidationPolicy::default());
        assert!(report.passed());
        assert_eq!(report.warnings().next().map(|d| d.check), Some(Check::Baseline));
    }

    fn single(rms: f64, mean_error: f64) -> SingleCalibration {
        SingleCalibration {
            camera: SyntheticRig::reference().camera1,
            poses: Vec::new(),
            rms,
            mean_error,
            per_view_errors: Vec::new(),
            evaluations: 0,
            termination: crate::Termination::Converged,
        }
    }

    #[test]
    fn single_camera_warning_follows_the_mean_error() {
        assert!(single_mean_error_diagnostic(CameraId::First, &single(0.5, 0.4), 1.0).is_none());
        let d = single_mean_error_diagnostic(CameraId::Second, &single(1.6, 1.4), 1.0)
            .expect("warning");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.check, Check::SingleMeanError);
        assert!(d.message.contains("camera 2"));
    }

    #[test]
    fn rms_above_the_limit_alone_does_not_warn() {
        // a few large residuals lift the rms over 1 px while the mean stays at 0.8
        assert!(single_mean_error_diagnostic(CameraId::First, &single(1.3, 0.8), 1.0).is_none());
    }
}

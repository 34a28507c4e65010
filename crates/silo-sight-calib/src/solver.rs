//! The two-stage calibration driver: per-camera calibration first, then the
//! stereo solve with intrinsics held fixed.

use crate::single::calibrate_single;
use crate::stereo::{calibrate_stereo, StereoPair};
use crate::validate::{single_mean_error_diagnostic, validate_calibration, ValidationPolicy};
use crate::{
    CalibrationError, CalibrationTarget, CornerDetector, CornerObservation, Diagnostic,
    ImageSize, SingleCalibration, StereoCalibration,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::TermCriteria;
use silo_sight_core::CameraId;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Thresholds and convergence criteria of a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverPolicy {
    /// Minimum successful detections per camera, and minimum synchronized pairs.
    pub min_detections: usize,
    /// A camera whose mean reprojection error exceeds this raises a warning;
    /// the stereo RMS check uses the same limit.
    pub max_single_error_px: f64,
    pub stereo_criteria: TermCriteria,
    pub single_criteria: TermCriteria,
}

impl Default for SolverPolicy {
    fn default() -> Self {
        Self {
            min_detections: 10,
            max_single_error_px: 1.0,
            stereo_criteria: TermCriteria::new(30, 1e-3),
            single_criteria: TermCriteria::new(100, 1e-12),
        }
    }
}

/// Per-camera outcome of the first stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraReport {
    pub camera: CameraId,
    /// Input indices with a successful detection.
    pub detected: Vec<usize>,
    pub total: usize,
    pub calibration: SingleCalibration,
}

#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub calibration: StereoCalibration,
    pub diagnostics: Vec<Diagnostic>,
    /// Input indices used as synchronized pairs.
    pub used_pairs: Vec<usize>,
    pub camera_reports: [CameraReport; 2],
}

/// One-shot calibration builder; the produced [`StereoCalibration`] is the
/// only thing the detection phase needs.
#[derive(Clone, Debug)]
pub struct CalibrationSolver {
    target: CalibrationTarget,
    policy: SolverPolicy,
}

impl CalibrationSolver {
    pub fn new(target: CalibrationTarget, policy: SolverPolicy) -> Result<Self, CalibrationError> {
        target.validate()?;
        Ok(Self { target, policy })
    }

    pub fn target(&self) -> &CalibrationTarget {
        &self.target
    }

    pub fn policy(&self) -> &SolverPolicy {
        &self.policy
    }

    /// Detect the target in every image of both cameras, then calibrate.
    ///
    /// Both lists are index-aligned by capture instant.
    pub fn calibrate_images<D: CornerDetector>(
        &self,
        detector: &D,
        first: &[D::Image],
        second: &[D::Image],
        image_size: ImageSize,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        if first.len() != second.len() {
            return Err(CalibrationError::CameraCountMismatch {
                first: first.len(),
                second: second.len(),
            });
        }
        let detect = |images: &[D::Image]| -> Vec<Option<CornerObservation>> {
            images
                .par_iter()
                .map(|img| detector.detect(img, &self.target))
                .collect()
        };
        let first = detect(first);
        let second = detect(second);
        self.calibrate_observations(first, second, image_size)
    }

    /// Calibrate from per-image detections (`None` = target not found).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(images = first.len()))
    )]
    pub fn calibrate_observations(
        &self,
        first: Vec<Option<CornerObservation>>,
        second: Vec<Option<CornerObservation>>,
        image_size: ImageSize,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        if first.len() != second.len() {
            return Err(CalibrationError::CameraCountMismatch {
                first: first.len(),
                second: second.len(),
            });
        }
        let mut diagnostics = Vec::new();

        let report1 = self.calibrate_camera(CameraId::First, &first, image_size, &mut diagnostics)?;
        let report2 = self.calibrate_camera(CameraId::Second, &second, image_size, &mut diagnostics)?;

        let pairs: Vec<StereoPair> = first
            .into_iter()
            .zip(second)
            .enumerate()
            .filter_map(|(index, (a, b))| {
                Some(StereoPair {
                    index,
                    first: a?,
                    second: b?,
                })
            })
            .collect();
        info!(
            "synchronized pairs: {} of {} captures",
            pairs.len(),
            report1.total
        );
        if pairs.len() < self.policy.min_detections {
            return Err(CalibrationError::InsufficientSyncPairs {
                found: pairs.len(),
                required: self.policy.min_detections,
            });
        }

        let cam1 = report1.calibration.camera;
        let cam2 = report2.calibration.camera;
        let stereo = calibrate_stereo(
            &cam1,
            &cam2,
            &self.target,
            &pairs,
            self.policy.stereo_criteria,
        )?;
        info!(
            "stereo calibration: rms {:.4} px, baseline {:.4} m",
            stereo.rms,
            stereo.translation.norm()
        );

        let calibration = StereoCalibration::new(
            cam1,
            cam2,
            stereo.rotation,
            stereo.translation,
            image_size,
            stereo.rms,
            [report1.calibration.rms, report2.calibration.rms],
            self.target,
        );

        let policy = ValidationPolicy {
            max_rms_px: self.policy.max_single_error_px,
            ..ValidationPolicy::default()
        };
        for diagnostic in validate_calibration(&calibration, &policy).diagnostics {
            warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        }

        Ok(CalibrationOutcome {
            calibration,
            diagnostics,
            used_pairs: pairs.iter().map(|p| p.index).collect(),
            camera_reports: [report1, report2],
        })
    }

    fn calibrate_camera(
        &self,
        camera: CameraId,
        detections: &[Option<CornerObservation>],
        image_size: ImageSize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<CameraReport, CalibrationError> {
        let detected: Vec<usize> = detections
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|_| i))
            .collect();
        info!(
            "{camera}: target found in {}/{} images",
            detected.len(),
            detections.len()
        );
        if detected.len() < self.policy.min_detections {
            return Err(CalibrationError::InsufficientData {
                camera,
                found: detected.len(),
                required: self.policy.min_detections,
            });
        }

        let views: Vec<CornerObservation> = detections.iter().flatten().cloned().collect();
        let calibration = calibrate_single(
            camera,
            &self.target,
            &views,
            image_size,
            self.policy.single_criteria,
        )?;
        info!(
            "{camera}: fx {:.2} fy {:.2} cx {:.2} cy {:.2}, rms {:.4} px, mean error {:.4} px",
            calibration.camera.intrinsics.fx,
            calibration.camera.intrinsics.fy,
            calibration.camera.intrinsics.cx,
            calibration.camera.intrinsics.cy,
            calibration.rms,
            calibration.mean_error
        );
        if let Some(diagnostic) =
            single_mean_error_diagnostic(camera, &calibration, self.policy.max_single_error_px)
        {
            warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        }

        Ok(CameraReport {
            camera,
            detected,
            total: detections.len(),
            calibration,
        })
    }
}

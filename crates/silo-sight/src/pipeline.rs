//! Landmarks in, verdict out.

use crate::{DetectorConfig, LandmarkProvider, PipelineError, ViewFrame};
use log::{debug, info, warn};
use nalgebra::Point2;
use rayon::prelude::*;
use silo_sight_calib::{validate_calibration, ValidationReport};
use silo_sight_core::CameraId;
use silo_sight_score::{aggregate, DetectionResult};
use silo_sight_stereo::Triangulator;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Detection orchestrator around one calibrated rig.
///
/// The triangulator is shared read-only; a `Pipeline` can be used from many
/// threads at once.
#[derive(Clone, Debug)]
pub struct Pipeline {
    triangulator: Arc<Triangulator>,
    config: DetectorConfig,
}

impl Pipeline {
    /// Build the pipeline and log the calibration checks. Failed checks are
    /// reported, not enforced.
    pub fn new(triangulator: Arc<Triangulator>, config: DetectorConfig) -> Self {
        let pipeline = Self {
            triangulator,
            config,
        };
        let report = pipeline.validate();
        for diagnostic in &report.diagnostics {
            warn!("{diagnostic}");
        }
        if report.passed() {
            info!(
                "calibration loaded: baseline {:.4} m, rms {:.4} px",
                pipeline.triangulator.calibration().baseline(),
                pipeline.triangulator.calibration().rms
            );
        }
        pipeline
    }

    pub fn triangulator(&self) -> &Arc<Triangulator> {
        &self.triangulator
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the calibration checks of the configured policy.
    pub fn validate(&self) -> ValidationReport {
        validate_calibration(self.triangulator.calibration(), &self.config.validation)
    }

    /// Score already-selected landmarks of both views.
    ///
    /// Errors are measured between the undistorted observations and the
    /// pinhole reprojections, so lens distortion never counts against the
    /// subject.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(landmarks = front.len()))
    )]
    pub fn detect_landmarks(
        &self,
        front: &[Point2<f64>],
        side: &[Point2<f64>],
    ) -> Result<DetectionResult, PipelineError> {
        let t = &self.triangulator;
        let first = t.undistort_points(CameraId::First, front);
        let second = t.undistort_points(CameraId::Second, side);

        let points = t.triangulate_undistorted(&first, &second)?;
        let (reprojected_first, reprojected_second) = t.reproject(points.points());
        let errors = aggregate(&first, &reprojected_first, &second, &reprojected_second)?;
        debug!(
            "reprojection error: mean {:.3} px, std {:.3} px, {} degenerate",
            errors.mean, errors.std, errors.degenerate
        );

        let result = DetectionResult::evaluate(
            errors,
            self.config.thresholds,
            self.landmark_ids(front.len()),
        );
        info!(
            "{}: confidence {:.1}%, mean error {:.3} px",
            result.verdict(),
            result.confidence,
            result.errors.mean
        );
        Ok(result)
    }

    /// Ask `provider` for landmarks in both views and score them.
    ///
    /// `Ok(None)` when either view has no face.
    pub fn detect_pair<P: LandmarkProvider + ?Sized>(
        &self,
        provider: &P,
        front: &ViewFrame,
        side: &ViewFrame,
    ) -> Result<Option<DetectionResult>, PipelineError> {
        let Some(front_vocabulary) = provider.landmarks(front)? else {
            info!("no face in the {} view", front.view);
            return Ok(None);
        };
        let Some(side_vocabulary) = provider.landmarks(side)? else {
            info!("no face in the {} view", side.view);
            return Ok(None);
        };
        let selection = &self.config.landmarks;
        let front_points = selection.select(&front_vocabulary)?;
        let side_points = selection.select(&side_vocabulary)?;
        self.detect_landmarks(&front_points, &side_points).map(Some)
    }

    /// [`Self::detect_pair`] over many frame pairs in parallel; results keep
    /// the input order.
    pub fn detect_batch<P: LandmarkProvider + ?Sized>(
        &self,
        provider: &P,
        pairs: &[(ViewFrame, ViewFrame)],
    ) -> Vec<Result<Option<DetectionResult>, PipelineError>> {
        pairs
            .par_iter()
            .map(|(front, side)| self.detect_pair(provider, front, side))
            .collect()
    }

    fn landmark_ids(&self, count: usize) -> Vec<usize> {
        let ids = self.config.landmarks.ids();
        if ids.len() == count {
            ids.to_vec()
        } else {
            (0..count).collect()
        }
    }
}

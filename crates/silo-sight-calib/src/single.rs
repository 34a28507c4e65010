//! Planar single-camera calibration.
//!
//! Zhang's closed form gives intrinsics (zero skew) and per-view poses from
//! the target homographies; a joint Levenberg-Marquardt pass then refines
//! `fx, fy, cx, cy, k1, k2, p1, p2, k3` together with every view's pose.

use crate::optim::{solve, ResidualProblem};
use crate::pose::{
    pose_from_homography, push_residuals, reprojection_errors, unpack_pose, write_pose, POSE_PARAMS,
};
use crate::{
    CalibrationError, CalibrationTarget, CornerObservation, ImageSize, TermCriteria, Termination,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Point3};
use serde::{Deserialize, Serialize};
use silo_sight_core::{estimate_homography, BrownConrady5, CameraId, CameraModel, Intrinsics, Pose};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Views required by the closed-form intrinsics solve.
pub const MIN_VIEWS: usize = 3;

const INTRINSIC_PARAMS: usize = 4 + BrownConrady5::DIM;

/// Result of calibrating one camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SingleCalibration {
    pub camera: CameraModel,
    /// Target pose of every input view, in input order.
    pub poses: Vec<Pose>,
    /// `sqrt(sum |e|^2 / points)` in pixels.
    pub rms: f64,
    /// Mean per-point Euclidean reprojection error in pixels.
    pub mean_error: f64,
    /// Mean error of each view.
    pub per_view_errors: Vec<f64>,
    /// Residual evaluations spent by the refinement.
    pub evaluations: usize,
    pub termination: Termination,
}

/// Calibrate one camera from complete target observations.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(target, views), fields(views = views.len()))
)]
pub fn calibrate_single(
    camera: CameraId,
    target: &CalibrationTarget,
    views: &[CornerObservation],
    image_size: ImageSize,
    criteria: TermCriteria,
) -> Result<SingleCalibration, CalibrationError> {
    if views.len() < MIN_VIEWS {
        return Err(CalibrationError::InsufficientData {
            camera,
            found: views.len(),
            required: MIN_VIEWS,
        });
    }
    for view in views {
        view.check_against(target)?;
    }
    let stage = format!("single calibration of {camera}");

    let planar = target.planar_points();
    let homographies = views
        .iter()
        .map(|v| estimate_homography(&planar, &v.points).map(|h| h.h))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| CalibrationError::degenerate(&stage, "target homography failed"))?;

    let k = zhang_intrinsics(&homographies, image_size).ok_or_else(|| {
        CalibrationError::degenerate(&stage, "views do not constrain the intrinsics")
    })?;
    let k_inv = k
        .try_inverse()
        .ok_or_else(|| CalibrationError::degenerate(&stage, "singular intrinsic matrix"))?;
    let poses = homographies
        .iter()
        .map(|h| pose_from_homography(&k_inv, h))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| CalibrationError::degenerate(&stage, "view pose decomposition failed"))?;

    let initial = CameraModel::new(Intrinsics::from_matrix(&k), BrownConrady5::default());
    debug!(
        "{camera}: closed-form fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
        initial.intrinsics.fx, initial.intrinsics.fy, initial.intrinsics.cx, initial.intrinsics.cy
    );

    let object = target.object_points();
    let problem = SingleProblem {
        object: &object,
        views,
    };
    let solution = solve(&problem, problem.pack(&initial, &poses), criteria)
        .map_err(|e| CalibrationError::non_convergence(&stage, e))?;

    let (camera_model, poses) = problem.unpack(&solution.params);
    let stats = ViewStatistics::compute(&camera_model, &poses, &object, views);
    if !stats.rms.is_finite() {
        return Err(CalibrationError::NonConvergence {
            stage,
            reason: "target ends up behind the camera".into(),
        });
    }
    debug!(
        "{camera}: {} evaluations ({:?}), rms {:.4} px",
        solution.evaluations, solution.termination, stats.rms
    );

    Ok(SingleCalibration {
        camera: camera_model,
        poses,
        rms: stats.rms,
        mean_error: stats.mean,
        per_view_errors: stats.per_view,
        evaluations: solution.evaluations,
        termination: solution.termination,
    })
}

pub(crate) struct ViewStatistics {
    pub rms: f64,
    pub mean: f64,
    pub per_view: Vec<f64>,
    pub squared_sum: f64,
    pub points: usize,
}

impl ViewStatistics {
    pub fn compute<'v>(
        camera: &CameraModel,
        poses: &[Pose],
        object: &[Point3<f64>],
        views: impl IntoIterator<Item = &'v CornerObservation>,
    ) -> Self {
        let mut squared_sum = 0.0;
        let mut sum = 0.0;
        let mut points = 0;
        let mut per_view = Vec::with_capacity(poses.len());
        for (pose, view) in poses.iter().zip(views) {
            let errors = reprojection_errors(camera, pose, object, &view.points);
            let view_sum: f64 = errors.iter().sum();
            squared_sum += errors.iter().map(|e| e * e).sum::<f64>();
            sum += view_sum;
            points += errors.len();
            per_view.push(view_sum / errors.len().max(1) as f64);
        }
        let n = points.max(1) as f64;
        Self {
            rms: (squared_sum / n).sqrt(),
            mean: sum / n,
            per_view,
            squared_sum,
            points,
        }
    }
}

/// Zhang's closed-form intrinsics with zero skew.
///
/// Pixels are pre-scaled into roughly `[-1, 1]` so the six-unknown conic
/// system is well conditioned; the result is mapped back to pixels.
pub(crate) fn zhang_intrinsics(
    homographies: &[Matrix3<f64>],
    image_size: ImageSize,
) -> Option<Matrix3<f64>> {
    if homographies.len() < MIN_VIEWS {
        return None;
    }
    let (w, h) = (image_size.width as f64, image_size.height as f64);
    let s = 2.0 / (w + h).max(1.0);
    let cond = Matrix3::new(s, 0.0, -s * w / 2.0, 0.0, s, -s * h / 2.0, 0.0, 0.0, 1.0);
    let cond_inv = Matrix3::new(1.0 / s, 0.0, w / 2.0, 0.0, 1.0 / s, h / 2.0, 0.0, 0.0, 1.0);

    let rows = 2 * homographies.len() + 1;
    let mut v = DMatrix::<f64>::zeros(rows, 6);
    for (i, hom) in homographies.iter().enumerate() {
        let hs = cond * hom;
        let hs = hs / hs.norm();
        let v12 = conic_row(&hs, 0, 1);
        let v11 = conic_row(&hs, 0, 0);
        let v22 = conic_row(&hs, 1, 1);
        for c in 0..6 {
            v[(2 * i, c)] = v12[c];
            v[(2 * i + 1, c)] = v11[c] - v22[c];
        }
    }
    // zero skew: B12 = 0
    v[(rows - 1, 1)] = 1.0;

    let svd = v.svd(false, true);
    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let mut b = [0.0; 6];
    for (c, bc) in b.iter_mut().enumerate() {
        *bc = vt[(last, c)];
    }
    if b[0] < 0.0 {
        b.iter_mut().for_each(|x| *x = -*x);
    }
    let [b11, b12, b22, b13, b23, b33] = b;

    let den = b11 * b22 - b12 * b12;
    if b11 <= 0.0 || den <= 0.0 {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / den;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / den).sqrt();
    let u0 = -b13 * alpha * alpha / lambda;

    let ks = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let k = cond_inv * ks;
    k.iter().all(|x| x.is_finite()).then_some(k)
}

fn conic_row(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    [
        h[(0, i)] * h[(0, j)],
        h[(0, i)] * h[(1, j)] + h[(1, i)] * h[(0, j)],
        h[(1, i)] * h[(1, j)],
        h[(2, i)] * h[(0, j)] + h[(0, i)] * h[(2, j)],
        h[(2, i)] * h[(1, j)] + h[(1, i)] * h[(2, j)],
        h[(2, i)] * h[(2, j)],
    ]
}

/// Parameters: `[fx, fy, cx, cy, k1, k2, p1, p2, k3, (rvec, tvec) per view]`.
struct SingleProblem<'a> {
    object: &'a [Point3<f64>],
    views: &'a [CornerObservation],
}

impl SingleProblem<'_> {
    fn pack(&self, camera: &CameraModel, poses: &[Pose]) -> DVector<f64> {
        let mut params = DVector::zeros(self.num_params());
        let i = camera.intrinsics;
        params[0] = i.fx;
        params[1] = i.fy;
        params[2] = i.cx;
        params[3] = i.cy;
        for (k, c) in camera.distortion.coefficients().iter().enumerate() {
            params[4 + k] = *c;
        }
        for (v, pose) in poses.iter().enumerate() {
            write_pose(&mut params, INTRINSIC_PARAMS + POSE_PARAMS * v, pose);
        }
        params
    }

    fn camera(params: &DVector<f64>) -> CameraModel {
        CameraModel::new(
            Intrinsics::new(params[0], params[1], params[2], params[3]),
            BrownConrady5::from_coefficients([
                params[4], params[5], params[6], params[7], params[8],
            ]),
        )
    }

    fn unpack(&self, params: &DVector<f64>) -> (CameraModel, Vec<Pose>) {
        let poses = (0..self.views.len())
            .map(|v| unpack_pose(params, INTRINSIC_PARAMS + POSE_PARAMS * v))
            .collect();
        (Self::camera(params), poses)
    }
}

impl ResidualProblem for SingleProblem<'_> {
    fn num_params(&self) -> usize {
        INTRINSIC_PARAMS + POSE_PARAMS * self.views.len()
    }

    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let camera = Self::camera(params);
        if camera.intrinsics.fx <= 0.0 || camera.intrinsics.fy <= 0.0 {
            return None;
        }
        let mut out = Vec::with_capacity(2 * self.object.len() * self.views.len());
        for (v, view) in self.views.iter().enumerate() {
            let pose = unpack_pose(params, INTRINSIC_PARAMS + POSE_PARAMS * v);
            push_residuals(&camera, &pose, self.object, &view.points, &mut out)?;
        }
        Some(DVector::from_vec(out))
    }
}

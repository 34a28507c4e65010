//! Stereo extrinsics with both cameras' intrinsics held fixed.

use crate::optim::{solve, ResidualProblem};
use crate::pose::{estimate_target_pose, push_residuals, unpack_pose, write_pose, POSE_PARAMS};
use crate::single::ViewStatistics;
use crate::{CalibrationError, CalibrationTarget, CornerObservation, TermCriteria, Termination};
use log::debug;
use nalgebra::{DVector, Matrix3, Point3, Vector3};
use silo_sight_core::{nearest_rotation, CameraModel, Pose};

#[cfg(feature = "tracing")]
use tracing::instrument;

const RELATIVE_PARAMS: usize = 6;

/// Corner observations of one synchronized capture.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoPair {
    pub index: usize,
    pub first: CornerObservation,
    pub second: CornerObservation,
}

/// Relative pose `X2 = R X1 + T` plus the refined target poses.
#[derive(Clone, Debug)]
pub struct StereoSolution {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Target pose in the first camera for every pair.
    pub poses: Vec<Pose>,
    /// Per-point RMS over both cameras, in pixels.
    pub rms: f64,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Solve `R`, `T` (and each pair's target pose) minimizing the reprojection
/// error in both cameras.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(pairs = pairs.len()))
)]
pub fn calibrate_stereo(
    first: &CameraModel,
    second: &CameraModel,
    target: &CalibrationTarget,
    pairs: &[StereoPair],
    criteria: TermCriteria,
) -> Result<StereoSolution, CalibrationError> {
    const STAGE: &str = "stereo calibration";
    if pairs.is_empty() {
        return Err(CalibrationError::InsufficientSyncPairs {
            found: 0,
            required: 1,
        });
    }
    for pair in pairs {
        pair.first.check_against(target)?;
        pair.second.check_against(target)?;
    }

    let object = target.object_points();
    let mut first_poses = Vec::with_capacity(pairs.len());
    let mut second_poses = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (Some(p1), Some(p2)) = (
            estimate_target_pose(first, &object, &pair.first.points),
            estimate_target_pose(second, &object, &pair.second.points),
        ) else {
            return Err(CalibrationError::degenerate(
                STAGE,
                format!("no target pose for pair {}", pair.index),
            ));
        };
        first_poses.push(p1);
        second_poses.push(p2);
    }

    let (rotation, translation) = initial_relative_pose(&first_poses, &second_poses)
        .ok_or_else(|| CalibrationError::degenerate(STAGE, "relative rotation average failed"))?;
    debug!(
        "initial baseline {:.4}, T [{:.4}, {:.4}, {:.4}]",
        translation.norm(),
        translation.x,
        translation.y,
        translation.z
    );

    let problem = StereoProblem {
        first,
        second,
        object: &object,
        pairs,
    };
    let mut initial = DVector::zeros(problem.num_params());
    write_pose(&mut initial, 0, &Pose::new(rotation, translation));
    for (i, pose) in first_poses.iter().enumerate() {
        write_pose(&mut initial, RELATIVE_PARAMS + POSE_PARAMS * i, pose);
    }

    let solution = solve(&problem, initial, criteria)
        .map_err(|e| CalibrationError::non_convergence(STAGE, e))?;

    let relative = unpack_pose(&solution.params, 0);
    let poses: Vec<Pose> = (0..pairs.len())
        .map(|i| unpack_pose(&solution.params, RELATIVE_PARAMS + POSE_PARAMS * i))
        .collect();
    let rms = stereo_rms(first, second, &relative, &poses, &object, pairs);
    if !rms.is_finite() {
        return Err(CalibrationError::NonConvergence {
            stage: STAGE.into(),
            reason: "target ends up behind a camera".into(),
        });
    }
    debug!(
        "stereo: {} evaluations ({:?}), rms {rms:.4} px",
        solution.evaluations, solution.termination
    );

    Ok(StereoSolution {
        rotation: relative.rotation,
        translation: relative.translation,
        poses,
        rms,
        evaluations: solution.evaluations,
        termination: solution.termination,
    })
}

/// `R = proj_SO3(mean R2_i R1_i^T)`, `T = mean(t2_i - R t1_i)`.
pub(crate) fn initial_relative_pose(
    first: &[Pose],
    second: &[Pose],
) -> Option<(Matrix3<f64>, Vector3<f64>)> {
    if first.is_empty() || first.len() != second.len() {
        return None;
    }
    let n = first.len() as f64;
    let sum = first
        .iter()
        .zip(second)
        .fold(Matrix3::zeros(), |acc, (p1, p2)| {
            acc + p2.rotation * p1.rotation.transpose()
        });
    let rotation = nearest_rotation(&(sum / n))?;
    let translation = first
        .iter()
        .zip(second)
        .fold(Vector3::zeros(), |acc, (p1, p2)| {
            acc + p2.translation - rotation * p1.translation
        })
        / n;
    Some((rotation, translation))
}

fn stereo_rms(
    first: &CameraModel,
    second: &CameraModel,
    relative: &Pose,
    poses: &[Pose],
    object: &[Point3<f64>],
    pairs: &[StereoPair],
) -> f64 {
    let second_poses: Vec<Pose> = poses.iter().map(|p| relative.compose(p)).collect();
    let s1 = ViewStatistics::compute(first, poses, object, pairs.iter().map(|p| &p.first));
    let s2 = ViewStatistics::compute(
        second,
        &second_poses,
        object,
        pairs.iter().map(|p| &p.second),
    );
    ((s1.squared_sum + s2.squared_sum) / (s1.points + s2.points).max(1) as f64).sqrt()
}

/// Parameters: `[r_rel, T, (rvec, tvec) of the target in camera 1 per pair]`.
struct StereoProblem<'a> {
    first: &'a CameraModel,
    second: &'a CameraModel,
    object: &'a [Point3<f64>],
    pairs: &'a [StereoPair],
}

impl ResidualProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        RELATIVE_PARAMS + POSE_PARAMS * self.pairs.len()
    }

    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let relative = unpack_pose(params, 0);
        let mut out = Vec::with_capacity(4 * self.object.len() * self.pairs.len());
        for (i, pair) in self.pairs.iter().enumerate() {
            let pose1 = unpack_pose(params, RELATIVE_PARAMS + POSE_PARAMS * i);
            let pose2 = relative.compose(&pose1);
            push_residuals(self.first, &pose1, self.object, &pair.first.points, &mut out)?;
            push_residuals(self.second, &pose2, self.object, &pair.second.points, &mut out)?;
        }
        Some(DVector::from_vec(out))
    }
}

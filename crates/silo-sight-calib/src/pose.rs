//! Target pose from one planar view, and the reprojection residuals shared by
//! the single-camera and stereo solvers.

use crate::optim::{solve, ResidualProblem};
use crate::TermCriteria;
use nalgebra::{DVector, Matrix3, Point2, Point3, Vector3};
use silo_sight_core::{estimate_homography, nearest_rotation, CameraModel, Pose};

/// Axis-angle and translation of one pose packed into a parameter vector.
pub(crate) const POSE_PARAMS: usize = 6;

/// Decompose a plane-to-image homography `H ~ K [r1 r2 t]` into a pose.
///
/// The sign is chosen so the target lies in front of the camera.
pub(crate) fn pose_from_homography(k_inv: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let m = k_inv * h;
    let m1: Vector3<f64> = m.column(0).into();
    let m2: Vector3<f64> = m.column(1).into();
    let m3: Vector3<f64> = m.column(2).into();

    let norm = 0.5 * (m1.norm() + m2.norm());
    if norm <= f64::EPSILON {
        return None;
    }
    let mut scale = 1.0 / norm;
    if (m3 * scale).z < 0.0 {
        scale = -scale;
    }
    let r1 = m1 * scale;
    let r2 = m2 * scale;
    let r3 = r1.cross(&r2);
    let rotation = nearest_rotation(&Matrix3::from_columns(&[r1, r2, r3]))?;
    Some(Pose::new(rotation, m3 * scale))
}

/// Pose of a planar target seen by a calibrated camera.
///
/// Observed pixels are undistorted to normalized coordinates, a homography
/// gives the starting pose and a short Levenberg-Marquardt run polishes it
/// against the distorted projection.
pub fn estimate_target_pose(
    camera: &CameraModel,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
) -> Option<Pose> {
    if object.len() != observed.len() || object.len() < 4 {
        return None;
    }
    let planar: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let normalized: Vec<Point2<f64>> = observed
        .iter()
        .map(|p| {
            camera
                .distortion
                .undistort(camera.intrinsics.to_normalized(*p))
        })
        .collect();
    let h = estimate_homography(&planar, &normalized)?;
    let initial = pose_from_homography(&Matrix3::identity(), &h.h)?;

    let problem = PoseProblem {
        camera,
        object,
        observed,
    };
    match solve(&problem, pack_pose(&initial), TermCriteria::new(20, 1e-10)) {
        Ok(solution) => Some(unpack_pose(&solution.params, 0)),
        Err(_) => Some(initial),
    }
}

struct PoseProblem<'a> {
    camera: &'a CameraModel,
    object: &'a [Point3<f64>],
    observed: &'a [Point2<f64>],
}

impl ResidualProblem for PoseProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_PARAMS
    }

    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let pose = unpack_pose(params, 0);
        let mut out = Vec::with_capacity(2 * self.object.len());
        push_residuals(self.camera, &pose, self.object, self.observed, &mut out)?;
        Some(DVector::from_vec(out))
    }
}

pub(crate) fn pack_pose(pose: &Pose) -> DVector<f64> {
    let mut v = DVector::zeros(POSE_PARAMS);
    write_pose(&mut v, 0, pose);
    v
}

pub(crate) fn write_pose(params: &mut DVector<f64>, offset: usize, pose: &Pose) {
    let r = pose.axis_angle();
    params
        .rows_mut(offset, 3)
        .copy_from_slice(r.as_slice());
    params
        .rows_mut(offset + 3, 3)
        .copy_from_slice(pose.translation.as_slice());
}

pub(crate) fn unpack_pose(params: &DVector<f64>, offset: usize) -> Pose {
    let r = Vector3::new(params[offset], params[offset + 1], params[offset + 2]);
    let t = Vector3::new(params[offset + 3], params[offset + 4], params[offset + 5]);
    Pose::from_axis_angle(r, t)
}

/// Append `projected - observed` (x then y) for every point; `None` if any
/// point falls behind the camera.
pub(crate) fn push_residuals(
    camera: &CameraModel,
    pose: &Pose,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
    out: &mut Vec<f64>,
) -> Option<()> {
    for (pw, obs) in object.iter().zip(observed) {
        let proj = camera.project(&pose.transform(pw))?;
        out.push(proj.x - obs.x);
        out.push(proj.y - obs.y);
    }
    Some(())
}

/// Euclidean reprojection error of every target point in one view.
pub fn reprojection_errors(
    camera: &CameraModel,
    pose: &Pose,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
) -> Vec<f64> {
    object
        .iter()
        .zip(observed)
        .map(|(pw, obs)| match camera.project(&pose.transform(pw)) {
            Some(p) => (p - obs).norm(),
            None => f64::INFINITY,
        })
        .collect()
}

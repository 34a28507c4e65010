//! Linear (DLT) triangulation and pinhole reprojection.

use crate::points::is_finite;
use crate::{Point3DSet, TriangulationError};
use log::debug;
use nalgebra::{Matrix3x4, Matrix4, Point2, Point3, Vector4};
use rayon::prelude::*;
use silo_sight_calib::StereoCalibration;
use silo_sight_core::CameraId;
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `|w|` of the unit-norm homogeneous solution below which a point is at
/// infinity.
pub const HOMOGENEOUS_EPS: f64 = 1e-9;

/// Depth term below which a projection is undefined.
pub const PROJECTION_EPS: f64 = 1e-12;

/// Read-only triangulation handle around one calibration.
///
/// Cheap to share: wrap in an `Arc` and hand it to every worker.
#[derive(Clone, Debug)]
pub struct Triangulator {
    calib: StereoCalibration,
}

impl Triangulator {
    pub fn new(calib: StereoCalibration) -> Self {
        Self { calib }
    }

    /// Load a calibration record from JSON.
    ///
    /// The record is not validated here; `silo_sight::Pipeline::new` reports
    /// the calibration checks once per loaded record.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TriangulationError> {
        Ok(Self::new(StereoCalibration::load_json(path)?))
    }

    pub fn calibration(&self) -> &StereoCalibration {
        &self.calib
    }

    /// Remove lens distortion, staying in the camera's pixel frame.
    pub fn undistort_points(&self, camera: CameraId, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
        let model = self.calib.camera(camera);
        points.iter().map(|p| model.undistort_pixel(*p)).collect()
    }

    /// Undistort both point sets, then triangulate them.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(n = first.len()))
    )]
    pub fn triangulate(
        &self,
        first: &[Point2<f64>],
        second: &[Point2<f64>],
    ) -> Result<Point3DSet, TriangulationError> {
        check_shapes(first, second)?;
        let a = self.undistort_points(CameraId::First, first);
        let b = self.undistort_points(CameraId::Second, second);
        self.triangulate_undistorted(&a, &b)
    }

    /// Triangulate points that are already free of lens distortion.
    pub fn triangulate_undistorted(
        &self,
        first: &[Point2<f64>],
        second: &[Point2<f64>],
    ) -> Result<Point3DSet, TriangulationError> {
        check_shapes(first, second)?;
        let points: Vec<Point3<f64>> = first
            .iter()
            .zip(second)
            .map(|(a, b)| triangulate_point(&self.calib.p1, &self.calib.p2, a, b))
            .collect();
        let set = Point3DSet::new(points);
        let degenerate = set.degenerate();
        if !degenerate.is_empty() {
            debug!("{} of {} points at infinity", degenerate.len(), set.len());
        }
        Ok(set)
    }

    /// Pinhole projection through the camera's `P`. Non-finite points and
    /// points on the camera plane yield NaN pixels.
    pub fn project(&self, points: &[Point3<f64>], camera: CameraId) -> Vec<Point2<f64>> {
        let p = self.calib.projection(camera);
        points.iter().map(|x| project_point(p, x)).collect()
    }

    /// [`Self::project`] with a textual camera selector (`first`, `cam1`,
    /// `front`, `second`, `cam2`, `side`).
    pub fn project_named(
        &self,
        points: &[Point3<f64>],
        camera: &str,
    ) -> Result<Vec<Point2<f64>>, TriangulationError> {
        let id = camera.parse::<CameraId>()?;
        Ok(self.project(points, id))
    }

    /// Projections into `(first, second)`.
    pub fn reproject(&self, points: &[Point3<f64>]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        (
            self.project(points, CameraId::First),
            self.project(points, CameraId::Second),
        )
    }

    /// Triangulate many independent landmark pairs in parallel; results keep
    /// the input order.
    pub fn triangulate_batch<A, B>(&self, pairs: &[(A, B)]) -> Vec<Result<Point3DSet, TriangulationError>>
    where
        A: AsRef<[Point2<f64>]> + Sync,
        B: AsRef<[Point2<f64>]> + Sync,
    {
        pairs
            .par_iter()
            .map(|(a, b)| self.triangulate(a.as_ref(), b.as_ref()))
            .collect()
    }
}

fn check_shapes(first: &[Point2<f64>], second: &[Point2<f64>]) -> Result<(), TriangulationError> {
    if first.len() != second.len() {
        return Err(TriangulationError::ShapeMismatch {
            first: first.len(),
            second: second.len(),
        });
    }
    if first.is_empty() {
        return Err(TriangulationError::Empty);
    }
    Ok(())
}

/// Homogeneous least squares: the right singular vector of
/// `[x p3 - p1; y p3 - p2]` stacked for both views.
pub fn triangulate_point(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
) -> Point3<f64> {
    let nan = Point3::new(f64::NAN, f64::NAN, f64::NAN);
    if !(a.coords.iter().chain(b.coords.iter()).all(|v| v.is_finite())) {
        return nan;
    }

    let mut m = Matrix4::<f64>::zeros();
    for (row, (p, x)) in [(p1, a), (p2, b)].into_iter().enumerate() {
        m.set_row(2 * row, &(p.row(2) * x.x - p.row(0)));
        m.set_row(2 * row + 1, &(p.row(2) * x.y - p.row(1)));
    }

    let svd = m.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return nan;
    };
    let k = svd.singular_values.imin();
    let x: Vector4<f64> = v_t.row(k).transpose();
    let x = x / x.norm();
    if x[3].abs() < HOMOGENEOUS_EPS {
        return nan;
    }
    Point3::new(x[0] / x[3], x[1] / x[3], x[2] / x[3])
}

/// `P [X; 1]` followed by the perspective division.
pub fn project_point(p: &Matrix3x4<f64>, x: &Point3<f64>) -> Point2<f64> {
    if !is_finite(x) {
        return Point2::new(f64::NAN, f64::NAN);
    }
    let h = p * x.to_homogeneous();
    if h.z.abs() < PROJECTION_EPS {
        return Point2::new(f64::NAN, f64::NAN);
    }
    Point2::new(h.x / h.z, h.y / h.z)
}

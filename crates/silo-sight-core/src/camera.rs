use crate::{rodrigues, rotation_to_axis_angle, BrownConrady5};
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics: focal lengths, principal point and skew, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Normalized coordinates to pixels.
    #[inline]
    pub fn to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Pixels to normalized coordinates.
    #[inline]
    pub fn to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let y = (p.y - self.cy) / self.fy;
        let x = (p.x - self.cx - self.skew * y) / self.fx;
        Point2::new(x, y)
    }
}

/// Intrinsics plus lens distortion of one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: BrownConrady5,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: BrownConrady5) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point given in this camera's frame. `None` when it is not in
    /// front of the camera.
    #[inline]
    pub fn project(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-12 {
            return None;
        }
        let n = Point2::new(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(self.distortion.distort(n)))
    }

    /// Remove lens distortion while staying in pixel units of the same `K`.
    #[inline]
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.to_normalized(p);
        self.intrinsics.to_pixel(self.distortion.undistort(n))
    }
}

/// Rigid transform mapping world (target) coordinates into a camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    pub fn from_axis_angle(r: Vector3<f64>, t: Vector3<f64>) -> Self {
        Self::new(rodrigues(&r), t)
    }

    pub fn axis_angle(&self) -> Vector3<f64> {
        rotation_to_axis_angle(&self.rotation)
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// `self` after `first`: maps through `first` then `self`.
    pub fn compose(&self, first: &Pose) -> Pose {
        Pose::new(
            self.rotation * first.rotation,
            self.rotation * first.translation + self.translation,
        )
    }

    /// The 3x4 matrix `[R | t]`.
    pub fn matrix(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// `K [R | t]`.
pub fn projection_matrix(k: &Matrix3<f64>, pose: &Pose) -> Matrix3x4<f64> {
    k * pose.matrix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraModel {
        CameraModel::new(
            Intrinsics::new(900.0, 880.0, 640.0, 360.0),
            BrownConrady5 {
                k1: -0.1,
                k2: 0.02,
                p1: 0.0005,
                p2: -0.0003,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn intrinsics_matrix_round_trip() {
        let k = Intrinsics::new(900.0, 880.0, 640.0, 360.0);
        assert_eq!(Intrinsics::from_matrix(&k.matrix()), k);
        let p = Point2::new(700.0, 300.0);
        assert_relative_eq!(k.to_pixel(k.to_normalized(p)), p, epsilon = 1e-9);
    }

    #[test]
    fn undistort_pixel_recovers_pinhole_projection() {
        let cam = camera();
        let pc = Point3::new(0.12, -0.08, 0.9);
        let distorted = cam.project(&pc).expect("in front");
        let ideal = cam
            .intrinsics
            .to_pixel(Point2::new(pc.x / pc.z, pc.y / pc.z));
        assert_relative_eq!(cam.undistort_pixel(distorted), ideal, epsilon = 1e-6);
    }

    #[test]
    fn points_behind_the_camera_do_not_project() {
        assert!(camera().project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn projection_matrix_agrees_with_pose_transform() {
        let pose = Pose::from_axis_angle(Vector3::new(0.0, 0.3, 0.0), Vector3::new(-0.2, 0.0, 0.01));
        let k = Intrinsics::new(900.0, 880.0, 640.0, 360.0);
        let p = projection_matrix(&k.matrix(), &pose);
        let x = Point3::new(0.05, 0.02, 1.0);
        let h = p * x.to_homogeneous();
        let pc = pose.transform(&x);
        let expected = k.to_pixel(Point2::new(pc.x / pc.z, pc.y / pc.z));
        assert_relative_eq!(Point2::new(h.x / h.z, h.y / h.z), expected, epsilon = 1e-9);
    }
}

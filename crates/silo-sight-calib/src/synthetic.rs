//! Synthetic stereo rigs with known ground truth.
//!
//! Used by tests across the workspace and available to downstream crates
//! through the `synthetic` feature.

use crate::{CalibrationTarget, CornerObservation, ImageSize, StereoCalibration};
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use silo_sight_core::{rodrigues, BrownConrady5, CameraModel, Intrinsics, Pose};

/// Small deterministic generator (Knuth MMIX constants).
#[derive(Clone, Debug)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9e37_79b9_7f4a_7c15)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Approximately normal (Irwin-Hall with 12 terms).
    pub fn gaussian(&mut self, sigma: f64) -> f64 {
        let s: f64 = (0..12).map(|_| self.next_f64()).sum();
        (s - 6.0) * sigma
    }
}

/// Two cameras with known intrinsics, distortion and relative pose.
#[derive(Clone, Debug)]
pub struct SyntheticRig {
    pub camera1: CameraModel,
    pub camera2: CameraModel,
    /// `X2 = R X1 + T`.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub image_size: ImageSize,
    pub target: CalibrationTarget,
}

impl SyntheticRig {
    /// Front camera at the origin; side camera half a meter to the right,
    /// slightly behind, turned 30 degrees toward the subject.
    pub fn reference() -> Self {
        let camera1 = CameraModel::new(
            Intrinsics::new(1000.0, 1000.0, 640.0, 360.0),
            BrownConrady5 {
                k1: -0.05,
                k2: 0.01,
                p1: 0.0005,
                p2: -0.0003,
                k3: 0.0,
            },
        );
        let camera2 = CameraModel::new(
            Intrinsics::new(1200.0, 1190.0, 630.0, 355.0),
            BrownConrady5 {
                k1: -0.08,
                k2: 0.02,
                p1: -0.0004,
                p2: 0.0002,
                k3: 0.0,
            },
        );
        Self::with_side_camera(camera1, camera2, Vector3::new(0.5, 0.0, 0.134), 30.0)
    }

    /// A randomized but valid rig for property tests.
    pub fn random(seed: u64) -> Self {
        let mut rng = Lcg::new(seed);
        let f1 = rng.uniform(850.0, 1250.0);
        let f2 = rng.uniform(850.0, 1400.0);
        let camera1 = CameraModel::new(
            Intrinsics::new(
                f1,
                f1 * rng.uniform(0.99, 1.01),
                rng.uniform(620.0, 660.0),
                rng.uniform(340.0, 380.0),
            ),
            BrownConrady5 {
                k1: rng.uniform(-0.1, 0.05),
                ..BrownConrady5::default()
            },
        );
        let camera2 = CameraModel::new(
            Intrinsics::new(
                f2,
                f2 * rng.uniform(0.99, 1.01),
                rng.uniform(620.0, 660.0),
                rng.uniform(340.0, 380.0),
            ),
            BrownConrady5 {
                k1: rng.uniform(-0.1, 0.05),
                ..BrownConrady5::default()
            },
        );
        let center = Vector3::new(
            rng.uniform(0.3, 0.6),
            rng.uniform(-0.03, 0.03),
            rng.uniform(0.05, 0.15),
        );
        // aim roughly at the middle of the board volume
        let aim = (center.x - 0.1).atan2(0.62 - center.z).to_degrees();
        let yaw = aim + rng.uniform(-5.0, 5.0);
        Self::with_side_camera(camera1, camera2, center, yaw)
    }

    fn with_side_camera(
        camera1: CameraModel,
        camera2: CameraModel,
        center: Vector3<f64>,
        yaw_deg: f64,
    ) -> Self {
        let rotation = rodrigues(&Vector3::new(0.0, yaw_deg.to_radians(), 0.0));
        let translation = -(rotation * center);
        Self {
            camera1,
            camera2,
            rotation,
            translation,
            image_size: ImageSize::new(1280, 720),
            target: CalibrationTarget::default(),
        }
    }

    /// Same geometry with ideal pinhole lenses.
    pub fn without_distortion(mut self) -> Self {
        self.camera1.distortion = BrownConrady5::default();
        self.camera2.distortion = BrownConrady5::default();
        self
    }

    pub fn relative_pose(&self) -> Pose {
        Pose::new(self.rotation, self.translation)
    }

    /// Ground-truth calibration record carrying `rms` as its error figures.
    pub fn calibration(&self, rms: f64) -> StereoCalibration {
        StereoCalibration::new(
            self.camera1,
            self.camera2,
            self.rotation,
            self.translation,
            self.image_size,
            rms,
            [rms, rms],
            self.target,
        )
    }

    /// Project a point given in the first camera's frame into both views.
    pub fn project_pair(&self, point: &Point3<f64>) -> Option<(Point2<f64>, Point2<f64>)> {
        let a = self.camera1.project(point)?;
        let b = self.camera2.project(&self.relative_pose().transform(point))?;
        Some((a, b))
    }

    /// Target poses in the first camera: about 0.6 m away, tilted up to
    /// 20 degrees about both in-plane axes.
    pub fn board_poses(&self, count: usize, seed: u64) -> Vec<Pose> {
        let mut rng = Lcg::new(seed);
        let s = self.target.square_size;
        let half = Vector3::new(
            0.5 * (self.target.cols - 1) as f64 * s,
            0.5 * (self.target.rows - 1) as f64 * s,
            0.0,
        );
        (0..count)
            .map(|i| {
                // alternate tilt signs so every view set spans both axes
                let sx = if i % 2 == 0 { 1.0 } else { -1.0 };
                let sy = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
                let axis_angle = Vector3::new(
                    sx * rng.uniform(8.0, 20.0).to_radians(),
                    sy * rng.uniform(8.0, 20.0).to_radians(),
                    rng.uniform(-10.0, 10.0).to_radians(),
                );
                let rotation = rodrigues(&axis_angle);
                let center = Vector3::new(
                    0.1 + rng.uniform(-0.03, 0.03),
                    rng.uniform(-0.03, 0.03),
                    rng.uniform(0.55, 0.7),
                );
                Pose::new(rotation, center - rotation * half)
            })
            .collect()
    }

    /// Index-aligned corner observations of `count` captures in both
    /// cameras, with Gaussian pixel noise. A view whose corners leave the
    /// image is reported as a missed detection.
    pub fn observations(
        &self,
        count: usize,
        noise_px: f64,
        seed: u64,
    ) -> (Vec<Option<CornerObservation>>, Vec<Option<CornerObservation>>) {
        let object = self.target.object_points();
        let relative = self.relative_pose();
        let mut rng = Lcg::new(seed.wrapping_add(1));
        let mut first = Vec::with_capacity(count);
        let mut second = Vec::with_capacity(count);
        for pose in self.board_poses(count, seed) {
            let pose2 = relative.compose(&pose);
            first.push(self.observe(&self.camera1, &pose, &object, noise_px, &mut rng));
            second.push(self.observe(&self.camera2, &pose2, &object, noise_px, &mut rng));
        }
        (first, second)
    }

    fn observe(
        &self,
        camera: &CameraModel,
        pose: &Pose,
        object: &[Point3<f64>],
        noise_px: f64,
        rng: &mut Lcg,
    ) -> Option<CornerObservation> {
        let (w, h) = (self.image_size.width as f64, self.image_size.height as f64);
        let points = object
            .iter()
            .map(|p| {
                let px = camera.project(&pose.transform(p))?;
                let px = Point2::new(px.x + rng.gaussian(noise_px), px.y + rng.gaussian(noise_px));
                (px.x >= 0.0 && px.y >= 0.0 && px.x < w && px.y < h).then_some(px)
            })
            .collect::<Option<Vec<_>>>()?;
        Some(CornerObservation::new(points))
    }
}

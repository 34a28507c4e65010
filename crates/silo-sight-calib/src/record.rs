//! The persisted stereo calibration and its summary.

use crate::{CalibrationIoError, CalibrationTarget};
use nalgebra::{Matrix3, Matrix3x4, Vector3};
use serde::{Deserialize, Serialize};
use silo_sight_core::{
    projection_matrix, rotation_angle_deg, rotation_to_axis_angle, skew, CameraId, CameraModel,
    Pose,
};
use std::{fmt, fs, path::Path};

/// Image resolution in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Everything the detection phase needs from calibration.
///
/// `rotation`/`translation` map points from the first camera's frame into
/// the second's: `X2 = R X1 + T`. Created once and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoCalibration {
    pub camera1: CameraModel,
    pub camera2: CameraModel,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    /// `K1 [I | 0]`.
    pub p1: Matrix3x4<f64>,
    /// `K2 [R | T]`.
    pub p2: Matrix3x4<f64>,
    pub image_size: ImageSize,
    /// Stereo RMS reprojection error in pixels.
    pub rms: f64,
    pub camera1_rms: f64,
    pub camera2_rms: f64,
    pub target: CalibrationTarget,
}

impl StereoCalibration {
    /// Build a record, deriving E, F, P1 and P2 from the cameras and `R`, `T`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera1: CameraModel,
        camera2: CameraModel,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        image_size: ImageSize,
        rms: f64,
        single_rms: [f64; 2],
        target: CalibrationTarget,
    ) -> Self {
        let k1 = camera1.intrinsics.matrix();
        let k2 = camera2.intrinsics.matrix();
        let essential = skew(&translation) * rotation;
        let fundamental = fundamental_from_essential(&essential, &k1, &k2);
        Self {
            camera1,
            camera2,
            rotation,
            translation,
            essential,
            fundamental,
            p1: projection_matrix(&k1, &Pose::identity()),
            p2: projection_matrix(&k2, &Pose::new(rotation, translation)),
            image_size,
            rms,
            camera1_rms: single_rms[0],
            camera2_rms: single_rms[1],
            target,
        }
    }

    pub fn camera(&self, id: CameraId) -> &CameraModel {
        match id {
            CameraId::First => &self.camera1,
            CameraId::Second => &self.camera2,
        }
    }

    pub fn projection(&self, id: CameraId) -> &Matrix3x4<f64> {
        match id {
            CameraId::First => &self.p1,
            CameraId::Second => &self.p2,
        }
    }

    /// Distance between the camera centers, in target units (meters).
    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    pub fn summary(&self) -> CalibrationSummary {
        let axis_angle = rotation_to_axis_angle(&self.rotation);
        let axis = if axis_angle.norm() > 1e-12 {
            axis_angle.normalize()
        } else {
            Vector3::z()
        };
        CalibrationSummary {
            baseline: self.baseline(),
            rotation_deg: rotation_angle_deg(&self.rotation),
            rotation_axis: axis,
            rms: self.rms,
            camera1_rms: self.camera1_rms,
            camera2_rms: self.camera2_rms,
            image_size: self.image_size,
        }
    }

    /// Read a calibration written by [`save_json`](Self::save_json).
    ///
    /// Only the JSON shape is checked. A record with a reflected rotation or
    /// inconsistent projection matrices loads fine; run
    /// [`validate_calibration`](crate::validate_calibration) on the result.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this calibration to disk as pretty JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// `K2^-T E K1^-1`, scaled so `F[2,2] == 1` unless that entry is ~0.
pub fn fundamental_from_essential(
    essential: &Matrix3<f64>,
    k1: &Matrix3<f64>,
    k2: &Matrix3<f64>,
) -> Matrix3<f64> {
    let (Some(k1_inv), Some(k2_inv)) = (k1.try_inverse(), k2.try_inverse()) else {
        return Matrix3::zeros();
    };
    let f = k2_inv.transpose() * essential * k1_inv;
    let f22 = f[(2, 2)];
    if f22.abs() > 1e-12 {
        f / f22
    } else {
        f
    }
}

/// Human-facing figures of a stereo calibration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub baseline: f64,
    pub rotation_deg: f64,
    pub rotation_axis: Vector3<f64>,
    pub rms: f64,
    pub camera1_rms: f64,
    pub camera2_rms: f64,
    pub image_size: ImageSize,
}

impl fmt::Display for CalibrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stereo calibration")?;
        writeln!(
            f,
            "  image size:      {}x{}",
            self.image_size.width, self.image_size.height
        )?;
        writeln!(
            f,
            "  baseline:        {:.4} m ({:.1} cm)",
            self.baseline,
            self.baseline * 100.0
        )?;
        writeln!(f, "  rotation angle:  {:.2} deg", self.rotation_deg)?;
        writeln!(
            f,
            "  rotation axis:   [{:.4}, {:.4}, {:.4}]",
            self.rotation_axis.x, self.rotation_axis.y, self.rotation_axis.z
        )?;
        writeln!(f, "  camera 1 rms:    {:.4} px", self.camera1_rms)?;
        writeln!(f, "  camera 2 rms:    {:.4} px", self.camera2_rms)?;
        write!(f, "  stereo rms:      {:.4} px", self.rms)
    }
}

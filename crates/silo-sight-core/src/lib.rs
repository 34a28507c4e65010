//! Shared geometry for the `silo-sight-*` workspace.
//!
//! This crate is purely numeric: pinhole cameras with Brown-Conrady
//! distortion, rigid poses, rotation helpers, homography DLT and grayscale
//! image sampling. It does not depend on any image decoder or corner detector.

mod camera;
mod camera_id;
mod distortion;
mod homography;
mod image;
mod logger;
mod rotation;

pub use camera::{projection_matrix, CameraModel, Intrinsics, Pose};
pub use camera_id::{CameraId, UnknownCamera};
pub use distortion::{BrownConrady5, UNDISTORT_ITERS};
pub use homography::{estimate_homography, Homography};
pub use image::{gradient, sample_bilinear, GrayImage, GrayImageView};
pub use rotation::{
    nearest_rotation, orthogonality_error, rodrigues, rotation_angle_deg, rotation_to_axis_angle,
    skew,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

//! Two-view triangulation against a [`StereoCalibration`].
//!
//! Observations are undistorted in each camera's pixel frame and triangulated
//! with the linear (DLT) method using `P1 = K1 [I | 0]` and `P2 = K2 [R | T]`.
//! Points whose homogeneous coordinate vanishes (rays that do not meet in
//! front of the rig) become NaN instead of a finite but meaningless value;
//! [`Point3DSet::degenerate`] lists them.
//!
//! [`StereoCalibration`]: silo_sight_calib::StereoCalibration

mod error;
mod points;
mod triangulator;

pub use error::TriangulationError;
pub use points::Point3DSet;
pub use silo_sight_core::CameraId;
pub use triangulator::{
    project_point, triangulate_point, Triangulator, HOMOGENEOUS_EPS, PROJECTION_EPS,
};

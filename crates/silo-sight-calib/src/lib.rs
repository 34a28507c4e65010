//! Two-stage stereo calibration from planar chessboard views.
//!
//! 1. Each camera is calibrated on its own detections (Zhang closed form,
//!    then Levenberg-Marquardt over intrinsics, distortion and poses).
//! 2. Captures where both cameras saw the target form synchronized pairs; the
//!    relative pose `X2 = R X1 + T` is solved on them with both cameras'
//!    intrinsics fixed.
//! 3. The result is a [`StereoCalibration`] record holding `K`, distortion,
//!    `R`, `T`, `E`, `F` and the projection matrices `P1 = K1 [I | 0]`,
//!    `P2 = K2 [R | T]`.
//!
//! ## Quickstart
//!
//! ```
//! use silo_sight_calib::{synthetic::SyntheticRig, CalibrationSolver, SolverPolicy};
//!
//! let rig = SyntheticRig::reference();
//! let (first, second) = rig.observations(12, 0.05, 1);
//!
//! let solver = CalibrationSolver::new(rig.target, SolverPolicy::default()).unwrap();
//! let outcome = solver
//!     .calibrate_observations(first, second, rig.image_size)
//!     .unwrap();
//! println!("{}", outcome.calibration.summary());
//! ```
//!
//! Quality problems (high RMS, implausible baseline) are reported as
//! [`Diagnostic`]s rather than errors; see [`validate_calibration`].

mod error;
mod observation;
mod optim;
mod pose;
mod record;
mod single;
mod solver;
mod stereo;
mod target;
mod validate;

#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;

pub use error::{CalibrationError, CalibrationIoError};
pub use observation::{CornerDetector, CornerObservation};
pub use optim::{SolveError, TermCriteria, Termination};
pub use pose::{estimate_target_pose, reprojection_errors};
pub use record::{fundamental_from_essential, CalibrationSummary, ImageSize, StereoCalibration};
pub use single::{calibrate_single, SingleCalibration, MIN_VIEWS};
pub use solver::{CalibrationOutcome, CalibrationSolver, CameraReport, SolverPolicy};
pub use stereo::{calibrate_stereo, StereoPair, StereoSolution};
pub use target::CalibrationTarget;
pub use validate::{
    validate_calibration, Check, Diagnostic, Severity, ValidationPolicy, ValidationReport,
};

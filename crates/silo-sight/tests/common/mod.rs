#![allow(dead_code)]

use nalgebra::{Point2, Point3};
use silo_sight::calib::synthetic::{Lcg, SyntheticRig};
use silo_sight::{SidecarLandmarks, SidecarRecord};

/// Size of the face-mesh landmark vocabulary.
pub const VOCABULARY: usize = 468;

/// A rigid, roughly face-shaped point cloud 0.6 m in front of camera 1.
pub fn face(seed: u64) -> Vec<Point3<f64>> {
    let mut rng = Lcg::new(seed);
    (0..VOCABULARY)
        .map(|_| {
            let x = rng.uniform(-0.07, 0.07);
            let y = rng.uniform(-0.09, 0.09);
            // bulge toward the cameras
            let z = 0.62 - 0.04 * (1.0 - (x / 0.07).powi(2)) * (1.0 - (y / 0.09).powi(2));
            Point3::new(x, y, z)
        })
        .collect()
}

/// Distorted pixel observations of `points` in both cameras.
pub fn observe(rig: &SyntheticRig, points: &[Point3<f64>]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    points
        .iter()
        .map(|p| rig.project_pair(p).expect("point in front of both cameras"))
        .unzip()
}

/// Shift the front view down and the side view up by `shift` pixels.
pub fn tamper(
    front: &[Point2<f64>],
    side: &[Point2<f64>],
    shift: f64,
) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    (
        front.iter().map(|p| Point2::new(p.x, p.y + shift)).collect(),
        side.iter().map(|p| Point2::new(p.x, p.y - shift)).collect(),
    )
}

pub fn record(points: &[Point2<f64>]) -> SidecarRecord {
    SidecarRecord {
        points: points.iter().map(|p| [p.x, p.y]).collect(),
        normalized: false,
    }
}

pub fn sidecar(front: &[Point2<f64>], side: &[Point2<f64>]) -> SidecarLandmarks {
    SidecarLandmarks {
        front: Some(record(front)),
        side: Some(record(side)),
    }
}

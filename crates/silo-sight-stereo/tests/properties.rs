use approx::assert_abs_diff_eq;
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use silo_sight_calib::synthetic::{Lcg, SyntheticRig};
use silo_sight_calib::{validate_calibration, Check, StereoCalibration, ValidationPolicy};
use silo_sight_core::orthogonality_error;
use silo_sight_stereo::{CameraId, Triangulator};

fn in_image(calib: &StereoCalibration, p: &Point2<f64>) -> bool {
    let (w, h) = (
        calib.image_size.width as f64,
        calib.image_size.height as f64,
    );
    p.x >= 0.0 && p.x < w && p.y >= 0.0 && p.y < h
}

/// Random face-sized points seen by both cameras of `rig`.
fn visible_points(
    rig: &SyntheticRig,
    calib: &StereoCalibration,
    seed: u64,
    count: usize,
) -> Vec<(Point3<f64>, Point2<f64>, Point2<f64>)> {
    let mut rng = Lcg::new(seed);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count * 20 {
        if out.len() == count {
            break;
        }
        let x = Point3::new(
            rng.uniform(-0.05, 0.2),
            rng.uniform(-0.12, 0.12),
            rng.uniform(0.55, 0.9),
        );
        if let Some((a, b)) = rig.project_pair(&x) {
            if in_image(calib, &a) && in_image(calib, &b) {
                out.push((x, a, b));
            }
        }
    }
    out
}

#[test]
fn random_rigs_have_proper_rotations() {
    for seed in 0..16 {
        let calib = SyntheticRig::random(seed).calibration(0.2);
        assert!(
            orthogonality_error(&calib.rotation) < 1e-6,
            "seed {seed}: {}",
            orthogonality_error(&calib.rotation)
        );
        assert_abs_diff_eq!(calib.rotation.determinant(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn reprojection_round_trip_holds_on_random_rigs() {
    for seed in 0..8 {
        let rig = SyntheticRig::random(seed);
        let tri = Triangulator::new(rig.calibration(0.2));
        let samples = visible_points(&rig, tri.calibration(), 100 + seed, 12);
        assert!(samples.len() >= 6, "seed {seed}: {} visible", samples.len());

        let a: Vec<_> = samples.iter().map(|s| s.1).collect();
        let b: Vec<_> = samples.iter().map(|s| s.2).collect();
        let points = tri.triangulate(&a, &b).expect("triangulate");
        assert!(points.degenerate().is_empty(), "seed {seed}");
        for (got, (want, _, _)) in points.iter().zip(&samples) {
            assert_abs_diff_eq!(got.coords, want.coords, epsilon = 1e-4);
        }

        // reprojections are pinhole, so compare against undistorted pixels
        let (ra, rb) = tri.reproject(points.points());
        let ua = tri.undistort_points(CameraId::First, &a);
        let ub = tri.undistort_points(CameraId::Second, &b);
        for (r, o) in ra.iter().zip(&ua).chain(rb.iter().zip(&ub)) {
            assert!((r - o).norm() < 1e-3, "seed {seed}: {}", (r - o).norm());
        }
    }
}

#[test]
fn point_one_meter_ahead_is_recovered_within_a_millimeter() {
    let rig = SyntheticRig::reference();
    let tri = Triangulator::new(rig.calibration(0.2));
    let truth = Point3::new(0.0, 0.0, 1.0);
    let (a, b) = rig.project_pair(&truth).expect("visible");

    let points = tri.triangulate(&[a], &[b]).expect("triangulate");
    assert!((points[0] - truth).norm() < 1e-3);
    let (ra, rb) = tri.reproject(points.points());
    assert!((ra[0] - Point2::new(640.0, 360.0)).norm() < 1e-6);
    let ub = tri.undistort_points(CameraId::Second, &[b]);
    assert!((rb[0] - ub[0]).norm() < 1e-6);
}

#[test]
fn calibration_reloaded_from_disk_triangulates_identically() {
    let rig = SyntheticRig::reference();
    let calib = rig.calibration(0.2);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stereo_calibration.json");
    calib.save_json(&path).expect("save");

    let direct = Triangulator::new(calib);
    let loaded = Triangulator::from_file(&path).expect("load");
    let samples = visible_points(&rig, direct.calibration(), 7, 6);
    let a: Vec<_> = samples.iter().map(|s| s.1).collect();
    let b: Vec<_> = samples.iter().map(|s| s.2).collect();
    assert_eq!(
        direct.triangulate(&a, &b).expect("direct"),
        loaded.triangulate(&a, &b).expect("loaded")
    );
}

#[test]
fn loading_does_not_check_the_rotation() {
    let mut calib = SyntheticRig::reference().calibration(0.2);
    calib.rotation = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reflected.json");
    calib.save_json(&path).expect("save");

    let loaded = Triangulator::from_file(&path).expect("load");
    assert_abs_diff_eq!(loaded.calibration().rotation.determinant(), -1.0, epsilon = 1e-12);
    let report = validate_calibration(loaded.calibration(), &ValidationPolicy::default());
    assert!(!report.passed());
    assert!(report.critical().any(|d| d.check == Check::Rotation));
}

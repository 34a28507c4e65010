#![cfg(feature = "cli")]

mod common;

use assert_cmd::Command;
use common::{face, observe, sidecar, tamper};
use predicates::prelude::*;
use silo_sight::calib::synthetic::SyntheticRig;
use silo_sight::SidecarLandmarks;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn bin() -> Command {
    Command::cargo_bin("silo-sight").expect("binary")
}

fn write_calibration(dir: &Path, rms: f64) -> PathBuf {
    let path = dir.join("stereo_calibration.json");
    SyntheticRig::reference()
        .calibration(rms)
        .save_json(&path)
        .expect("save");
    path
}

fn write_sidecar(dir: &Path, sidecar: &SidecarLandmarks) -> PathBuf {
    let path = dir.join("landmarks.json");
    std::fs::write(&path, serde_json::to_string(sidecar).expect("json")).expect("write");
    path
}

struct Setup {
    dir: TempDir,
    calibration: PathBuf,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().expect("tempdir");
    let calibration = write_calibration(dir.path(), 0.2);
    Setup { dir, calibration }
}

#[test]
fn validate_accepts_a_good_calibration() {
    let s = setup();
    bin()
        .args(["validate", "--calibration"])
        .arg(&s.calibration)
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration passed"))
        .stdout(predicate::str::contains("baseline"));
}

#[test]
fn validate_fails_on_high_rms() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calibration = write_calibration(dir.path(), 4.0);
    bin()
        .args(["validate", "--calibration"])
        .arg(&calibration)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[FAIL] Rms"));
}

#[test]
fn detect_real_face_exits_zero_and_writes_sinks() {
    let s = setup();
    let rig = SyntheticRig::reference();
    let (front, side) = observe(&rig, &face(11));
    let landmarks = write_sidecar(s.dir.path(), &sidecar(&front, &side));
    let json = s.dir.path().join("result.json");
    let csv = s.dir.path().join("results.csv");

    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .arg("--landmarks")
        .arg(&landmarks)
        .arg("--json")
        .arg(&json)
        .arg("--csv")
        .arg(&csv)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("REAL HUMAN"));

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).expect("read")).expect("parse");
    assert_eq!(doc["detection"]["is_deepfake"], serde_json::json!(false));
    let rows = std::fs::read_to_string(&csv).expect("read");
    assert_eq!(rows.lines().count(), 2);
    assert!(rows.starts_with("timestamp,is_deepfake,confidence"));
}

#[test]
fn detect_tampered_pair_exits_one() {
    let s = setup();
    let rig = SyntheticRig::reference();
    let (front, side) = observe(&rig, &face(12));
    let (front, side) = tamper(&front, &side, 20.0);
    let landmarks = write_sidecar(s.dir.path(), &sidecar(&front, &side));

    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .arg("--landmarks")
        .arg(&landmarks)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("DEEPFAKE"));
}

#[test]
fn detect_without_a_face_exits_two() {
    let s = setup();
    let rig = SyntheticRig::reference();
    let (front, side) = observe(&rig, &face(13));
    let mut landmarks = sidecar(&front, &side);
    landmarks.side = None;
    let landmarks = write_sidecar(s.dir.path(), &landmarks);

    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .arg("--landmarks")
        .arg(&landmarks)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("no face"));
}

#[test]
fn detect_with_missing_calibration_fails() {
    let s = setup();
    let landmarks = write_sidecar(s.dir.path(), &SidecarLandmarks::default());
    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(s.dir.path().join("missing.json"))
        .arg("--landmarks")
        .arg(&landmarks)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to load calibration"));
}

#[test]
fn detect_rejects_inverted_thresholds() {
    let s = setup();
    let rig = SyntheticRig::reference();
    let (front, side) = observe(&rig, &face(15));
    let landmarks = write_sidecar(s.dir.path(), &sidecar(&front, &side));
    let config = s.dir.path().join("detector.json");
    std::fs::write(
        &config,
        r#"{"thresholds": {"real_threshold": 20.0, "deepfake_threshold": 10.0}}"#,
    )
    .expect("write");

    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .arg("--landmarks")
        .arg(&landmarks)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid config"))
        .stdout(predicate::str::contains("DETECTION RESULT").not());
}

#[test]
fn detect_splits_a_combined_frame() {
    let s = setup();
    let rig = SyntheticRig::reference();
    let (front, side) = observe(&rig, &face(14));
    // normalized coordinates need the split frame size
    let to_normalized = |pts: &[nalgebra::Point2<f64>]| silo_sight::SidecarRecord {
        points: pts.iter().map(|p| [p.x / 1280.0, p.y / 720.0]).collect(),
        normalized: true,
    };
    let landmarks = write_sidecar(
        s.dir.path(),
        &SidecarLandmarks {
            front: Some(to_normalized(&front)),
            side: Some(to_normalized(&side)),
        },
    );
    let combined = s.dir.path().join("combined.png");
    ::image::GrayImage::from_pixel(2560, 720, ::image::Luma([128]))
        .save(&combined)
        .expect("save");

    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .arg("--landmarks")
        .arg(&landmarks)
        .arg("--combined")
        .arg(&combined)
        .args(["--layout", "side-by-side", "--front", "left"])
        .assert()
        .code(0);
}

#[test]
fn detect_rejects_an_unknown_layout() {
    let s = setup();
    bin()
        .arg("detect")
        .arg("--calibration")
        .arg(&s.calibration)
        .args(["--landmarks", "unused.json", "--layout", "diagonal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("diagonal"));
}

#[test]
fn calibrate_reports_mismatched_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cam1 = dir.path().join("cam1");
    let cam2 = dir.path().join("cam2");
    std::fs::create_dir_all(&cam1).expect("mkdir");
    std::fs::create_dir_all(&cam2).expect("mkdir");
    for i in 0..2 {
        ::image::GrayImage::new(8, 8)
            .save(cam1.join(format!("{i:03}.png")))
            .expect("save");
    }
    ::image::GrayImage::new(8, 8)
        .save(cam2.join("000.png"))
        .expect("save");

    bin()
        .arg("calibrate")
        .arg("--cam1-dir")
        .arg(&cam1)
        .arg("--cam2-dir")
        .arg(&cam2)
        .arg("--output")
        .arg(dir.path().join("out.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("different image counts"));
}

#[test]
fn calibrate_without_boards_fails_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cam1 = dir.path().join("cam1");
    let cam2 = dir.path().join("cam2");
    for cam in [&cam1, &cam2] {
        std::fs::create_dir_all(cam).expect("mkdir");
        for i in 0..3 {
            ::image::GrayImage::from_pixel(64, 48, ::image::Luma([200]))
                .save(cam.join(format!("{i:03}.png")))
                .expect("save");
        }
    }
    let output = dir.path().join("out.json");

    bin()
        .arg("calibrate")
        .arg("--cam1-dir")
        .arg(&cam1)
        .arg("--cam2-dir")
        .arg(&cam2)
        .args(["--min-images", "2"])
        .arg("--output")
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not enough calibration views"));
    assert!(!output.exists());
}

#[test]
fn calibrate_rejects_mixed_sources() {
    bin()
        .args([
            "calibrate",
            "--combined-video",
            "call.mp4",
            "--cam1-dir",
            "a",
            "--cam2-dir",
            "b",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

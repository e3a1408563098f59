//! CLI Integration Tests
//!
//! Runs the binary against synthetic scans written to a temp directory.

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn autocrop_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scan-autocrop"))
}

/// Light page on a dark bed
fn write_page(path: &Path, width: u32, height: u32, page: (u32, u32, u32, u32)) {
    let (x0, y0, x1, y1) = page;
    let image = RgbImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Rgb([230, 230, 230])
        } else {
            Rgb([20, 20, 20])
        }
    });
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image.save(path).unwrap();
}

fn write_blank(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]))
        .save(path)
        .unwrap();
}

fn scans() -> TempDir {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    write_page(&input.join("p001.png"), 300, 220, (50, 40, 250, 180));
    write_page(&input.join("box2/p002.png"), 320, 240, (60, 30, 260, 210));
    write_blank(&input.join("box2/blank.png"));
    dir
}

fn read_run(output: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(output.join("run.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_help_command() {
    autocrop_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan-autocrop"))
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_version_command() {
    autocrop_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_info_command() {
    autocrop_cmd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("System Information"))
        .stdout(predicate::str::contains("scan-autocrop.toml"));
}

#[test]
fn test_process_requires_output() {
    autocrop_cmd()
        .args(["process", "in"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_process_missing_input() {
    let dir = TempDir::new().unwrap();
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("nope"))
        .arg(dir.path().join("out"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Input not found"));
}

#[test]
fn test_process_empty_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("in")).unwrap();
    std::fs::write(dir.path().join("in/notes.txt"), "not a scan").unwrap();
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(dir.path().join("out"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No supported images"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = scans();
    let output = dir.path().join("out");
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(&output)
        .args(["--dry-run", "-b", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry Run"))
        .stdout(predicate::str::contains("Images to process: 3"))
        .stdout(predicate::str::contains("Border margin: 12 px"));
    assert!(!output.exists());
}

#[test]
fn test_process_batch_mirrors_layout() {
    let dir = scans();
    let output = dir.path().join("out");
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(&output)
        .arg("-q")
        .assert()
        .success();

    assert!(output.join("p001.png").exists());
    assert!(output.join("box2/p002.png").exists());
    assert!(output.join("box2/blank.png").exists());
    assert!(output.join("thumbnails/box2/p002.png.jpg").exists());
    assert!(output.join("report.html").exists());

    let cropped = image::open(output.join("p001.png")).unwrap();
    assert!(cropped.width() < 300 && cropped.height() < 220);

    let blank = image::open(output.join("box2/blank.png")).unwrap().to_rgb8();
    assert_eq!(blank.dimensions(), (100, 100));

    let run = read_run(&output);
    assert_eq!(run["totals"]["total"], 3);
    assert_eq!(run["totals"]["corrected"], 2);
    assert_eq!(run["totals"]["fallback"], 1);
    assert_eq!(run["totals"]["failed"], 0);
}

#[test]
fn test_process_without_extras() {
    let dir = scans();
    let output = dir.path().join("out");
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(&output)
        .args(["-q", "--no-thumbnails", "--no-report", "--save-reference"])
        .assert()
        .success();

    assert!(!output.join("thumbnails").exists());
    assert!(!output.join("report.html").exists());
    assert!(output.join("run.json").exists());
    assert!(output.join("p001_reference.png").exists());
    // no reference for the page kept as-is
    assert!(!output.join("box2/blank_reference.png").exists());
}

#[test]
fn test_reference_clash_rejected_before_writing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    write_page(&input.join("a.png"), 200, 160, (40, 30, 160, 130));
    write_page(&input.join("a_reference.png"), 200, 160, (40, 30, 160, 130));
    let output = dir.path().join("out");

    autocrop_cmd()
        .arg("process")
        .arg(&input)
        .arg(&output)
        .args(["-q", "--save-reference"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("a_reference.png"));
    assert!(!output.exists());
}

#[test]
fn test_failed_image_sets_exit_code() {
    let dir = scans();
    std::fs::write(dir.path().join("in/broken.png"), b"not an image").unwrap();
    let output = dir.path().join("out");
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(&output)
        .arg("-q")
        .assert()
        .code(5);

    let run = read_run(&output);
    assert_eq!(run["totals"]["failed"], 1);
    assert!(output.join("p001.png").exists());
}

#[test]
fn test_invalid_config_rejected() {
    let dir = scans();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[correction]\nfill = \"white\"\nfill_rgb = [1, 2, 3]\n").unwrap();
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fill_rgb"));
}

#[test]
fn test_invalid_area_ratio_rejected() {
    let dir = scans();
    autocrop_cmd()
        .arg("process")
        .arg(dir.path().join("in"))
        .arg(dir.path().join("out"))
        .args(["--min-area-ratio", "1.5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("min_area_ratio"));
}

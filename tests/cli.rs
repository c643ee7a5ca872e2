extern crate assert_cmd;
extern crate predicates;
extern crate tempfile;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn mandel(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mandel").unwrap();
    cmd.current_dir(dir.path()).env("RUST_LOG", "info");
    cmd
}

#[test]
fn host_render_writes_a_plain_pixmap() {
    let dir = TempDir::new().unwrap();
    mandel(&dir)
        .args(&["--backend", "host", "--size", "16x12", "--iterations", "50"])
        .assert()
        .success();

    let text = fs::read_to_string(dir.path().join("mandel.ppm")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(&lines[..3], &["P3", "16 12", "255"]);
    assert_eq!(lines.len(), 3 + 16 * 12);
}

#[test]
fn strategies_write_the_same_image() {
    let dir = TempDir::new().unwrap();
    for &(strategy, name) in [("single", "single.ppm"), ("resumable", "resumable.ppm")].iter() {
        mandel(&dir)
            .args(&["--backend", "host", "--size", "20x10", "--iterations", "40"])
            .args(&["--max-loop", "7", "--strategy", strategy, "--output", name])
            .assert()
            .success();
    }
    let single = fs::read(dir.path().join("single.ppm")).unwrap();
    let resumable = fs::read(dir.path().join("resumable.ppm")).unwrap();
    assert_eq!(single, resumable);
}

#[test]
fn graymap_output() {
    let dir = TempDir::new().unwrap();
    mandel(&dir)
        .args(&["--backend", "host", "--size", "8x4", "--format", "pgm"])
        .args(&["--output", "mandel.pgm"])
        .assert()
        .success();

    let bytes = fs::read(dir.path().join("mandel.pgm")).unwrap();
    assert!(bytes.starts_with(b"P5"));
}

#[test]
fn rejects_malformed_size() {
    let dir = TempDir::new().unwrap();
    mandel(&dir)
        .args(&["--backend", "host", "--size", "800by600"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse output image size"));
}

#[test]
fn rejects_zero_iterations() {
    let dir = TempDir::new().unwrap();
    mandel(&dir)
        .args(&["--backend", "host", "--iterations", "0"])
        .assert()
        .failure();
}

#[test]
fn missing_kernel_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    mandel(&dir)
        .args(&["--kernel", "nonexistent.wgsl", "--size", "4x4"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Render failure"));
    assert!(!dir.path().join("mandel.ppm").exists());
}

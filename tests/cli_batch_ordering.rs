//! CLI integration tests for batch processing
//!
//! Runs the built binary over a temporary directory and checks file ordering,
//! per-file failure isolation and the JSON report.

#![cfg(feature = "cli")]

use nobg::{services::ImageCodec, types::Bitmap};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn write_subject(path: &Path, width: u32, height: u32) {
    let mut bitmap = Bitmap::filled(width, height, [255, 255, 255, 255]).unwrap();
    for y in height / 4..height * 3 / 4 {
        for x in width / 4..width * 3 / 4 {
            bitmap.set_pixel(x, y, [40, 90, 160, 255]);
        }
    }
    ImageCodec::save_png(&bitmap, path).expect("Failed to write fixture");
}

fn nobg() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nobg"))
}

#[test]
fn test_cli_batch_alphanumerical_order_and_report() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();

    for name in ["z_last.png", "a_first.png", "img10.png", "img2.png"] {
        write_subject(&input_dir.join(name), 32, 24);
    }
    fs::write(input_dir.join("m_broken.png"), [0x89, 0x50, 0x4E, 0x47]).unwrap();
    fs::write(input_dir.join("notes.txt"), "not an image").unwrap();

    let report_path = temp_dir.path().join("report.json");
    let output = nobg()
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--report")
        .arg(&report_path)
        .output()
        .expect("Failed to execute CLI");

    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let items = report["items"].as_array().unwrap();

    let names: Vec<String> = items
        .iter()
        .map(|item| {
            Path::new(item["name"].as_str().unwrap())
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    assert_eq!(
        names,
        vec!["a_first.png", "img10.png", "img2.png", "m_broken.png", "z_last.png"]
    );

    let statuses: Vec<&str> = items.iter().map(|i| i["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["success", "success", "success", "failed", "success"]);

    for stem in ["a_first", "img10", "img2", "z_last"] {
        let written = ImageCodec::load(output_dir.join(format!("{stem}_bg_removed.png"))).unwrap();
        assert_eq!(written.dimensions(), (32, 24));
        assert_eq!(written.pixel(0, 0).map(|p| p[3]), Some(0));
    }
    assert!(!output_dir.join("m_broken_bg_removed.png").exists());
}

#[test]
fn test_cli_single_file_with_geometry() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("portrait.png");
    let output = temp_dir.path().join("square.png");
    write_subject(&input, 40, 60);

    let status = nobg()
        .arg(&input)
        .args(["-o"])
        .arg(&output)
        .args(["--method", "color-key", "--bg-color", "FFFFFF", "--crop-ratio", "1:1"])
        .args(["--rotate", "90", "--feather", "0", "--save-mask"])
        .status()
        .expect("Failed to execute CLI");
    assert!(status.success());

    // Rotated to 60x40, then squared to 40x40
    let written = ImageCodec::load(&output).unwrap();
    assert_eq!(written.dimensions(), (40, 40));
    assert_eq!(written.pixel(0, 0).map(|p| p[3]), Some(0));
    assert_eq!(written.pixel(20, 20), Some([40, 90, 160, 255]));
    assert!(temp_dir.path().join("square_mask.png").exists());
}

#[test]
fn test_cli_rejects_invalid_arguments() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in.png");
    write_subject(&input, 8, 8);

    let output = nobg()
        .arg(&input)
        .args(["--rotate", "45"])
        .output()
        .expect("Failed to execute CLI");
    assert!(!output.status.success());

    let output = nobg()
        .arg(temp_dir.path().join("does-not-exist.png"))
        .output()
        .expect("Failed to execute CLI");
    assert!(!output.status.success());
}

mod common;

use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use common::synthetic_image::{bands, uniform_gray};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("crfh-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn crfh_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_crfh"))
}

#[test]
fn writes_normalized_histogram() {
    let input = scratch("uniform.png");
    let output = scratch("uniform.txt");
    uniform_gray(4, 4, 128).save(&input).unwrap();

    let status = crfh_bin()
        .arg("L(0,4)")
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&output).unwrap(), "2:1\n");
}

#[test]
fn optional_filter_and_border_arguments() {
    let input = scratch("bands.png");
    let output = scratch("bands.txt");
    bands(10, &[(5, 0), (3, 100), (2, 200)]).save(&input).unwrap();

    let status = crfh_bin()
        .args([OsStr::new("L(0,3)"), input.as_os_str(), output.as_os_str()])
        .args(["0.015", "0"])
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&output).unwrap(), "2:0.2\n");

    // a border of 2 leaves 6x6 pixels: rows 2..5 are 0, rows 5..8 are 100
    let status = crfh_bin()
        .args([OsStr::new("L(0,3)"), input.as_os_str(), output.as_os_str()])
        .args(["0", "2"])
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&output).unwrap(), "0:0.5 1:0.5\n");
}

#[test]
fn usage_errors_exit_with_one() {
    let output = crfh_bin().arg("L(0,4)").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));

    let input = scratch("usage.png");
    uniform_gray(4, 4, 1).save(&input).unwrap();
    let output = crfh_bin()
        .args([OsStr::new("Lzz(1,4)"), input.as_os_str(), scratch("usage.txt").as_os_str()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let output = crfh_bin()
        .args([OsStr::new("L(0,4)"), input.as_os_str(), scratch("usage.txt").as_os_str()])
        .arg("lots")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

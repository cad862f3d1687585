// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fs::File;

use serde_json::Value;
use tempfile::TempDir;

use crate::*;

const SMALL_ARGS: [&str; 8] = [
    "--num-timesteps",
    "48",
    "--num-channels",
    "24",
    "--num-baselines",
    "2",
    "--polarisations",
    "XX",
];

#[test]
fn test_flag_simulated_writes_flags() {
    let tmp_dir = TempDir::new().unwrap();
    let output = path_in_dir("flags.json", tmp_dir.path());
    let cmd = hyperflag()
        .arg("flag-simulated")
        .args(SMALL_ARGS)
        .args(["-o", &format!("{}", output.display()), "--no-progress-bars"])
        .ok();
    assert!(cmd.is_ok(), "flag-simulated failed on simple arguments");
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("Detected"), "{stdout}");

    let json: Value = serde_json::from_reader(File::open(&output).unwrap()).unwrap();
    assert_eq!(json["strategy"], "default");
    assert_eq!(json["width"], 48);
    assert_eq!(json["height"], 24);
    let baselines = json["baselines"].as_array().unwrap();
    assert_eq!(baselines.len(), 2);
    assert_eq!(baselines[1]["description"], "Tile000 x Tile002");
    assert_eq!(baselines[0]["failed"], false);
}

#[test]
fn test_save_toml_reproduces_the_run() {
    let tmp_dir = TempDir::new().unwrap();
    let toml = path_in_dir("args.toml", tmp_dir.path());
    let cmd = hyperflag()
        .arg("flag-simulated")
        .args(SMALL_ARGS)
        .args([
            "--seed",
            "7",
            "--dry-run",
            "--save-toml",
            &format!("{}", toml.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-simulated --save-toml failed");
    let contents = std::fs::read_to_string(&toml).unwrap();
    assert!(contents.contains("seed = 7"), "{contents}");
    assert!(contents.contains("num_channels = 24"), "{contents}");

    // The saved arguments are usable as an arguments file.
    let output = path_in_dir("flags.json", tmp_dir.path());
    let cmd = hyperflag()
        .args([
            "flag-simulated",
            &format!("{}", toml.display()),
            "-o",
            &format!("{}", output.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-simulated failed with a saved arguments file");
    let json: Value = serde_json::from_reader(File::open(&output).unwrap()).unwrap();
    assert_eq!(json["height"], 24);
}

#[test]
fn test_dry_run_writes_nothing() {
    let tmp_dir = TempDir::new().unwrap();
    let output = path_in_dir("flags.json", tmp_dir.path());
    let cmd = hyperflag()
        .arg("flag-simulated")
        .args(SMALL_ARGS)
        .args(["-o", &format!("{}", output.display()), "--dry-run"])
        .ok();
    assert!(cmd.is_ok(), "flag-simulated --dry-run failed");
    assert!(!output.exists());
}

#[test]
fn test_bad_output_extension_is_an_error() {
    let cmd = hyperflag()
        .arg("flag-simulated")
        .args(SMALL_ARGS)
        .args(["-o", "flags.uvfits", "--no-progress-bars"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error:"), "{stderr}");
}

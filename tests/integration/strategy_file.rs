// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::*;
use hyperflag::{default_strategy, Strategy};

#[test]
fn test_write_then_print_strategy() {
    let tmp_dir = TempDir::new().unwrap();
    for ext in ["toml", "json", "yaml"] {
        let path = path_in_dir(format!("strategy.{ext}"), tmp_dir.path());
        let cmd = hyperflag()
            .args([
                "strategy-write",
                &format!("{}", path.display()),
                "--name",
                "mine",
            ])
            .ok();
        assert!(cmd.is_ok(), "strategy-write failed on simple arguments");
        assert!(path.exists());

        let cmd = hyperflag()
            .args(["strategy-print", &format!("{}", path.display())])
            .ok();
        assert!(cmd.is_ok(), "strategy-print failed on simple arguments");
        let (stdout, stderr) = get_cmd_output(cmd);
        assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
        assert!(stdout.contains("Strategy 'mine'"), "{stdout}");
        assert!(stdout.contains("SumThreshold"), "{stdout}");
    }

    // The JSON file is readable with the library.
    let json = std::fs::read_to_string(path_in_dir("strategy.json", tmp_dir.path())).unwrap();
    let strategy: Strategy = serde_json::from_str(&json).unwrap();
    assert_eq!(strategy.name, "mine");
    assert_eq!(strategy.root, default_strategy().root);
}

#[test]
fn test_unknown_strategy_extension_is_an_error() {
    let tmp_dir = TempDir::new().unwrap();
    let path = path_in_dir("strategy.rfis", tmp_dir.path());
    let cmd = hyperflag()
        .args(["strategy-write", &format!("{}", path.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error:"), "{stderr}");
    assert!(!path.exists());
}

#[test]
fn test_print_missing_strategy_is_an_error() {
    let cmd = hyperflag()
        .args(["strategy-print", "/does/not/exist.toml"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error:"), "{stderr}");
}

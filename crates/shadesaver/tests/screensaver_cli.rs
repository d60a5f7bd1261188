use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn shadesaver(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shadesaver"));
    command
        .env("SHADESAVER_CONFIG_DIR", config_dir)
        .env_remove("SHADESAVER_SHADER")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn configure_prints_settings_location() {
    let root = TempDir::new().unwrap();

    for switch in ["/c", "/C:4242", "--configure"] {
        let output = shadesaver(root.path())
            .arg(switch)
            .output()
            .expect("failed to run shadesaver");

        assert!(output.status.success(), "{switch} should exit cleanly");
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert_eq!(
            stdout.trim(),
            root.path().join("shadesaver.toml").display().to_string()
        );
    }
}

#[test]
fn no_mode_exits_quietly() {
    let root = TempDir::new().unwrap();

    let output = shadesaver(root.path())
        .output()
        .expect("failed to run shadesaver");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_settings_fail_before_opening_a_window() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("shadesaver.toml"), "pacing = \"immediate\"\n").unwrap();

    let output = shadesaver(root.path())
        .arg("/w")
        .output()
        .expect("failed to run shadesaver");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(
        stderr.contains("failed to load settings"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn rejects_malformed_preview_handle() {
    let root = TempDir::new().unwrap();

    let status = shadesaver(root.path())
        .args(["--preview", "not-a-handle"])
        .status()
        .expect("failed to run shadesaver");

    assert!(!status.success());
}

#[test]
fn preview_switch_without_handle_exits_quietly() {
    let root = TempDir::new().unwrap();

    for args in [&["/p"][..], &["-p", "later"][..]] {
        let output = shadesaver(root.path())
            .args(args)
            .output()
            .expect("failed to run shadesaver");

        assert!(output.status.success(), "{args:?} should exit cleanly");
        assert!(output.stdout.is_empty());
    }
}

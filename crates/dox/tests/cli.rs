//! End-to-end tests of the dox binary that need no container engine

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn dox(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dox"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("DOX_LOG")
        .output()
        .expect("failed to run dox")
}

fn write_command(config_home: &Path, name: &str, yaml: &str) {
    let dir = config_home.join("dox").join("commands");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.yaml", name)), yaml).unwrap();
}

#[test]
fn test_version_prints_package_version() {
    let home = TempDir::new().unwrap();
    let output = dox(home.path(), &["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("dox version {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_list_without_commands_explains_where_to_add_them() {
    let home = TempDir::new().unwrap();
    let output = dox(home.path(), &["list"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No commands configured."));
    assert!(stdout.contains("<command>.yaml"));
}

#[test]
fn test_list_shows_commands_sorted() {
    let home = TempDir::new().unwrap();
    write_command(home.path(), "python", "image: python:3.12\n");
    write_command(home.path(), "node", "image: node:20\n");

    let output = dox(home.path(), &["list"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "Available commands:\n  node\n  python\n");
}

#[test]
fn test_unknown_command_fails_locally() {
    let home = TempDir::new().unwrap();
    let output = dox(home.path(), &["nope", "--flag"]);

    assert_eq!(output.status.code(), Some(125));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
    assert!(stderr.contains("doesn't exist"));
}

#[test]
fn test_run_subcommand_reports_invalid_definition() {
    let home = TempDir::new().unwrap();
    write_command(home.path(), "broken", "volumes:\n  - .:/src\n");

    let output = dox(home.path(), &["run", "broken"]);

    assert_eq!(output.status.code(), Some(125));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("image or build.dockerfile_inline"));
}

#[test]
fn test_upgrade_all_without_commands() {
    let home = TempDir::new().unwrap();
    let output = dox(home.path(), &["upgrade-all"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No commands to upgrade."));
}

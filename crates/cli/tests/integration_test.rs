//! Integration tests for the dvs binary

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_dvs(dir: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_dvs"))
        .args(args)
        .current_dir(dir)
        .output()?)
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    anyhow::ensure!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

fn init_without_scm() -> Result<TempDir> {
    let temp = TempDir::new()?;
    let output = run_dvs(temp.path(), &["init", "--no-scm"])?;
    assert!(output.status.success(), "dvs init --no-scm failed");
    Ok(temp)
}

#[test]
fn test_init_requires_git_unless_no_scm() -> Result<()> {
    let temp = TempDir::new()?;

    let output = run_dvs(temp.path(), &["init"])?;
    assert!(!output.status.success());
    assert!(!temp.path().join(".dvs").exists());

    let output = run_dvs(temp.path(), &["init", "--no-scm"])?;
    assert!(output.status.success());
    assert!(temp.path().join(".dvs/config.toml").exists());
    Ok(())
}

#[test]
fn test_add_writes_tracking_file() -> Result<()> {
    let temp = init_without_scm()?;
    fs::write(temp.path().join("data.csv"), "a,b\n1,2\n")?;

    let output = run_dvs(temp.path(), &["add", "data.csv"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let record = fs::read_to_string(temp.path().join("data.csv.dvs"))?;
    assert!(record.contains("path: data.csv"));
    assert_eq!(fs::read_to_string(temp.path().join("data.csv"))?, "a,b\n1,2\n");

    let output = run_dvs(temp.path(), &["status"])?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("up to date"));
    Ok(())
}

#[test]
fn test_add_nested_output_fails() -> Result<()> {
    let temp = init_without_scm()?;
    fs::create_dir(temp.path().join("dir"))?;
    fs::write(temp.path().join("dir/file"), "content")?;

    assert!(run_dvs(temp.path(), &["add", "dir"])?.status.success());
    let output = run_dvs(temp.path(), &["add", "dir/file"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("overlapping"));
    assert!(!temp.path().join("dir/file.dvs").exists());
    Ok(())
}

#[test]
fn test_unprotect_exit_status() -> Result<()> {
    let temp = init_without_scm()?;
    fs::write(temp.path().join("tracked"), "content")?;
    assert!(run_dvs(temp.path(), &["add", "tracked"])?.status.success());

    let output = run_dvs(temp.path(), &["unprotect", "tracked"])?;
    assert!(output.status.success());
    fs::write(temp.path().join("tracked"), "edited content")?;

    // One bad target fails the command but the others are still processed
    fs::write(temp.path().join("untracked"), "content")?;
    let output = run_dvs(temp.path(), &["unprotect", "untracked", "tracked"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Unprotected"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("untracked"));
    Ok(())
}

#[test]
fn test_status_reports_modified_output() -> Result<()> {
    let temp = init_without_scm()?;
    fs::write(temp.path().join("file"), "first")?;
    assert!(run_dvs(temp.path(), &["add", "file"])?.status.success());
    assert!(run_dvs(temp.path(), &["unprotect", "file"])?.status.success());
    fs::write(temp.path().join("file"), "second version")?;

    let output = run_dvs(temp.path(), &["status"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("file.dvs"));
    assert!(stdout.contains("modified"));
    Ok(())
}

#[test]
fn test_checkout_restores_deleted_output() -> Result<()> {
    let temp = init_without_scm()?;
    fs::write(temp.path().join("file"), "content")?;
    assert!(run_dvs(temp.path(), &["add", "file"])?.status.success());
    fs::remove_file(temp.path().join("file"))?;

    let output = run_dvs(temp.path(), &["checkout"])?;
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(temp.path().join("file"))?, "content");
    Ok(())
}

#[test]
fn test_config_set_and_get() -> Result<()> {
    let temp = init_without_scm()?;

    assert!(run_dvs(temp.path(), &["config", "cache.type", "copy"])?.status.success());
    let output = run_dvs(temp.path(), &["config", "cache.type"])?;
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "copy");
    Ok(())
}

#[test]
fn test_diff_without_scm_fails() -> Result<()> {
    let temp = init_without_scm()?;
    let output = run_dvs(temp.path(), &["diff"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("source control"));
    Ok(())
}

#[test]
fn test_diff_show_json() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let temp = TempDir::new()?;
    run_git(temp.path(), &["init", "-q"])?;
    assert!(run_dvs(temp.path(), &["init"])?.status.success());
    fs::write(temp.path().join("file"), "text")?;
    assert!(run_dvs(temp.path(), &["add", "file"])?.status.success());

    let output = run_dvs(temp.path(), &["diff", "--show-json"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["added"][0]["path"], "file");
    assert_eq!(json["added"][0]["hash"], "1cb251ec0d568de6a929b520c4aed8d1");
    assert_eq!(json["deleted"], serde_json::json!([]));
    assert_eq!(json["modified"], serde_json::json!([]));

    // The output is ignored by git so only the tracking file is left to commit
    let gitignore = fs::read_to_string(temp.path().join(".gitignore"))?;
    assert!(gitignore.lines().any(|line| line == "/file"));
    Ok(())
}

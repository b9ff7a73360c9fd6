//! Git fixtures shared by the repository tests

#![allow(dead_code)]

use anyhow::Result;
use dvs_cli::{AddOptions, Repo};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    anyhow::ensure!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

pub fn git_commit(dir: &Path, message: &str) -> Result<()> {
    run_git(dir, &["add", "-A"])?;
    run_git(dir, &["commit", "-q", "-m", message])
}

/// A git repository with dvs initialized at its root
pub fn setup() -> Result<(TempDir, Repo)> {
    let temp = TempDir::new()?;
    run_git(temp.path(), &["init", "-q"])?;
    run_git(temp.path(), &["config", "user.email", "test@test.com"])?;
    run_git(temp.path(), &["config", "user.name", "Test User"])?;
    run_git(temp.path(), &["config", "commit.gpgsign", "false"])?;
    let repo = Repo::init(temp.path(), false)?;
    Ok((temp, repo))
}

pub fn add(repo: &Repo, path: &str) -> Result<()> {
    repo.add(&[repo.root().join(path)], &AddOptions::default())?;
    Ok(())
}

//! Diff scenarios against real git history
//!
//! Skipped when no `git` binary is available.

mod common;

use anyhow::Result;
use common::{add, git_available, git_commit, setup};
use dvs_cli::{DiffOptions, Repo, RepoError};
use dvs_core::hash::hash_bytes;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tempfile::TempDir;

fn write_dir(root: &Path, name: &str, files: &[(&str, &str)]) -> Result<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    for (file, content) in files {
        fs::write(dir.join(file), content)?;
    }
    Ok(dir)
}

fn dir_key(name: &str) -> String {
    format!("{}{}", name, MAIN_SEPARATOR)
}

#[test]
fn test_added_file_without_commits() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    fs::write(temp.path().join("file"), "text")?;
    add(&repo, "file")?;

    let result = repo.diff(&DiffOptions::default())?;
    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].path, "file");
    assert_eq!(result.added[0].hash, "1cb251ec0d568de6a929b520c4aed8d1");
    assert!(result.deleted.is_empty());
    assert!(result.modified.is_empty());
    Ok(())
}

#[test]
fn test_modified_file_against_head() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    fs::write(temp.path().join("file"), "first")?;
    add(&repo, "file")?;
    git_commit(temp.path(), "first")?;

    repo.unprotect(&temp.path().join("file"))?;
    fs::write(temp.path().join("file"), "second")?;

    let result = repo.diff(&DiffOptions::default())?;
    assert!(result.added.is_empty());
    assert!(result.deleted.is_empty());
    assert_eq!(result.modified.len(), 1);
    assert_eq!(result.modified[0].path, "file");
    assert_eq!(result.modified[0].hash.old, hash_bytes(b"first").to_string());
    assert_eq!(result.modified[0].hash.new, hash_bytes(b"second").to_string());
    Ok(())
}

#[test]
fn test_deleted_tracking_file() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    fs::write(temp.path().join("file"), "text")?;
    add(&repo, "file")?;
    git_commit(temp.path(), "track file")?;

    fs::remove_file(temp.path().join("file.dvs"))?;
    fs::remove_file(temp.path().join("file"))?;

    let result = repo.diff(&DiffOptions::default())?;
    assert_eq!(result.deleted.len(), 1);
    assert_eq!(result.deleted[0].path, "file");
    assert_eq!(result.deleted[0].hash, "1cb251ec0d568de6a929b520c4aed8d1");
    Ok(())
}

#[test]
fn test_directory_modified_between_revisions() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    write_dir(temp.path(), "dir", &[("1", "1"), ("2", "2")])?;
    add(&repo, "dir")?;
    git_commit(temp.path(), "first version")?;

    repo.unprotect(&temp.path().join("dir"))?;
    write_dir(temp.path(), "dir", &[("2", "two"), ("3", "3")])?;
    repo.commit(&[])?;
    git_commit(temp.path(), "second version")?;

    let options = DiffOptions {
        a_rev: Some("HEAD~1".into()),
        b_rev: Some("HEAD".into()),
        expand_dirs: false,
    };
    let result = repo.diff(&options)?;
    assert!(result.added.is_empty());
    assert!(result.deleted.is_empty());
    assert_eq!(result.modified.len(), 1);
    assert_eq!(result.modified[0].path, dir_key("dir"));
    assert_eq!(result.modified[0].hash.old, "5fb6b29836c388e093ca0715c872fe2a.dir");
    assert_eq!(result.modified[0].hash.new, "9b5faf37366b3370fd98e3e60ca439c1.dir");

    // HEAD matches the working tree
    assert!(repo.diff(&DiffOptions::default())?.is_empty());
    Ok(())
}

#[test]
fn test_expand_dirs_lists_changed_files() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    write_dir(temp.path(), "dir", &[("1", "1"), ("2", "2")])?;
    add(&repo, "dir")?;
    git_commit(temp.path(), "first version")?;

    repo.unprotect(&temp.path().join("dir"))?;
    write_dir(temp.path(), "dir", &[("2", "two"), ("3", "3")])?;

    let options = DiffOptions {
        expand_dirs: true,
        ..Default::default()
    };
    let result = repo.diff(&options)?;

    let added: Vec<&str> = result.added.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(added, vec![format!("{}3", dir_key("dir"))]);
    assert!(result.deleted.is_empty());

    let modified: Vec<&str> = result.modified.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(modified, vec![dir_key("dir"), format!("{}2", dir_key("dir"))]);
    Ok(())
}

/// Drop the cache and the state index, then reopen so nothing is remembered
fn wipe_cache(temp: &TempDir, repo: Repo) -> Result<Repo> {
    drop(repo);
    let dvs_dir = temp.path().join(".dvs");
    if dvs_dir.join("cache").exists() {
        fs::remove_dir_all(dvs_dir.join("cache"))?;
    }
    if dvs_dir.join("state.json").exists() {
        fs::remove_file(dvs_dir.join("state.json"))?;
    }
    Ok(Repo::open(temp.path())?)
}

#[test]
fn test_working_tree_diff_without_cache() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    fs::write(temp.path().join("file"), "first")?;
    add(&repo, "file")?;
    git_commit(temp.path(), "track file")?;

    repo.unprotect(&temp.path().join("file"))?;
    fs::write(temp.path().join("file"), "second")?;
    write_dir(temp.path(), "dir", &[("1", "1"), ("2", "2")])?;
    add(&repo, "dir")?;
    let repo = wipe_cache(&temp, repo)?;

    let result = repo.diff(&DiffOptions::default())?;
    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].path, dir_key("dir"));
    assert_eq!(result.added[0].hash, "5fb6b29836c388e093ca0715c872fe2a.dir");
    assert!(result.deleted.is_empty());
    assert_eq!(result.modified.len(), 1);
    assert_eq!(result.modified[0].path, "file");
    assert_eq!(result.modified[0].hash.old, hash_bytes(b"first").to_string());
    assert_eq!(result.modified[0].hash.new, hash_bytes(b"second").to_string());

    let expanded = repo.diff(&DiffOptions {
        expand_dirs: true,
        ..Default::default()
    })?;
    assert_eq!(expanded, result);
    Ok(())
}

#[test]
fn test_expand_dirs_falls_back_without_manifest() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    write_dir(temp.path(), "dir", &[("1", "1"), ("2", "2")])?;
    add(&repo, "dir")?;
    git_commit(temp.path(), "track dir")?;

    repo.unprotect(&temp.path().join("dir"))?;
    write_dir(temp.path(), "dir", &[("2", "two")])?;
    let repo = wipe_cache(&temp, repo)?;

    let coarse = repo.diff(&DiffOptions::default())?;
    assert_eq!(coarse.modified.len(), 1);
    assert_eq!(coarse.modified[0].path, dir_key("dir"));
    assert_eq!(coarse.modified[0].hash.old, "5fb6b29836c388e093ca0715c872fe2a.dir");

    let expanded = repo.diff(&DiffOptions {
        expand_dirs: true,
        ..Default::default()
    })?;
    assert_eq!(expanded, coarse);
    Ok(())
}

#[test]
fn test_unknown_revision() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let (temp, repo) = setup()?;
    fs::write(temp.path().join("file"), "text")?;
    add(&repo, "file")?;
    git_commit(temp.path(), "track file")?;

    let options = DiffOptions {
        a_rev: Some("no-such-revision".into()),
        ..Default::default()
    };
    match repo.diff(&options) {
        Err(RepoError::UnknownRevision { rev }) => assert_eq!(rev, "no-such-revision"),
        other => panic!("expected unknown revision, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn test_diff_requires_source_control() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = Repo::init(temp.path(), true)?;
    fs::write(temp.path().join("file"), "text")?;
    add(&repo, "file")?;

    assert!(matches!(
        repo.diff(&DiffOptions::default()),
        Err(RepoError::NoScm)
    ));
    Ok(())
}

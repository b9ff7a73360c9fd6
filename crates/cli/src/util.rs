//! Shared utilities for CLI commands

use crate::repo::Repo;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Find repository root by walking up from cwd to find .dvs/
pub fn find_repo_root() -> Result<PathBuf> {
    let current = std::env::current_dir().context("Failed to get current directory")?;
    Repo::find_root(&current)
        .ok_or_else(|| anyhow::anyhow!("Not a dvs repository (no .dvs directory found)"))
}

/// Open the repository around cwd and route Ctrl-C to its interrupt flag
pub fn open_repo() -> Result<Repo> {
    let root = find_repo_root()?;
    let repo = Repo::open(&root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))?;
    register_interrupt(repo.store().interrupt_flag())?;
    Ok(repo)
}

/// The first Ctrl-C sets `flag` so cache work stops between files; a
/// second one terminates immediately.
fn register_interrupt(flag: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&flag))
            .context("Failed to register signal handler")?;
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .context("Failed to register signal handler")?;
    }
    Ok(())
}

/// Make command-line paths absolute against cwd
pub fn absolute_targets(targets: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(targets.iter().map(|t| absolute(&cwd, t)).collect())
}

fn absolute(cwd: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        cwd.join(target)
    }
}

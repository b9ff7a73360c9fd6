//! Make tracked files editable

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// Unprotect every target, reporting failures after all were attempted
pub fn run(targets: &[PathBuf]) -> Result<()> {
    let repo = util::open_repo()?;
    let absolute = util::absolute_targets(targets)?;

    let mut failed = 0;
    for (shown, target) in targets.iter().zip(&absolute) {
        match repo.unprotect(target) {
            Ok(()) => println!("{} {}", "Unprotected".green(), shown.display()),
            Err(e) => {
                failed += 1;
                tracing::debug!(target = %target.display(), error = ?e, "unprotect failed");
                eprintln!("{} failed to unprotect '{}': {}", "error:".red(), shown.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("failed to unprotect {} of {} target(s)", failed, targets.len());
    }
    Ok(())
}

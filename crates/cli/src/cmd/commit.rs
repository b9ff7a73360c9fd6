//! Record the current content of tracked outputs

use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(targets: &[PathBuf]) -> Result<()> {
    let repo = util::open_repo()?;
    let targets = util::absolute_targets(targets)?;

    let committed = repo.commit(&targets).context("Failed to commit")?;
    if committed.is_empty() {
        println!("{}", "Nothing to commit".dimmed());
    }
    for path in committed {
        println!("{} {}", "Committed".green(), path.display());
    }
    Ok(())
}

//! Show tracked outputs and dependencies that changed

use crate::util;
use anyhow::{Context, Result};
use dvs_stage::OutputStatus;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let repo = util::open_repo()?;
    let changed = repo.status().context("Failed to compute status")?;

    if changed.is_empty() {
        println!("{}", "Data and tracking files are up to date".dimmed());
        return Ok(());
    }

    for (stage, changes) in &changed {
        println!("{}:", stage.display().to_string().bold());
        for (path, status) in changes {
            let label = match status {
                OutputStatus::Modified => status.to_string().yellow().to_string(),
                OutputStatus::Deleted => status.to_string().red().to_string(),
                OutputStatus::NotInCache => status.to_string().magenta().to_string(),
            };
            println!("    {}: {}", label, path.display());
        }
    }
    Ok(())
}

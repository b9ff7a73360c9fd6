//! Restore tracked outputs from the cache

use crate::util;
use anyhow::{Context, Result};
use dvs_stage::CheckoutOutcome;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(targets: &[PathBuf]) -> Result<()> {
    let repo = util::open_repo()?;
    let targets = util::absolute_targets(targets)?;

    let outcomes = repo.checkout(&targets).context("Failed to checkout")?;
    let mut missing = 0;
    for (path, outcome) in &outcomes {
        match outcome {
            CheckoutOutcome::Restored => println!("{} {}", "M".yellow().bold(), path.display()),
            CheckoutOutcome::MissingFromCache => {
                missing += 1;
                println!("{} {} {}", "!".red().bold(), path.display(), "(not in cache)".dimmed());
            }
            CheckoutOutcome::Unchanged | CheckoutOutcome::Skipped => {}
        }
    }

    if missing > 0 {
        println!();
        println!(
            "{} {} output(s) missing from the cache, try `dvs pull`",
            "warning:".yellow(),
            missing
        );
    }
    Ok(())
}

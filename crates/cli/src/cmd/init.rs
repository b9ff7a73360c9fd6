//! Initialize dvs in the current directory

use crate::repo::Repo;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::env;

pub fn run(no_scm: bool) -> Result<()> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;

    let repo = Repo::init(&current_dir, no_scm)
        .with_context(|| format!("Failed to initialize dvs in {}", current_dir.display()))?;

    println!("{} Initialized dvs repository", "✓".green());
    println!("  Location: {}", repo.store().dvs_dir().display().to_string().cyan());
    if no_scm {
        println!("  {}", "Source control disabled, `dvs diff` is unavailable".dimmed());
    } else {
        println!();
        println!("Commit the new files to git:");
        println!("  {}", "git add .dvs/config.toml .dvs/.gitignore".cyan());
    }
    Ok(())
}

//! Show tracked outputs that differ between revisions

use crate::diff::{DiffOptions, DiffResult};
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(a_rev: Option<String>, b_rev: Option<String>, show_json: bool, expand_dirs: bool) -> Result<()> {
    let repo = util::open_repo()?;
    let options = DiffOptions {
        a_rev,
        b_rev,
        expand_dirs,
    };
    let result = repo.diff(&options)?;

    if show_json {
        let json = serde_json::to_string(&result).context("Failed to serialize diff")?;
        println!("{}", json);
        return Ok(());
    }
    print_table(&result);
    Ok(())
}

fn print_table(result: &DiffResult) {
    if result.is_empty() {
        println!("{}", "No changes".dimmed());
        return;
    }

    if !result.added.is_empty() {
        println!("{} Added ({})", "A".green().bold(), result.added.len());
        for entry in &result.added {
            println!("  {} {}", "+".green(), entry.path);
        }
        println!();
    }

    if !result.deleted.is_empty() {
        println!("{} Deleted ({})", "D".red().bold(), result.deleted.len());
        for entry in &result.deleted {
            println!("  {} {}", "-".red(), entry.path);
        }
        println!();
    }

    if !result.modified.is_empty() {
        println!("{} Modified ({})", "M".yellow().bold(), result.modified.len());
        for entry in &result.modified {
            println!(
                "  {} {} {}",
                "~".yellow(),
                entry.path,
                format!("{}..{}", short(&entry.hash.old), short(&entry.hash.new)).dimmed()
            );
        }
        println!();
    }

    println!(
        "files summary: {} added, {} deleted, {} modified",
        result.added.len(),
        result.deleted.len(),
        result.modified.len()
    );
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

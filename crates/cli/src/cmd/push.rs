//! Upload cached data to the configured remote

use crate::util;
use anyhow::{Context, Result};
use dvs_core::TransferSummary;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let repo = util::open_repo()?;
    let summary = repo.push().context("Failed to push")?;
    report("pushed", &summary)
}

/// Print a transfer summary, failing if any entry could not be moved
pub(crate) fn report(verb: &str, summary: &TransferSummary) -> Result<()> {
    println!(
        "{} {} {}, {} already up to date",
        "✓".green(),
        summary.transferred,
        verb,
        summary.skipped
    );
    for (checksum, message) in &summary.failed {
        eprintln!("  {} {}: {}", "✗".red(), checksum, message);
    }
    if !summary.is_success() {
        anyhow::bail!("{} file(s) failed to transfer", summary.failed.len());
    }
    Ok(())
}

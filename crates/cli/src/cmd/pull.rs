//! Download missing cache entries from the configured remote

use crate::util;
use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let repo = util::open_repo()?;
    let summary = repo.pull().context("Failed to pull")?;
    super::push::report("pulled", &summary)
}

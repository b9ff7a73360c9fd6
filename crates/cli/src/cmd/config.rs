//! Read or write repository configuration

use crate::util;
use anyhow::{Context, Result};
use dvs_core::{Config, Store};

pub fn run(key: &str, value: Option<&str>) -> Result<()> {
    let root = util::find_repo_root()?;
    let store = Store::open(&root).context("Failed to open repository")?;

    match value {
        Some(value) => {
            Config::set(&store.config_path(), &store.tmp_dir(), key, value)
                .with_context(|| format!("Failed to set {}", key))?;
        }
        None => match Config::get(&store.config_path(), key)? {
            Some(toml::Value::String(s)) => println!("{}", s),
            Some(other) => println!("{}", other),
            None => anyhow::bail!("Unknown config key '{}' (not set in {})", key, store.config_path().display()),
        },
    }
    Ok(())
}

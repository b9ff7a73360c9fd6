//! Project configuration
//!
//! The repository config lives at `.dvs/config.toml`; a system-wide file at
//! `<config dir>/dvs/config.toml` supplies defaults. Repository values win
//! key by key.

use crate::error::{Error, Result};
use crate::hash::SymlinkPolicy;
use crate::link::LinkType;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Worker pool size for hashing and transfers
    pub jobs: usize,

    /// File count above which adding a directory file by file triggers a warning
    pub large_dir_threshold: usize,

    pub symlinks: SymlinkPolicy,

    /// Use the on-disk state index to skip rehashing unchanged files
    pub state: bool,

    /// Repository was initialized without source control
    pub no_scm: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);
        Self {
            jobs,
            large_dir_threshold: 100,
            symlinks: SymlinkPolicy::Follow,
            state: true,
            no_scm: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache location, relative paths resolve against the repository root
    pub dir: PathBuf,

    /// Link strategies in preference order
    #[serde(rename = "type", deserialize_with = "link_types_from_str_or_list")]
    pub link_types: Vec<LinkType>,

    /// Keep working-tree files read-only even for reflink/copy
    pub protected: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".dvs/cache"),
            link_types: vec![LinkType::Reflink, LinkType::Copy],
            protected: false,
        }
    }
}

impl CacheConfig {
    /// Whether linked-out files must be protected
    pub fn effective_protected(&self) -> bool {
        self.protected || self.link_types.iter().any(|t| t.requires_protection())
    }
}

/// Accepts `type = "reflink,copy"` as well as `type = ["reflink", "copy"]`
fn link_types_from_str_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<LinkType>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<LinkType>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::One(s) => s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| part.parse().map_err(serde::de::Error::custom))
            .collect(),
        Raw::Many(types) => Ok(types),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory used as the default remote
    pub url: Option<String>,
}

/// Location of the system-wide config file
pub fn system_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dvs").join("config.toml"))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    match fs::read_to_string(path) {
        Ok(content) => content.parse::<toml::Table>().map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(toml::Table::new()),
        Err(e) => Err(Error::io(path)(e)),
    }
}

/// Recursively overlay `top` onto `base`
fn merge(base: &mut toml::Table, top: toml::Table) {
    for (key, value) in top {
        match value {
            toml::Value::Table(top_table) => match base.get_mut(&key) {
                Some(toml::Value::Table(base_table)) => merge(base_table, top_table),
                _ => {
                    base.insert(key, toml::Value::Table(top_table));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

impl Config {
    /// Load the repository config at `repo_config`, layered over the system config
    pub fn load(repo_config: &Path) -> Result<Self> {
        Self::load_from(system_config_path().as_deref(), repo_config)
    }

    pub fn load_from(system_config: Option<&Path>, repo_config: &Path) -> Result<Self> {
        let mut table = match system_config {
            Some(path) => read_table(path)?,
            None => toml::Table::new(),
        };
        merge(&mut table, read_table(repo_config)?);

        let config: Config = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config {
                path: repo_config.to_path_buf(),
                message: e.to_string(),
            })?;
        if config.core.jobs == 0 {
            return Err(Error::Config {
                path: repo_config.to_path_buf(),
                message: "core.jobs must be at least 1".into(),
            });
        }
        tracing::debug!(path = %repo_config.display(), "loaded config");
        Ok(config)
    }

    /// Read a dotted key (`section.name`) from a config file
    pub fn get(config_path: &Path, key: &str) -> Result<Option<toml::Value>> {
        let (section, name) = split_key(config_path, key)?;
        let table = read_table(config_path)?;
        Ok(table
            .get(section)
            .and_then(|s| s.as_table())
            .and_then(|s| s.get(name))
            .cloned())
    }

    /// Set a dotted key in a config file, rejecting values that would make
    /// the file unloadable.
    pub fn set(config_path: &Path, tmp_dir: &Path, key: &str, raw_value: &str) -> Result<()> {
        let (section, name) = split_key(config_path, key)?;
        let mut table = read_table(config_path)?;

        let value = parse_value(raw_value);
        let section_table = table
            .entry(section.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        let Some(section_table) = section_table.as_table_mut() else {
            return Err(Error::Config {
                path: config_path.to_path_buf(),
                message: format!("'{}' is not a section", section),
            });
        };
        section_table.insert(name.to_string(), value);

        // Validate before writing
        let _: Config = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config {
                path: config_path.to_path_buf(),
                message: format!("invalid value for {}: {}", key, e),
            })?;

        let content = toml::to_string_pretty(&table).map_err(|e| Error::Config {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;
        crate::store::atomic_write(tmp_dir, config_path, content.as_bytes())
    }
}

fn split_key<'a>(config_path: &Path, key: &'a str) -> Result<(&'a str, &'a str)> {
    key.split_once('.')
        .filter(|(section, name)| !section.is_empty() && !name.is_empty())
        .ok_or_else(|| Error::Config {
            path: config_path.to_path_buf(),
            message: format!("key '{}' must look like section.name", key),
        })
}

/// Interpret a command-line value as a TOML literal, falling back to a string
fn parse_value(raw: &str) -> toml::Value {
    let wrapped = format!("v = {}", raw);
    match wrapped.parse::<toml::Table>() {
        Ok(mut table) => table
            .remove("v")
            .unwrap_or_else(|| toml::Value::String(raw.to_string())),
        Err(_) => toml::Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_files_missing() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let config = Config::load_from(None, &temp_dir.path().join("config.toml"))?;
        assert_eq!(config.cache.dir, PathBuf::from(".dvs/cache"));
        assert_eq!(config.cache.link_types, vec![LinkType::Reflink, LinkType::Copy]);
        assert_eq!(config.core.large_dir_threshold, 100);
        assert!(config.core.jobs >= 1 && config.core.jobs <= 8);
        assert!(config.core.state);
        assert!(!config.cache.effective_protected());
        Ok(())
    }

    #[test]
    fn test_repo_overrides_system() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let system = temp_dir.path().join("system.toml");
        let repo = temp_dir.path().join("repo.toml");
        fs::write(&system, "[core]\njobs = 2\nlarge_dir_threshold = 7\n[cache]\ntype = \"hardlink\"\n")?;
        fs::write(&repo, "[core]\njobs = 3\n")?;

        let config = Config::load_from(Some(&system), &repo)?;
        assert_eq!(config.core.jobs, 3);
        assert_eq!(config.core.large_dir_threshold, 7);
        assert_eq!(config.cache.link_types, vec![LinkType::Hardlink]);
        assert!(config.cache.effective_protected());
        Ok(())
    }

    #[test]
    fn test_link_type_list_forms() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let repo = temp_dir.path().join("repo.toml");

        fs::write(&repo, "[cache]\ntype = \"reflink, symlink\"\n")?;
        let config = Config::load_from(None, &repo)?;
        assert_eq!(config.cache.link_types, vec![LinkType::Reflink, LinkType::Symlink]);

        fs::write(&repo, "[cache]\ntype = [\"copy\"]\n")?;
        let config = Config::load_from(None, &repo)?;
        assert_eq!(config.cache.link_types, vec![LinkType::Copy]);

        fs::write(&repo, "[cache]\ntype = \"junction\"\n")?;
        assert!(matches!(Config::load_from(None, &repo), Err(Error::Config { .. })));
        Ok(())
    }

    #[test]
    fn test_get_and_set() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let repo = temp_dir.path().join("config.toml");
        let tmp = temp_dir.path().join("tmp");

        Config::set(&repo, &tmp, "core.jobs", "5")?;
        Config::set(&repo, &tmp, "remote.url", "/srv/dvs-remote")?;
        Config::set(&repo, &tmp, "cache.type", "hardlink,copy")?;

        assert_eq!(Config::get(&repo, "core.jobs")?, Some(toml::Value::Integer(5)));
        assert_eq!(
            Config::get(&repo, "remote.url")?,
            Some(toml::Value::String("/srv/dvs-remote".into()))
        );
        assert_eq!(Config::get(&repo, "core.missing")?, None);

        let config = Config::load_from(None, &repo)?;
        assert_eq!(config.core.jobs, 5);
        assert_eq!(config.cache.link_types, vec![LinkType::Hardlink, LinkType::Copy]);
        Ok(())
    }

    #[test]
    fn test_set_rejects_invalid_values() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let repo = temp_dir.path().join("config.toml");
        let tmp = temp_dir.path().join("tmp");

        assert!(Config::set(&repo, &tmp, "core.jobs", "many").is_err());
        assert!(Config::set(&repo, &tmp, "nodot", "1").is_err());
        assert!(!repo.exists());
        Ok(())
    }
}

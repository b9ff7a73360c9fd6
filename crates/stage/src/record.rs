//! Persisted form of a stage (the `.dvs` tracking file)
//!
//! Paths in a record are relative to the directory holding the tracking
//! file and always use `/` separators, so records compare equal across
//! platforms and revisions.

use crate::dependency::{ParamsInfo, DEFAULT_PARAMS_FILE};
use crate::error::{Result, StageError};
use dvs_core::hash::Checksum;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outs: Vec<OutRecord>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

fn default_params_path() -> String {
    DEFAULT_PARAMS_FILE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<Checksum>,
    #[serde(default = "default_true")]
    pub cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepRecord {
    Params {
        #[serde(default = "default_params_path")]
        path: String,
        params: ParamsRecord,
    },
    Path {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        md5: Option<Checksum>,
    },
}

/// Parameter keys before the first save, key/value pairs after
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamsRecord {
    Keys(Vec<String>),
    Values(ParamsInfo),
}

impl StageRecord {
    pub fn from_yaml(path: &Path, bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(bytes).map_err(|e| StageError::BadRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn to_yaml(&self, path: &Path) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| StageError::BadRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Join a record path onto the tracking file's directory, resolving `..`
pub fn resolve(stage_dir: &Path, record_path: &str, record_file: &Path) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in stage_dir.join(record_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(StageError::BadRecord {
                        path: record_file.to_path_buf(),
                        message: format!("'{}' points outside the repository", record_path),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StageError::BadRecord {
                    path: record_file.to_path_buf(),
                    message: format!("'{}' must be a relative path", record_path),
                })
            }
        }
    }
    Ok(resolved)
}

/// Express repository-relative `path` relative to `stage_dir`, with `/` separators
pub fn relative_to(stage_dir: &Path, path: &Path) -> String {
    let base: Vec<Component> = stage_dir.components().collect();
    let target: Vec<Component> = path.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); base.len() - common];
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

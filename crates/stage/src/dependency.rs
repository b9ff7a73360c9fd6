//! Stage dependencies: plain paths and parameter sets

use crate::error::{Result, StageError};
use crate::output::OutputStatus;
use dvs_core::hash::Checksum;
use dvs_core::Store;
use indexmap::IndexMap;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Definition file used when a parameter spec names no file
pub const DEFAULT_PARAMS_FILE: &str = "params.yaml";

/// Values read for a set of parameter keys, in declaration order
pub type ParamsInfo = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    Path(PathDependency),
    Params(ParamsDependency),
}

/// A file or directory the stage reads
#[derive(Debug, Clone, PartialEq)]
pub struct PathDependency {
    /// Repository-relative path
    pub path: PathBuf,
    pub checksum: Option<Checksum>,
}

/// Selected keys of a structured parameter file
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsDependency {
    /// Repository-relative path of the definition file
    pub path: PathBuf,
    pub params: Vec<String>,
    /// Values recorded at the last save
    pub info: ParamsInfo,
}

impl Dependency {
    pub fn path(&self) -> &Path {
        match self {
            Dependency::Path(dep) => &dep.path,
            Dependency::Params(dep) => &dep.path,
        }
    }

    /// Refresh the recorded snapshot from the working tree
    pub fn save(&mut self, store: &Store) -> Result<()> {
        match self {
            Dependency::Path(dep) => dep.save(store),
            Dependency::Params(dep) => dep.save(store.root()),
        }
    }

    pub fn status(&self, store: &Store) -> Result<Option<OutputStatus>> {
        match self {
            Dependency::Path(dep) => dep.status(store),
            Dependency::Params(dep) => dep.status(store.root()),
        }
    }
}

impl PathDependency {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            checksum: None,
        }
    }

    fn compute(&self, store: &Store) -> Result<Checksum> {
        let abs = store.root().join(&self.path);
        if !abs.exists() {
            return Err(StageError::DependencyMissing {
                path: self.path.clone(),
            });
        }
        Ok(store.engine().hash_path(&abs)?.0)
    }

    pub fn save(&mut self, store: &Store) -> Result<()> {
        self.checksum = Some(self.compute(store)?);
        Ok(())
    }

    pub fn status(&self, store: &Store) -> Result<Option<OutputStatus>> {
        match self.compute(store) {
            Ok(current) if Some(&current) == self.checksum.as_ref() => Ok(None),
            Ok(_) => Ok(Some(OutputStatus::Modified)),
            Err(StageError::DependencyMissing { .. }) => Ok(Some(OutputStatus::Deleted)),
            Err(e) => Err(e),
        }
    }
}

impl ParamsDependency {
    pub fn new(path: PathBuf, params: Vec<String>) -> Self {
        Self {
            path,
            params,
            info: ParamsInfo::new(),
        }
    }

    /// Build from recorded values; the keys are the value keys
    pub fn with_info(path: PathBuf, info: ParamsInfo) -> Self {
        Self {
            path,
            params: info.keys().cloned().collect(),
            info,
        }
    }

    /// Read the current values of the declared keys.
    ///
    /// A missing definition file yields no values; keys absent from the
    /// file are simply left out.
    pub fn read_info(&self, root: &Path) -> Result<ParamsInfo> {
        let abs = root.join(&self.path);
        let content = match fs::read(&abs) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ParamsInfo::new()),
            Err(e) => return Err(dvs_core::Error::io(&abs)(e).into()),
        };
        let document = parse_params_file(&self.path, &content)?;

        let mut info = ParamsInfo::new();
        for key in &self.params {
            if let Some(value) = lookup(&document, key) {
                info.insert(key.clone(), value.clone());
            }
        }
        Ok(info)
    }

    /// Record current values, failing if any declared key is absent
    pub fn save(&mut self, root: &Path) -> Result<()> {
        let info = self.read_info(root)?;
        let missing: Vec<String> = self
            .params
            .iter()
            .filter(|key| !info.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(StageError::MissingParams {
                path: self.path.clone(),
                keys: missing,
            });
        }
        self.info = info;
        Ok(())
    }

    pub fn status(&self, root: &Path) -> Result<Option<OutputStatus>> {
        if !root.join(&self.path).exists() {
            return Ok(Some(OutputStatus::Deleted));
        }
        let current = self.read_info(root)?;
        if current == self.info {
            Ok(None)
        } else {
            Ok(Some(OutputStatus::Modified))
        }
    }
}

/// Parse parameter specs such as `"foo"`, `"bar,baz"` or `"file:qux"`.
///
/// Keys are grouped per definition file in first-seen order; specs without
/// a file name go to [`DEFAULT_PARAMS_FILE`] inside `base_dir`.
pub fn parse_params_specs<S: AsRef<str>>(base_dir: &Path, specs: &[S]) -> Vec<ParamsDependency> {
    let mut grouped: IndexMap<PathBuf, Vec<String>> = IndexMap::new();
    for spec in specs {
        let spec = spec.as_ref();
        let (file, keys) = match spec.split_once(':') {
            Some((file, keys)) => (file, keys),
            None => (DEFAULT_PARAMS_FILE, spec),
        };
        let entry = grouped.entry(base_dir.join(file)).or_default();
        for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !entry.iter().any(|existing| existing == key) {
                entry.push(key.to_string());
            }
        }
    }
    grouped
        .into_iter()
        .map(|(path, params)| ParamsDependency::new(path, params))
        .collect()
}

/// Parse a definition file according to its extension
fn parse_params_file(path: &Path, content: &[u8]) -> Result<Value> {
    let bad = |message: String| StageError::BadParamFile {
        path: path.to_path_buf(),
        message,
    };
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let document: Value = match extension.as_str() {
        "json" => serde_json::from_slice(content).map_err(|e| bad(e.to_string()))?,
        "toml" => {
            let text = std::str::from_utf8(content).map_err(|e| bad(e.to_string()))?;
            toml::from_str(text).map_err(|e| bad(e.to_string()))?
        }
        _ => serde_yaml::from_slice(content).map_err(|e| bad(e.to_string()))?,
    };

    match document {
        Value::Object(_) => Ok(document),
        Value::Null => Ok(Value::Object(Default::default())),
        _ => Err(bad("top level is not a mapping".into())),
    }
}

/// Resolve a dotted key (`some.path.foo`) in a parsed document
fn lookup<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(document, |node, part| node.as_object()?.get(part))
}

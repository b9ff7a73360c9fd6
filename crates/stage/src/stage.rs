//! Stages: a tracking file plus the outputs and dependencies it records

use crate::dependency::{Dependency, ParamsDependency, PathDependency};
use crate::error::{Result, StageError};
use crate::output::{CheckoutOutcome, Output, OutputStatus};
use crate::record::{self, DepRecord, OutRecord, ParamsRecord, StageRecord};
use dvs_core::store::{atomic_write, TRACKING_FILE_SUFFIX};
use dvs_core::Store;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Lifecycle position of a stage within one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageState {
    Defined,
    Saved,
    Committed,
    Dumped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Repository-relative path of the tracking file
    path: PathBuf,
    outs: Vec<Output>,
    deps: Vec<Dependency>,
    locked: bool,
    state: StageState,
}

/// Per-path changes reported by [`Stage::status`]
pub type StageStatus = BTreeMap<PathBuf, OutputStatus>;

/// True if `path` names a tracking file
pub fn is_stage_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.len() > TRACKING_FILE_SUFFIX.len() && name.ends_with(TRACKING_FILE_SUFFIX)
        })
        .unwrap_or(false)
}

impl Stage {
    pub fn new(path: PathBuf, outs: Vec<Output>, deps: Vec<Dependency>) -> Result<Self> {
        if !is_stage_file(&path) {
            return Err(StageError::BadStageFilename { path });
        }
        Ok(Self {
            path,
            outs,
            deps,
            locked: false,
            state: StageState::Defined,
        })
    }

    /// Stage tracking a single cached output.
    ///
    /// The tracking file defaults to `<out>.dvs` next to the output; an
    /// explicit `fname` is placed in the output's directory.
    pub fn create(out: &Path, fname: Option<&Path>) -> Result<Self> {
        let out = dvs_core::store::normalize_path(out)?;
        let dir = out.parent().map(Path::to_path_buf).unwrap_or_default();
        let path = match fname {
            Some(fname) => dir.join(fname),
            None => {
                let mut name = out.as_os_str().to_os_string();
                name.push(TRACKING_FILE_SUFFIX);
                PathBuf::from(name)
            }
        };
        Self::new(path, vec![Output::new(out, true)], Vec::new())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the tracking file, relative to the repository root
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn outs(&self) -> &[Output] {
        &self.outs
    }

    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Recompute every output checksum and dependency snapshot
    pub fn save(&mut self, store: &Store) -> Result<()> {
        for dep in &mut self.deps {
            dep.save(store)?;
        }
        for out in &mut self.outs {
            out.save(store)?;
        }
        self.state = StageState::Saved;
        Ok(())
    }

    /// Ingest and link every cached output
    pub fn commit(&mut self, store: &Store) -> Result<()> {
        for out in &self.outs {
            out.commit(store)?;
        }
        self.state = StageState::Committed;
        Ok(())
    }

    /// Write the tracking file
    pub fn dump(&mut self, store: &Store) -> Result<()> {
        let yaml = self.to_record().to_yaml(&self.path)?;
        atomic_write(&store.tmp_dir(), &store.root().join(&self.path), yaml.as_bytes())?;
        tracing::debug!(stage = %self.path.display(), "dumped tracking file");
        self.state = StageState::Dumped;
        Ok(())
    }

    pub fn to_record(&self) -> StageRecord {
        let dir = self.dir();
        let deps = self
            .deps
            .iter()
            .map(|dep| match dep {
                Dependency::Path(dep) => DepRecord::Path {
                    path: record::relative_to(dir, &dep.path),
                    md5: dep.checksum.clone(),
                },
                Dependency::Params(dep) => DepRecord::Params {
                    path: record::relative_to(dir, &dep.path),
                    params: if dep.info.is_empty() {
                        ParamsRecord::Keys(dep.params.clone())
                    } else {
                        ParamsRecord::Values(dep.info.clone())
                    },
                },
            })
            .collect();
        let outs = self
            .outs
            .iter()
            .map(|out| OutRecord {
                path: record::relative_to(dir, out.path()),
                md5: out.checksum().cloned(),
                cache: out.is_cached(),
            })
            .collect();
        StageRecord {
            deps,
            outs,
            locked: self.locked,
        }
    }

    /// Load the tracking file at repository-relative `path`
    pub fn load(store: &Store, path: &Path) -> Result<Self> {
        let abs = store.root().join(path);
        let bytes = fs::read(&abs).map_err(dvs_core::Error::io(&abs))?;
        Self::load_from_bytes(path, &bytes)
    }

    /// Build a stage from tracking-file content, e.g. read at another revision
    pub fn load_from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        if !is_stage_file(path) {
            return Err(StageError::BadStageFilename {
                path: path.to_path_buf(),
            });
        }
        let record = StageRecord::from_yaml(path, bytes)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let mut deps = Vec::with_capacity(record.deps.len());
        for dep in record.deps {
            deps.push(match dep {
                DepRecord::Path { path: dep_path, md5 } => Dependency::Path(PathDependency {
                    path: record::resolve(dir, &dep_path, path)?,
                    checksum: md5,
                }),
                DepRecord::Params {
                    path: def_path,
                    params,
                } => {
                    let def_path = record::resolve(dir, &def_path, path)?;
                    Dependency::Params(match params {
                        ParamsRecord::Keys(keys) => ParamsDependency::new(def_path, keys),
                        ParamsRecord::Values(info) => ParamsDependency::with_info(def_path, info),
                    })
                }
            });
        }

        let mut outs = Vec::with_capacity(record.outs.len());
        for out in record.outs {
            outs.push(Output::with_checksum(
                record::resolve(dir, &out.path, path)?,
                out.md5,
                out.cache,
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            outs,
            deps,
            locked: record.locked,
            state: StageState::Dumped,
        })
    }

    /// Changed outputs and dependencies, keyed by path
    pub fn status(&self, store: &Store) -> Result<StageStatus> {
        let mut status = StageStatus::new();
        for dep in &self.deps {
            if let Some(change) = dep.status(store)? {
                status.insert(dep.path().to_path_buf(), change);
            }
        }
        for out in &self.outs {
            if let Some(change) = out.status(store)? {
                status.insert(out.path().to_path_buf(), change);
            }
        }
        Ok(status)
    }

    /// Restore every cached output from the cache
    pub fn checkout(&self, store: &Store) -> Result<Vec<(PathBuf, CheckoutOutcome)>> {
        self.outs
            .iter()
            .map(|out| Ok((out.path().to_path_buf(), out.checkout(store)?)))
            .collect()
    }
}

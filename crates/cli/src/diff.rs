//! Compare tracked outputs between two revisions
//!
//! A side of the comparison is either a git revision, read from the tracking
//! files committed there, or the working tree, hashed from disk. Directories
//! contribute a single entry keyed by their path plus a trailing separator.

use crate::error::{RepoError, Result};
use crate::repo::Repo;
use dvs_core::hash::Checksum;
use dvs_core::manifest::DirManifest;
use dvs_core::store::to_slash;
use dvs_core::ManifestLookup;
use dvs_stage::Stage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, MAIN_SEPARATOR};
use std::sync::Arc;

/// Revision compared against when none is named
pub const DEFAULT_OLD_REVISION: &str = "HEAD";

/// Tracked paths and their checksums at one point in time
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: BTreeMap<String, Checksum>,
    /// Manifests computed while hashing the working tree
    manifests: HashMap<Checksum, Arc<DirManifest>>,
}

impl Snapshot {
    pub fn entries(&self) -> &BTreeMap<String, Checksum> {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&Checksum> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, path: &Path, checksum: Checksum) {
        let mut key = to_slash(path);
        if checksum.is_dir() {
            key.push(MAIN_SEPARATOR);
        }
        self.entries.insert(key, checksum);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedEntry {
    pub path: String,
    pub hash: HashChange,
}

/// Added, deleted and modified paths, each list sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub added: Vec<DiffEntry>,
    pub deleted: Vec<DiffEntry>,
    pub modified: Vec<ModifiedEntry>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    fn sort(&mut self) {
        self.added.sort_by(|a, b| a.path.cmp(&b.path));
        self.deleted.sort_by(|a, b| a.path.cmp(&b.path));
        self.modified.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Old side; `HEAD` when not set
    pub a_rev: Option<String>,
    /// New side; the working tree when not set
    pub b_rev: Option<String>,
    /// Also report per-file changes inside modified directories
    pub expand_dirs: bool,
}

impl Repo {
    /// Tracked outputs at `rev`, or in the working tree when `rev` is `None`
    pub fn snapshot(&self, rev: Option<&str>) -> Result<Snapshot> {
        if !self.scm().is_repository_present() {
            return Err(RepoError::NoScm);
        }
        match rev {
            Some(rev) => {
                let resolved = self.scm().resolve(rev)?;
                let stages = self.collect_stages_at(&resolved)?;
                Ok(recorded_snapshot(&stages))
            }
            None => self.working_tree_snapshot(),
        }
    }

    fn working_tree_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        for stage in self.collect_stages()? {
            for out in stage.outs() {
                let abs = self.root().join(out.path());
                if std::fs::symlink_metadata(&abs).is_err() {
                    tracing::debug!(path = %out.path().display(), "output missing from working tree");
                    continue;
                }
                let (checksum, manifest) = self.store().engine().hash_path(&abs)?;
                if let Some(manifest) = manifest {
                    snapshot.manifests.insert(checksum.clone(), Arc::new(manifest));
                }
                snapshot.insert(out.path(), checksum);
            }
        }
        self.store().flush_state()?;
        Ok(snapshot)
    }

    /// Compare two points in time
    pub fn diff(&self, options: &DiffOptions) -> Result<DiffResult> {
        if !self.scm().is_repository_present() {
            return Err(RepoError::NoScm);
        }

        let old = match options.a_rev.as_deref() {
            Some(rev) => self.snapshot(Some(rev))?,
            None if self.scm().has_commits() => self.snapshot(Some(DEFAULT_OLD_REVISION))?,
            None => {
                tracing::debug!("no commits yet, comparing against an empty snapshot");
                Snapshot::default()
            }
        };
        let new = self.snapshot(options.b_rev.as_deref())?;

        let mut result = compare(&old, &new);
        if options.expand_dirs {
            self.expand_dirs(&old, &new, &mut result)?;
        }
        result.sort();
        Ok(result)
    }

    fn manifest_for(&self, snapshot: &Snapshot, checksum: &Checksum) -> Result<Option<Arc<DirManifest>>> {
        if let Some(manifest) = snapshot.manifests.get(checksum) {
            return Ok(Some(Arc::clone(manifest)));
        }
        Ok(match self.store().cache().resolve_manifest(checksum)? {
            ManifestLookup::Found(manifest) => Some(manifest),
            ManifestLookup::Missing => None,
        })
    }

    fn expand_dirs(&self, old: &Snapshot, new: &Snapshot, result: &mut DiffResult) -> Result<()> {
        let modified_dirs: Vec<(String, Checksum, Checksum)> = result
            .modified
            .iter()
            .filter(|entry| entry.path.ends_with(MAIN_SEPARATOR))
            .filter_map(|entry| {
                Some((
                    entry.path.clone(),
                    old.get(&entry.path)?.clone(),
                    new.get(&entry.path)?.clone(),
                ))
            })
            .collect();

        for (dir, old_checksum, new_checksum) in modified_dirs {
            let (Some(before), Some(after)) = (
                self.manifest_for(old, &old_checksum)?,
                self.manifest_for(new, &new_checksum)?,
            ) else {
                tracing::warn!(path = %dir, "directory manifest missing from cache, reporting the directory as a whole");
                continue;
            };

            let changes = before.diff(&after);
            let join = |relpath: &str| format!("{}{}", dir, relpath);
            result.added.extend(changes.added.into_iter().map(|(relpath, md5)| DiffEntry {
                path: join(&relpath),
                hash: md5.to_string(),
            }));
            result.deleted.extend(changes.deleted.into_iter().map(|(relpath, md5)| DiffEntry {
                path: join(&relpath),
                hash: md5.to_string(),
            }));
            result
                .modified
                .extend(changes.modified.into_iter().map(|(relpath, old, new)| ModifiedEntry {
                    path: join(&relpath),
                    hash: HashChange {
                        old: old.to_string(),
                        new: new.to_string(),
                    },
                }));
        }
        Ok(())
    }
}

/// Snapshot from the checksums recorded in tracking files
fn recorded_snapshot(stages: &[Stage]) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for stage in stages {
        for out in stage.outs() {
            if let Some(checksum) = out.checksum() {
                snapshot.insert(out.path(), checksum.clone());
            }
        }
    }
    snapshot
}

fn compare(old: &Snapshot, new: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();
    for (path, new_checksum) in &new.entries {
        match old.entries.get(path) {
            None => result.added.push(DiffEntry {
                path: path.clone(),
                hash: new_checksum.to_string(),
            }),
            Some(old_checksum) if old_checksum != new_checksum => {
                result.modified.push(ModifiedEntry {
                    path: path.clone(),
                    hash: HashChange {
                        old: old_checksum.to_string(),
                        new: new_checksum.to_string(),
                    },
                })
            }
            Some(_) => {}
        }
    }
    for (path, old_checksum) in &old.entries {
        if !new.entries.contains_key(path) {
            result.deleted.push(DiffEntry {
                path: path.clone(),
                hash: old_checksum.to_string(),
            });
        }
    }
    result
}

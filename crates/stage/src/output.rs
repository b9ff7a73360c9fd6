//! Tracked outputs of a stage

use crate::error::{Result, StageError};
use dvs_core::hash::Checksum;
use dvs_core::manifest::DirManifest;
use dvs_core::{Error as CoreError, ManifestLookup, Store};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A path owned by a stage, with the checksum recorded at the last save
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Repository-relative path
    path: PathBuf,
    checksum: Option<Checksum>,
    cache: bool,
    /// Manifest computed by the last save of a directory output
    manifest: Option<Arc<DirManifest>>,
}

/// How an output differs from its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Modified,
    Deleted,
    NotInCache,
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStatus::Modified => "modified",
            OutputStatus::Deleted => "deleted",
            OutputStatus::NotInCache => "not in cache",
        })
    }
}

/// What a checkout did to one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Working tree already matched the record
    Unchanged,
    Restored,
    /// The cache has no entry for the recorded checksum
    MissingFromCache,
    /// Nothing recorded or not cached
    Skipped,
}

impl Output {
    pub fn new(path: PathBuf, cache: bool) -> Self {
        Self {
            path,
            checksum: None,
            cache,
            manifest: None,
        }
    }

    pub fn with_checksum(path: PathBuf, checksum: Option<Checksum>, cache: bool) -> Self {
        Self {
            path,
            checksum,
            cache,
            manifest: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    pub fn is_cached(&self) -> bool {
        self.cache
    }

    /// True when the recorded checksum is a directory checksum
    pub fn is_dir(&self) -> bool {
        self.checksum.as_ref().map(Checksum::is_dir).unwrap_or(false)
    }

    pub fn abs_path(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }

    /// Hash the working-tree content, with the manifest for directories
    fn compute(&self, store: &Store) -> Result<(Checksum, Option<DirManifest>)> {
        let abs = self.abs_path(store.root());
        if fs::symlink_metadata(&abs).is_err() {
            return Err(StageError::OutputMissing {
                path: self.path.clone(),
            });
        }
        store.engine().hash_path(&abs).map_err(|e| {
            if e.is_not_found() {
                StageError::OutputMissing {
                    path: self.path.clone(),
                }
            } else {
                e.into()
            }
        })
    }

    /// Recompute the checksum from the working tree
    pub fn save(&mut self, store: &Store) -> Result<()> {
        let (checksum, manifest) = self.compute(store)?;
        tracing::debug!(path = %self.path.display(), %checksum, "saved output");
        self.checksum = Some(checksum);
        self.manifest = manifest.map(Arc::new);
        Ok(())
    }

    /// Move the saved content into the cache and link it back into place
    pub fn commit(&self, store: &Store) -> Result<()> {
        let checksum = self.checksum.as_ref().ok_or_else(|| StageError::OutputNotSaved {
            path: self.path.clone(),
        })?;
        if !self.cache {
            return Ok(());
        }

        let cache = store.cache();
        let abs = self.abs_path(store.root());
        if checksum.is_dir() {
            let manifest = match &self.manifest {
                Some(manifest) => Arc::clone(manifest),
                None => {
                    let (current, manifest) = store.engine().hash_dir(&abs)?;
                    if &current != checksum {
                        return Err(CoreError::ChecksumMismatch {
                            path: abs,
                            expected: checksum.to_string(),
                            found: current.to_string(),
                        }
                        .into());
                    }
                    Arc::new(manifest)
                }
            };
            cache.ingest_dir(&abs, checksum, &manifest)?;
            cache.linkout_dir(checksum, &abs)?;
        } else {
            cache.ingest(&abs, checksum)?;
            cache.linkout(checksum, &abs)?;
        }
        tracing::debug!(path = %self.path.display(), %checksum, "committed output");
        Ok(())
    }

    /// Compare the working tree and cache against the record
    pub fn status(&self, store: &Store) -> Result<Option<OutputStatus>> {
        let Some(recorded) = &self.checksum else {
            return Ok(Some(OutputStatus::Modified));
        };

        let current = match self.compute(store) {
            Ok((current, _)) => current,
            Err(StageError::OutputMissing { .. }) => return Ok(Some(OutputStatus::Deleted)),
            Err(e) => return Err(e),
        };
        if &current != recorded {
            return Ok(Some(OutputStatus::Modified));
        }
        if self.cache && !self.in_cache(store, recorded)? {
            return Ok(Some(OutputStatus::NotInCache));
        }
        Ok(None)
    }

    fn in_cache(&self, store: &Store, checksum: &Checksum) -> Result<bool> {
        let cache = store.cache();
        if !checksum.is_dir() {
            return Ok(cache.contains(checksum));
        }
        Ok(match cache.resolve_manifest(checksum)? {
            ManifestLookup::Found(manifest) => {
                manifest.entries().iter().all(|e| cache.contains(&e.md5))
            }
            ManifestLookup::Missing => false,
        })
    }

    /// Restore the recorded content from the cache
    pub fn checkout(&self, store: &Store) -> Result<CheckoutOutcome> {
        let Some(checksum) = &self.checksum else {
            return Ok(CheckoutOutcome::Skipped);
        };
        if !self.cache {
            return Ok(CheckoutOutcome::Skipped);
        }

        if let Ok((current, _)) = self.compute(store) {
            if &current == checksum {
                return Ok(CheckoutOutcome::Unchanged);
            }
        }
        if !self.in_cache(store, checksum)? {
            tracing::warn!(path = %self.path.display(), %checksum, "cache entry missing, skipping checkout");
            return Ok(CheckoutOutcome::MissingFromCache);
        }

        let cache = store.cache();
        let abs = self.abs_path(store.root());
        if checksum.is_dir() {
            if abs.is_file() {
                fs::remove_file(&abs).map_err(CoreError::io(&abs))?;
            }
            cache.linkout_dir(checksum, &abs)?;
            if let ManifestLookup::Found(manifest) = cache.resolve_manifest(checksum)? {
                remove_untracked(store, &abs, &manifest)?;
            }
        } else {
            cache.linkout(checksum, &abs)?;
        }
        tracing::info!(path = %self.path.display(), "checked out");
        Ok(CheckoutOutcome::Restored)
    }
}

/// Delete files under `dir` that are not listed in `manifest`
fn remove_untracked(store: &Store, dir: &Path, manifest: &DirManifest) -> Result<()> {
    let listed: HashSet<&str> = manifest.entries().iter().map(|e| e.relpath.as_str()).collect();
    for (relpath, abs) in store.engine().collect_files(dir)? {
        if !listed.contains(relpath.as_str()) {
            tracing::debug!(path = %abs.display(), "removing file not in recorded directory");
            fs::remove_file(&abs).map_err(CoreError::io(&abs))?;
        }
    }
    Ok(())
}

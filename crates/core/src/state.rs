//! Path-level index of previously computed file checksums
//!
//! Keyed by path and validated against `(size, mtime, inode)`; any mismatch
//! is treated as a miss, so the index can only save work, never change a result.

use crate::error::{Error, Result};
use crate::hash::Checksum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StateEntry {
    size: u64,
    mtime_ns: u64,
    inode: u64,
    md5: Checksum,
}

impl StateEntry {
    fn matches(&self, stat: &(u64, u64, u64)) -> bool {
        (self.size, self.mtime_ns, self.inode) == *stat
    }
}

fn stat_key(meta: &Metadata) -> (u64, u64, u64) {
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    #[cfg(unix)]
    let inode = std::os::unix::fs::MetadataExt::ino(meta);
    #[cfg(not(unix))]
    let inode = 0;
    (meta.len(), mtime_ns, inode)
}

/// On-disk state index stored as JSON
pub struct StateIndex {
    path: PathBuf,
    entries: Mutex<HashMap<String, StateEntry>>,
    dirty: AtomicBool,
}

impl StateIndex {
    /// Load the index at `path`. A missing or unreadable index starts empty.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding corrupt state index");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    /// Checksum recorded for `path` if its stat info is unchanged
    pub fn get(&self, path: &Path, meta: &Metadata) -> Option<Checksum> {
        let stat = stat_key(meta);
        let entries = self.entries.lock();
        entries
            .get(path.to_string_lossy().as_ref())
            .filter(|entry| entry.matches(&stat))
            .map(|entry| entry.md5.clone())
    }

    pub fn insert(&self, path: &Path, meta: &Metadata, md5: Checksum) {
        let (size, mtime_ns, inode) = stat_key(meta);
        self.entries.lock().insert(
            path.to_string_lossy().into_owned(),
            StateEntry {
                size,
                mtime_ns,
                inode,
                md5,
            },
        );
        self.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the index if anything changed since it was loaded
    pub fn save(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let data = serde_json::to_vec(&*self.entries.lock())?;
        let tmp_dir = self
            .path
            .parent()
            .map(|p| p.join("tmp"))
            .ok_or_else(|| Error::InvalidPath {
                path: self.path.clone(),
                reason: "state index has no parent directory",
            })?;
        crate::store::atomic_write(&tmp_dir, &self.path, &data)
    }
}

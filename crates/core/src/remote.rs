//! Synchronizing cache entries with a remote backend

use crate::cache::{Cache, ManifestLookup};
use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::link;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// A place cache entries can be copied to and from
pub trait Remote: Send + Sync {
    fn exists(&self, checksum: &Checksum) -> Result<bool>;
    /// Upload the cache file at `src` as `checksum`
    fn push(&self, checksum: &Checksum, src: &Path) -> Result<()>;
    fn pull(&self, checksum: &Checksum) -> Result<Vec<u8>>;
}

/// A remote that is a plain directory using the cache's sharded layout
pub struct LocalRemote {
    root: PathBuf,
}

impl LocalRemote {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn entry_path(&self, checksum: &Checksum) -> PathBuf {
        let s = checksum.as_str();
        self.root.join(&s[..2]).join(&s[2..])
    }
}

impl Remote for LocalRemote {
    fn exists(&self, checksum: &Checksum) -> Result<bool> {
        Ok(self.entry_path(checksum).is_file())
    }

    fn push(&self, checksum: &Checksum, src: &Path) -> Result<()> {
        let dest = self.entry_path(checksum);
        let tmp_dir = self.root.join(".tmp");
        fs::create_dir_all(&tmp_dir).map_err(Error::io(&tmp_dir))?;
        let temp_path = tmp_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), checksum));

        link::copy_file(src, &temp_path).map_err(Error::io(src))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        if let Err(e) = fs::rename(&temp_path, &dest) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(&dest)(e));
        }
        Ok(())
    }

    fn pull(&self, checksum: &Checksum) -> Result<Vec<u8>> {
        let path = self.entry_path(checksum);
        fs::read(&path).map_err(|e| Error::Remote {
            message: format!("cannot read {} from {}: {}", checksum, self.root.display(), e),
        })
    }
}

/// Counts from one push or pull
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub transferred: usize,
    /// Entries already present on the receiving side
    pub skipped: usize,
    pub failed: Vec<(Checksum, String)>,
}

impl TransferSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(mut self, other: TransferSummary) -> Self {
        self.transferred += other.transferred;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
        self
    }

    fn failure(checksum: &Checksum, message: String) -> Self {
        Self {
            failed: vec![(checksum.clone(), message)],
            ..Default::default()
        }
    }
}

/// Expand directory checksums into their file checksums, keeping the
/// directory entries themselves.
fn expand(cache: &Cache, checksums: &[Checksum], summary: &mut TransferSummary) -> Result<Vec<Checksum>> {
    let mut all = Vec::new();
    for checksum in checksums {
        all.push(checksum.clone());
        if !checksum.is_dir() {
            continue;
        }
        match cache.resolve_manifest(checksum)? {
            ManifestLookup::Found(manifest) => {
                all.extend(manifest.entries().iter().map(|e| e.md5.clone()));
            }
            ManifestLookup::Missing => summary
                .failed
                .push((checksum.clone(), "directory manifest is not in the cache".into())),
        }
    }
    all.sort();
    all.dedup();
    Ok(all)
}

/// Upload every entry in `checksums` that the remote does not already have
pub fn push(
    cache: &Cache,
    remote: &dyn Remote,
    checksums: &[Checksum],
    pool: &rayon::ThreadPool,
) -> Result<TransferSummary> {
    let mut summary = TransferSummary::default();
    let all = expand(cache, checksums, &mut summary)?;

    let outcome = pool.install(|| {
        all.par_iter()
            .map(|checksum| {
                if !cache.contains(checksum) {
                    return TransferSummary::failure(checksum, "missing from the local cache".into());
                }
                match remote.exists(checksum) {
                    Ok(true) => TransferSummary {
                        skipped: 1,
                        ..Default::default()
                    },
                    Ok(false) => match remote.push(checksum, &cache.path_for(checksum)) {
                        Ok(()) => TransferSummary {
                            transferred: 1,
                            ..Default::default()
                        },
                        Err(e) => TransferSummary::failure(checksum, e.to_string()),
                    },
                    Err(e) => TransferSummary::failure(checksum, e.to_string()),
                }
            })
            .reduce(TransferSummary::default, TransferSummary::merge)
    });

    let summary = summary.merge(outcome);
    tracing::info!(
        transferred = summary.transferred,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "push finished"
    );
    Ok(summary)
}

/// Download every entry in `checksums` missing from the local cache.
///
/// Directory manifests are fetched first so their files can be listed.
pub fn pull(
    cache: &Cache,
    remote: &dyn Remote,
    checksums: &[Checksum],
    pool: &rayon::ThreadPool,
) -> Result<TransferSummary> {
    let mut summary = TransferSummary::default();

    for checksum in checksums.iter().filter(|c| c.is_dir()) {
        if cache.contains(checksum) {
            continue;
        }
        let fetched = remote
            .pull(checksum)
            .and_then(|bytes| cache.ingest_bytes(&bytes, checksum));
        match fetched {
            Ok(_) => {
                cache.invalidate(checksum);
                summary.transferred += 1;
            }
            Err(e) => summary.failed.push((checksum.clone(), e.to_string())),
        }
    }

    let all: Vec<Checksum> = expand(cache, checksums, &mut TransferSummary::default())?
        .into_iter()
        .filter(|c| !c.is_dir())
        .collect();

    let outcome = pool.install(|| {
        all.par_iter()
            .map(|checksum| {
                if cache.contains(checksum) {
                    return TransferSummary {
                        skipped: 1,
                        ..Default::default()
                    };
                }
                match remote
                    .pull(checksum)
                    .and_then(|bytes| cache.ingest_bytes(&bytes, checksum))
                {
                    Ok(_) => TransferSummary {
                        transferred: 1,
                        ..Default::default()
                    },
                    Err(e) => TransferSummary::failure(checksum, e.to_string()),
                }
            })
            .reduce(TransferSummary::default, TransferSummary::merge)
    });

    let summary = summary.merge(outcome);
    tracing::info!(
        transferred = summary.transferred,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "pull finished"
    );
    Ok(summary)
}

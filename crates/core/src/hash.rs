//! MD5 checksums for files and directory trees

use crate::error::{Error, Result};
use crate::manifest::{DirManifest, ManifestEntry};
use crate::state::StateIndex;
use md5::{Digest, Md5};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Suffix that marks a checksum as the digest of a directory manifest.
pub const DIR_SUFFIX: &str = ".dir";

/// Files larger than this are hashed through a memory map.
const MMAP_THRESHOLD: u64 = 4 * 1024 * 1024;

/// A content identifier: lowercase hex MD5, optionally tagged with [`DIR_SUFFIX`].
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Checksum of a file from its raw digest
    pub fn from_digest(digest: [u8; 16]) -> Self {
        Self(hex::encode(digest))
    }

    /// Checksum of a directory from the digest of its manifest
    pub fn dir_from_digest(digest: [u8; 16]) -> Self {
        Self(format!("{}{}", hex::encode(digest), DIR_SUFFIX))
    }

    /// Parse and validate a checksum string
    pub fn parse(value: &str) -> Result<Self> {
        let hex_part = value.strip_suffix(DIR_SUFFIX).unwrap_or(value);
        let valid = hex_part.len() == 32
            && hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(Error::InvalidChecksum {
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this is the checksum of a directory manifest
    pub fn is_dir(&self) -> bool {
        self.0.ends_with(DIR_SUFFIX)
    }

    /// The hex digest without the directory suffix
    pub fn hex(&self) -> &str {
        self.0.strip_suffix(DIR_SUFFIX).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for Checksum {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Checksum::parse(&value)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.0
    }
}

impl std::str::FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Checksum::parse(s)
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checksum({})", self.0)
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash bytes
pub fn hash_bytes(data: &[u8]) -> Checksum {
    Checksum::from_digest(Md5::digest(data).into())
}

/// Hash a file, streaming its contents
pub fn hash_file(path: &Path) -> Result<Checksum> {
    let file = File::open(path).map_err(Error::io(path))?;
    let len = file.metadata().map_err(Error::io(path))?.len();
    if len > MMAP_THRESHOLD {
        return hash_file_mmap(path);
    }

    let mut reader = BufReader::new(file);
    let mut hasher = IncrementalHasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(Error::io(path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize())
}

/// Hash a file using memory-mapped I/O
pub fn hash_file_mmap(path: &Path) -> Result<Checksum> {
    use memmap2::Mmap;

    let file = File::open(path).map_err(Error::io(path))?;
    // SAFETY: the mapping is read-only and dropped before returning; a concurrent
    // writer can at worst produce a checksum for torn content, which the next
    // save will correct.
    let mmap = unsafe { Mmap::map(&file) }.map_err(Error::io(path))?;
    Ok(hash_bytes(&mmap))
}

/// Incremental hasher for building checksums across multiple chunks
pub struct IncrementalHasher {
    inner: Md5,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Checksum {
        Checksum::from_digest(self.inner.finalize().into())
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with symlinks found inside a directory being hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Hash the file the link points at
    #[default]
    Follow,
    /// Fail the hash
    Reject,
}

/// True for paths that never take part in a directory checksum: the `.dvs`
/// and `.git` directories and tracking files.
pub fn is_internal(name: &str) -> bool {
    name == crate::store::DVS_DIR
        || name == ".git"
        || name.ends_with(crate::store::TRACKING_FILE_SUFFIX)
}

/// Computes file and directory checksums.
///
/// Per-file work of a directory hash is spread over a bounded worker pool;
/// results are sorted before the manifest is serialized so enumeration
/// order never affects the checksum.
#[derive(Clone)]
pub struct ChecksumEngine {
    symlinks: SymlinkPolicy,
    pool: Arc<rayon::ThreadPool>,
    state: Option<Arc<StateIndex>>,
}

impl ChecksumEngine {
    pub fn new(symlinks: SymlinkPolicy, pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            symlinks,
            pool,
            state: None,
        }
    }

    /// Consult and refresh `state` when hashing files
    pub fn with_state(mut self, state: Arc<StateIndex>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn state(&self) -> Option<&Arc<StateIndex>> {
        self.state.as_ref()
    }

    /// Hash whatever is at `path`: a file or a directory
    pub fn hash_path(&self, path: &Path) -> Result<(Checksum, Option<DirManifest>)> {
        let meta = std::fs::metadata(path).map_err(Error::io(path))?;
        if meta.is_dir() {
            let (checksum, manifest) = self.hash_dir(path)?;
            Ok((checksum, Some(manifest)))
        } else {
            Ok((self.hash_file(path)?, None))
        }
    }

    /// Hash a single file, reusing the state index when its stat info matches
    pub fn hash_file(&self, path: &Path) -> Result<Checksum> {
        let Some(state) = &self.state else {
            return hash_file(path);
        };
        let meta = std::fs::metadata(path).map_err(Error::io(path))?;
        if let Some(known) = state.get(path, &meta) {
            return Ok(known);
        }
        let checksum = hash_file(path)?;
        state.insert(path, &meta, checksum.clone());
        Ok(checksum)
    }

    /// Hash every regular file under `path` and digest the sorted manifest
    pub fn hash_dir(&self, path: &Path) -> Result<(Checksum, DirManifest)> {
        let files = self.collect_files(path)?;
        tracing::debug!(dir = %path.display(), files = files.len(), "hashing directory");

        let entries = self.pool.install(|| {
            files
                .par_iter()
                .map(|(relpath, abs)| {
                    Ok(ManifestEntry {
                        md5: self.hash_file(abs)?,
                        relpath: relpath.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let manifest = DirManifest::new(entries);
        Ok((manifest.checksum()?, manifest))
    }

    /// Files a directory hash covers, as `(relpath, absolute path)` pairs.
    ///
    /// Follows the same symlink policy and exclusions as [`Self::hash_dir`].
    pub fn collect_files(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let walker = WalkDir::new(root)
            .follow_links(self.symlinks == SymlinkPolicy::Follow)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !is_internal(&entry.file_name().to_string_lossy())
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if entry.path_is_symlink() && self.symlinks == SymlinkPolicy::Reject {
                return Err(Error::SymlinkRejected {
                    path: entry.path().to_path_buf(),
                });
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| Error::InvalidPath {
                    path: entry.path().to_path_buf(),
                    reason: "outside of the directory being hashed",
                })?;
            if rel.to_str().is_none() {
                return Err(Error::InvalidPath {
                    path: entry.into_path(),
                    reason: "file name is not valid UTF-8",
                });
            }
            files.push((crate::store::to_slash(rel), entry.into_path()));
        }
        Ok(files)
    }
}

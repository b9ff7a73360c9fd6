//! Content-addressed cache store
//!
//! Entries live at `<root>/<first two hex chars>/<rest>` and are never
//! modified once written. Working-tree files reference entries through one
//! of the [`LinkType`] strategies; [`Cache::unprotect`] detaches them again.

use crate::error::{Error, Result};
use crate::hash::{hash_bytes, hash_file, Checksum};
use crate::link::{self, LinkType};
use crate::manifest::DirManifest;
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use walkdir::WalkDir;

/// Upper bound on manifests kept in memory before the table is flushed
const MANIFEST_TABLE_CAPACITY: usize = 1024;

/// Outcome of looking up a directory manifest
#[derive(Debug, Clone)]
pub enum ManifestLookup {
    Found(Arc<DirManifest>),
    /// No entry in the cache; callers fall back to whole-directory handling
    Missing,
}

pub struct Cache {
    root: PathBuf,
    /// Link strategies to try, in preference order
    link_types: Vec<LinkType>,
    /// Protect working-tree files even when the strategy does not require it
    protected: bool,
    /// Strategy picked by the first successful linkout
    negotiated: OnceLock<LinkType>,
    /// Parsed manifests (checksum -> manifest)
    manifests: DashMap<Checksum, Arc<DirManifest>>,
    interrupt: Arc<AtomicBool>,
}

impl Cache {
    pub fn new(root: PathBuf, link_types: Vec<LinkType>, protected: bool) -> Self {
        let link_types = if link_types.is_empty() {
            vec![LinkType::Copy]
        } else {
            link_types
        };
        Self {
            root,
            link_types,
            protected,
            negotiated: OnceLock::new(),
            manifests: DashMap::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag checked between individual file operations
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    /// Strategy negotiated for this cache, once a linkout has happened
    pub fn negotiated_link_type(&self) -> Option<LinkType> {
        self.negotiated.get().copied()
    }

    /// Filesystem path of the entry for `checksum`
    pub fn path_for(&self, checksum: &Checksum) -> PathBuf {
        let s = checksum.as_str();
        self.root.join(&s[..2]).join(&s[2..])
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.path_for(checksum).is_file()
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.load(Ordering::Relaxed) {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Copy the file at `src` into the cache under `checksum`.
    ///
    /// A no-op if the entry already exists. The copy is verified against
    /// `checksum` before it is renamed into place.
    pub fn ingest(&self, src: &Path, checksum: &Checksum) -> Result<PathBuf> {
        let dest = self.path_for(checksum);
        if dest.exists() {
            tracing::trace!(%checksum, "cache entry already present");
            return Ok(dest);
        }
        self.check_interrupt()?;

        let tmp_dir = self.tmp_dir();
        fs::create_dir_all(&tmp_dir).map_err(Error::io(&tmp_dir))?;
        let temp_path = tmp_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), checksum));

        // Clone when the filesystem allows it, copy otherwise
        if link::reflink(src, &temp_path).is_err() {
            fs::copy(src, &temp_path).map_err(Error::io(src))?;
        }

        let result = (|| {
            fs::File::open(&temp_path)
                .and_then(|f| f.sync_all())
                .map_err(Error::io(&temp_path))?;
            let found = hash_file(&temp_path)?;
            if found.hex() != checksum.hex() {
                return Err(Error::ChecksumMismatch {
                    path: src.to_path_buf(),
                    expected: checksum.to_string(),
                    found: found.to_string(),
                });
            }
            self.commit_temp(&temp_path, &dest)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        tracing::debug!(%checksum, src = %src.display(), "ingested into cache");
        Ok(dest)
    }

    /// Store raw bytes under `checksum`, verifying them first
    pub fn ingest_bytes(&self, data: &[u8], checksum: &Checksum) -> Result<PathBuf> {
        let dest = self.path_for(checksum);
        if dest.exists() {
            return Ok(dest);
        }

        let found = hash_bytes(data);
        if found.hex() != checksum.hex() {
            return Err(Error::ChecksumMismatch {
                path: dest,
                expected: checksum.to_string(),
                found: found.to_string(),
            });
        }

        let tmp_dir = self.tmp_dir();
        fs::create_dir_all(&tmp_dir).map_err(Error::io(&tmp_dir))?;
        let temp_path = tmp_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), checksum));

        let result = (|| {
            let mut temp_file = fs::File::create(&temp_path).map_err(Error::io(&temp_path))?;
            temp_file.write_all(data).map_err(Error::io(&temp_path))?;
            temp_file.sync_all().map_err(Error::io(&temp_path))?;
            drop(temp_file);
            self.commit_temp(&temp_path, &dest)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;
        Ok(dest)
    }

    /// Mark a verified temp file read-only and rename it to its final name
    fn commit_temp(&self, temp_path: &Path, dest: &Path) -> Result<()> {
        link::set_readonly(temp_path).map_err(Error::io(temp_path))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        fs::rename(temp_path, dest).map_err(Error::io(dest))?;

        // Fsync parent directory for durability
        if let Some(parent) = dest.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all(); // Best effort, may fail on some filesystems
            }
        }
        Ok(())
    }

    /// Ingest every file of a directory, then its manifest
    pub fn ingest_dir(&self, dir: &Path, checksum: &Checksum, manifest: &DirManifest) -> Result<()> {
        for entry in manifest.entries() {
            self.check_interrupt()?;
            self.ingest(&dir.join(&entry.relpath), &entry.md5)?;
        }
        self.ingest_bytes(&manifest.to_canonical_json()?, checksum)?;
        self.remember(checksum.clone(), Arc::new(manifest.clone()));
        Ok(())
    }

    /// Read an entry, verifying its content against the checksum
    pub fn fetch(&self, checksum: &Checksum) -> Result<Vec<u8>> {
        let path = self.path_for(checksum);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingCacheEntry {
                    checksum: checksum.to_string(),
                })
            }
            Err(e) => return Err(Error::io(&path)(e)),
        };

        let actual = hash_bytes(&data);
        if actual.hex() != checksum.hex() {
            return Err(Error::CorruptedCacheEntry {
                checksum: checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    /// Look up a directory manifest by checksum
    pub fn resolve_manifest(&self, checksum: &Checksum) -> Result<ManifestLookup> {
        if let Some(manifest) = self.manifests.get(checksum) {
            return Ok(ManifestLookup::Found(Arc::clone(&manifest)));
        }

        let bytes = match self.fetch(checksum) {
            Ok(bytes) => bytes,
            Err(Error::MissingCacheEntry { .. }) => {
                tracing::debug!(%checksum, "directory manifest not in cache");
                return Ok(ManifestLookup::Missing);
            }
            Err(e) => return Err(e),
        };

        let manifest = Arc::new(DirManifest::from_json(checksum, &bytes)?);
        self.remember(checksum.clone(), Arc::clone(&manifest));
        Ok(ManifestLookup::Found(manifest))
    }

    fn remember(&self, checksum: Checksum, manifest: Arc<DirManifest>) {
        if self.manifests.len() >= MANIFEST_TABLE_CAPACITY {
            self.manifests.clear();
        }
        self.manifests.insert(checksum, manifest);
    }

    /// Drop one manifest from the lookup table
    pub fn invalidate(&self, checksum: &Checksum) {
        self.manifests.remove(checksum);
    }

    /// Drop every manifest from the lookup table
    pub fn clear(&self) {
        self.manifests.clear();
    }

    /// Materialize the entry for `checksum` at `dest`, replacing whatever is there.
    ///
    /// Returns the strategy actually used.
    pub fn linkout(&self, checksum: &Checksum, dest: &Path) -> Result<LinkType> {
        let src = self.path_for(checksum);
        if !src.is_file() {
            return Err(Error::MissingCacheEntry {
                checksum: checksum.to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        remove_existing(dest)?;

        let used = self.link_with_fallback(&src, dest)?;
        if used.requires_protection() || self.protected {
            self.protect(dest)?;
        }
        tracing::trace!(%checksum, dest = %dest.display(), link = %used, "linked out");
        Ok(used)
    }

    fn link_with_fallback(&self, src: &Path, dest: &Path) -> Result<LinkType> {
        if let Some(kind) = self.negotiated.get().copied() {
            match kind.link(src, dest) {
                Ok(()) => return Ok(kind),
                Err(e) if kind != LinkType::Copy => {
                    tracing::warn!(link = %kind, dest = %dest.display(), error = %e, "link failed, copying instead");
                }
                Err(e) => return Err(Error::io(dest)(e)),
            }
        } else {
            for kind in &self.link_types {
                match kind.link(src, dest) {
                    Ok(()) => {
                        let _ = self.negotiated.set(*kind);
                        tracing::debug!(link = %kind, cache = %self.root.display(), "negotiated link type");
                        return Ok(*kind);
                    }
                    Err(e) => {
                        tracing::debug!(link = %kind, error = %e, "link type unsupported");
                    }
                }
            }
            tracing::warn!(cache = %self.root.display(), "no configured link type is supported, falling back to copy");
            let _ = self.negotiated.set(LinkType::Copy);
        }

        LinkType::Copy.link(src, dest).map_err(Error::io(dest))?;
        Ok(LinkType::Copy)
    }

    /// Materialize every file of a cached directory under `dest`.
    ///
    /// Files in `dest` that are not part of the manifest are left alone.
    pub fn linkout_dir(&self, checksum: &Checksum, dest: &Path) -> Result<()> {
        let manifest = match self.resolve_manifest(checksum)? {
            ManifestLookup::Found(manifest) => manifest,
            ManifestLookup::Missing => {
                return Err(Error::MissingCacheEntry {
                    checksum: checksum.to_string(),
                })
            }
        };

        fs::create_dir_all(dest).map_err(Error::io(dest))?;
        for entry in manifest.entries() {
            self.check_interrupt()?;
            self.linkout(&entry.md5, &dest.join(&entry.relpath))?;
        }
        Ok(())
    }

    /// Make a working-tree file (or every file under a directory) read-only
    pub fn protect(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).map_err(Error::io(path))?;
        if meta.file_type().is_symlink() {
            // the target is a read-only cache entry
            return Ok(());
        }
        if meta.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    link::set_readonly(entry.path()).map_err(Error::io(entry.path()))?;
                }
            }
            return Ok(());
        }
        link::set_readonly(path).map_err(Error::io(path))
    }

    /// Detach a working-tree file from the cache so it can be edited.
    ///
    /// Linked files are replaced by a private writable copy; plain files are
    /// made writable; symlinks pointing outside the cache are left alone.
    /// Directories are processed file by file. Calling this on an already
    /// unprotected file does nothing.
    pub fn unprotect(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).map_err(Error::io(path))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(path).map_err(Error::io(path))?;
            let target = match path.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target,
            };
            if !self.is_inside(&target) {
                return Ok(());
            }
            return self.detach(path);
        }

        if meta.is_dir() {
            for entry in WalkDir::new(path).min_depth(1) {
                let entry = entry?;
                let file_type = entry.file_type();
                if file_type.is_file() || file_type.is_symlink() {
                    self.check_interrupt()?;
                    self.unprotect(entry.path())?;
                }
            }
            return Ok(());
        }

        if link::link_count(&meta) > 1 {
            return self.detach(path);
        }
        if link::is_readonly(&meta) {
            link::set_writable(path).map_err(Error::io(path))?;
        }
        Ok(())
    }

    /// Replace `path` with a writable copy of its current content
    fn detach(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.unprotect", name, uuid::Uuid::new_v4()));

        if let Err(e) = link::copy_file(path, &temp_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(path)(e));
        }
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(path)(e));
        }
        tracing::debug!(path = %path.display(), "unprotected");
        Ok(())
    }

    fn is_inside(&self, target: &Path) -> bool {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
        target.starts_with(&root)
    }
}

/// Remove whatever is at `path` so a fresh link can be created there
fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map_err(Error::io(path)),
        Ok(_) => fs::remove_file(path).map_err(Error::io(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;

    fn cache_in(dir: &Path, link_types: Vec<LinkType>) -> Cache {
        Cache::new(dir.join("cache"), link_types, false)
    }

    #[test]
    fn test_ingest_fetch_roundtrip() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let src = temp_dir.path().join("file");
        fs::write(&src, "text")?;
        let checksum = hash_bytes(b"text");

        let entry = cache.ingest(&src, &checksum)?;
        assert_eq!(
            entry,
            temp_dir
                .path()
                .join("cache")
                .join("1c")
                .join("b251ec0d568de6a929b520c4aed8d1")
        );
        assert!(link::is_readonly(&fs::metadata(&entry)?));
        assert_eq!(cache.fetch(&checksum)?, b"text");
        Ok(())
    }

    #[test]
    fn test_ingest_is_deduplicated() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, "same")?;
        fs::write(&b, "same")?;
        let checksum = hash_bytes(b"same");

        let first = cache.ingest(&a, &checksum)?;
        let second = cache.ingest(&b, &checksum)?;
        assert_eq!(first, second);
        assert!(fs::read_dir(cache.root().join(".tmp"))?.next().is_none());
        Ok(())
    }

    #[test]
    fn test_ingest_rejects_wrong_checksum() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let src = temp_dir.path().join("file");
        fs::write(&src, "changed")?;
        let checksum = hash_bytes(b"original");

        let err = cache.ingest(&src, &checksum).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!cache.contains(&checksum));
        Ok(())
    }

    #[test]
    fn test_fetch_missing_and_corrupted() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let checksum = hash_bytes(b"payload");
        assert!(matches!(
            cache.fetch(&checksum),
            Err(Error::MissingCacheEntry { .. })
        ));

        let path = cache.path_for(&checksum);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, "tampered")?;
        assert!(matches!(
            cache.fetch(&checksum),
            Err(Error::CorruptedCacheEntry { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_linkout_strategies() -> anyhow::Result<()> {
        for kind in [LinkType::Copy, LinkType::Hardlink, LinkType::Symlink] {
            let temp_dir = tempfile::tempdir()?;
            let cache = cache_in(temp_dir.path(), vec![kind]);
            let src = temp_dir.path().join("file");
            fs::write(&src, "content")?;
            let checksum = hash_bytes(b"content");
            cache.ingest(&src, &checksum)?;

            let used = cache.linkout(&checksum, &src)?;
            assert_eq!(used, kind);
            assert_eq!(cache.negotiated_link_type(), Some(kind));
            assert_eq!(fs::read_to_string(&src)?, "content");

            let protected = link::is_readonly(&fs::metadata(&src)?);
            assert_eq!(protected, kind.requires_protection(), "{kind}");
        }
        Ok(())
    }

    #[test]
    fn test_linkout_falls_back_to_copy() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Reflink]);
        let src = temp_dir.path().join("file");
        fs::write(&src, "content")?;
        let checksum = hash_bytes(b"content");
        cache.ingest(&src, &checksum)?;

        let used = cache.linkout(&checksum, &src)?;
        assert!(matches!(used, LinkType::Reflink | LinkType::Copy));
        assert_eq!(fs::read_to_string(&src)?, "content");
        assert!(!link::is_readonly(&fs::metadata(&src)?));
        Ok(())
    }

    #[test]
    fn test_linkout_missing_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let err = cache
            .linkout(&hash_bytes(b"nothing"), &temp_dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingCacheEntry { .. }));
    }

    #[test]
    fn test_unprotect_hardlink_is_idempotent() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Hardlink]);
        let file = temp_dir.path().join("file");
        fs::write(&file, "content")?;
        let checksum = hash_bytes(b"content");
        cache.ingest(&file, &checksum)?;
        cache.linkout(&checksum, &file)?;
        assert_eq!(link::link_count(&fs::metadata(&file)?), 2);

        cache.unprotect(&file)?;
        cache.protect(&file)?;
        cache.unprotect(&file)?;
        cache.unprotect(&file)?;

        let meta = fs::metadata(&file)?;
        assert_eq!(link::link_count(&meta), 1);
        assert!(!link::is_readonly(&meta));
        assert_eq!(fs::read_to_string(&file)?, "content");

        // the cache entry is untouched by edits
        fs::write(&file, "edited")?;
        assert_eq!(cache.fetch(&checksum)?, b"content");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_unprotect_symlink_into_cache() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Symlink]);
        let file = temp_dir.path().join("file");
        fs::write(&file, "content")?;
        let checksum = hash_bytes(b"content");
        cache.ingest(&file, &checksum)?;
        cache.linkout(&checksum, &file)?;
        assert!(fs::symlink_metadata(&file)?.file_type().is_symlink());

        cache.unprotect(&file)?;
        let meta = fs::symlink_metadata(&file)?;
        assert!(meta.is_file());
        assert!(!link::is_readonly(&meta));
        assert_eq!(fs::read_to_string(&file)?, "content");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_unprotect_symlink_outside_cache_is_noop() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let target = temp_dir.path().join("target");
        let link_path = temp_dir.path().join("link");
        fs::write(&target, "content")?;
        std::os::unix::fs::symlink(&target, &link_path)?;

        cache.unprotect(&link_path)?;
        assert!(fs::symlink_metadata(&link_path)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn test_unprotect_missing_path_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let err = cache.unprotect(&temp_dir.path().join("absent")).unwrap_err();
        assert!(err.is_not_found());
    }

    fn write_dir(dir: &Path, files: &[(&str, &str)]) -> DirManifest {
        let mut entries = Vec::new();
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            entries.push(ManifestEntry {
                md5: hash_bytes(content.as_bytes()),
                relpath: name.to_string(),
            });
        }
        DirManifest::new(entries)
    }

    #[test]
    fn test_directory_roundtrip_and_unprotect() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Hardlink]);
        let dir = temp_dir.path().join("data");
        let manifest = write_dir(&dir, &[("1", "1"), ("sub/2", "2")]);
        let checksum = manifest.checksum()?;

        cache.ingest_dir(&dir, &checksum, &manifest)?;
        fs::remove_dir_all(&dir)?;
        cache.linkout_dir(&checksum, &dir)?;
        assert_eq!(fs::read_to_string(dir.join("sub").join("2"))?, "2");
        assert!(link::is_readonly(&fs::metadata(dir.join("1"))?));

        cache.unprotect(&dir)?;
        for name in ["1", "sub/2"] {
            let meta = fs::metadata(dir.join(name))?;
            assert_eq!(link::link_count(&meta), 1);
            assert!(!link::is_readonly(&meta));
        }
        Ok(())
    }

    #[test]
    fn test_resolve_manifest_lookup_table() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]);
        let dir = temp_dir.path().join("data");
        let manifest = write_dir(&dir, &[("1", "1"), ("2", "2")]);
        let checksum = manifest.checksum()?;

        assert!(matches!(
            cache.resolve_manifest(&checksum)?,
            ManifestLookup::Missing
        ));

        cache.ingest_dir(&dir, &checksum, &manifest)?;
        match cache.resolve_manifest(&checksum)? {
            ManifestLookup::Found(found) => assert_eq!(*found, manifest),
            ManifestLookup::Missing => panic!("manifest should be cached"),
        }

        // Deleting the entry is only observed once the table is invalidated
        let entry = cache.path_for(&checksum);
        link::set_writable(&entry)?;
        fs::remove_file(&entry)?;
        assert!(matches!(
            cache.resolve_manifest(&checksum)?,
            ManifestLookup::Found(_)
        ));
        cache.invalidate(&checksum);
        assert!(matches!(
            cache.resolve_manifest(&checksum)?,
            ManifestLookup::Missing
        ));

        cache.ingest_dir(&dir, &checksum, &manifest)?;
        cache.clear();
        assert!(matches!(
            cache.resolve_manifest(&checksum)?,
            ManifestLookup::Found(_)
        ));
        Ok(())
    }

    #[test]
    fn test_interrupt_stops_between_files() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let flag = Arc::new(AtomicBool::new(false));
        let cache = cache_in(temp_dir.path(), vec![LinkType::Copy]).with_interrupt(Arc::clone(&flag));
        let dir = temp_dir.path().join("data");
        let manifest = write_dir(&dir, &[("1", "1"), ("2", "2")]);

        flag.store(true, Ordering::Relaxed);
        let err = cache.ingest_dir(&dir, &manifest.checksum()?, &manifest).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert!(!cache.contains(&hash_bytes(b"1")));
        Ok(())
    }
}

//! Directory manifests: the sorted `(relpath, md5)` listing whose canonical
//! serialization is hashed into a directory checksum.

use crate::error::{Error, Result};
use crate::hash::Checksum;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use std::collections::BTreeMap;
use std::io;

/// One file inside a tracked directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub md5: Checksum,
    /// Forward-slash separated path relative to the directory root
    pub relpath: String,
}

/// Listing of every file in a tracked directory, sorted by relative path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirManifest {
    entries: Vec<ManifestEntry>,
}

impl DirManifest {
    pub fn new(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.relpath.cmp(&b.relpath));
        entries.dedup_by(|a, b| a.relpath == b.relpath);
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relpath: &str) -> Option<&Checksum> {
        self.entries
            .binary_search_by(|e| e.relpath.as_str().cmp(relpath))
            .ok()
            .map(|idx| &self.entries[idx].md5)
    }

    /// Canonical byte form stored in the cache and hashed into the checksum
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.entries.len() * 80);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
        self.entries.serialize(&mut ser)?;
        Ok(out)
    }

    pub fn from_json(checksum: &Checksum, bytes: &[u8]) -> Result<Self> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_slice(bytes).map_err(|e| Error::BadManifest {
                checksum: checksum.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(entries))
    }

    pub fn checksum(&self) -> Result<Checksum> {
        let json = self.to_canonical_json()?;
        Ok(Checksum::dir_from_digest(Md5::digest(&json).into()))
    }

    /// Per-file differences from `self` to `other`
    pub fn diff(&self, other: &DirManifest) -> ManifestDiff {
        let old: BTreeMap<&str, &Checksum> = self
            .entries
            .iter()
            .map(|e| (e.relpath.as_str(), &e.md5))
            .collect();
        let new: BTreeMap<&str, &Checksum> = other
            .entries
            .iter()
            .map(|e| (e.relpath.as_str(), &e.md5))
            .collect();

        let mut diff = ManifestDiff::default();
        for (path, new_md5) in &new {
            match old.get(path) {
                None => diff.added.push((path.to_string(), (*new_md5).clone())),
                Some(old_md5) if old_md5 != new_md5 => diff.modified.push((
                    path.to_string(),
                    (*old_md5).clone(),
                    (*new_md5).clone(),
                )),
                Some(_) => {}
            }
        }
        for (path, old_md5) in &old {
            if !new.contains_key(path) {
                diff.deleted.push((path.to_string(), (*old_md5).clone()));
            }
        }
        diff
    }
}

/// Result of comparing two manifests
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub added: Vec<(String, Checksum)>,
    pub deleted: Vec<(String, Checksum)>,
    pub modified: Vec<(String, Checksum, Checksum)>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// JSON layout compatible with existing manifests: `", "` and `": "`
/// separators, everything outside printable ASCII escaped as `\uXXXX`.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

//! Source-control integration for dvs
//!
//! This crate provides:
//! - The [`Scm`] contract the diff engine and `add` rely on
//! - [`Git`], driving the real `git` binary
//! - [`NoScm`] for repositories initialized without source control
//!
//! Paths passed to an [`Scm`] are relative to the dvs repository root.

pub mod git;

pub use git::Git;

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ScmError>;

/// Errors raised by source-control operations
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("unknown revision '{rev}'")]
    UnknownRevision { rev: String },

    #[error("'{path}' is not inside a git repository")]
    NotARepository { path: PathBuf },

    #[error("'{path}' does not exist at revision '{rev}'")]
    NotFound { path: PathBuf, rev: String },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("failed to run git")]
    Spawn(#[source] std::io::Error),

    #[error("i/o error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What dvs needs from a source-control system
pub trait Scm: Send + Sync {
    fn root(&self) -> &Path;

    /// True when source-control metadata exists for the repository
    fn is_repository_present(&self) -> bool;

    /// Resolve a revision name to a commit id
    fn resolve(&self, rev: &str) -> Result<String>;

    /// True if at least one commit exists
    fn has_commits(&self) -> bool {
        self.resolve("HEAD").is_ok()
    }

    /// Content of `path` at a resolved revision
    fn read_file_at(&self, rev: &str, path: &Path) -> Result<Vec<u8>>;

    /// Every file recorded at a resolved revision
    fn list_files_at(&self, rev: &str) -> Result<Vec<PathBuf>>;

    /// True if `path` is part of the index
    fn is_tracked(&self, path: &Path) -> Result<bool>;

    /// True for the source-control system's own files, which dvs never tracks
    fn belongs_to_scm(&self, path: &Path) -> bool;

    /// Keep `path` out of source control
    fn ignore(&self, path: &Path) -> Result<()>;
}

/// Stand-in for repositories without source control
#[derive(Debug, Clone)]
pub struct NoScm {
    root: PathBuf,
}

impl NoScm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn missing(&self) -> ScmError {
        ScmError::NotARepository {
            path: self.root.clone(),
        }
    }
}

impl Scm for NoScm {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_repository_present(&self) -> bool {
        false
    }

    fn resolve(&self, _rev: &str) -> Result<String> {
        Err(self.missing())
    }

    fn read_file_at(&self, _rev: &str, _path: &Path) -> Result<Vec<u8>> {
        Err(self.missing())
    }

    fn list_files_at(&self, _rev: &str) -> Result<Vec<PathBuf>> {
        Err(self.missing())
    }

    fn is_tracked(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn belongs_to_scm(&self, _path: &Path) -> bool {
        false
    }

    fn ignore(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Pick the collaborator for a repository root
pub fn detect(root: &Path) -> Box<dyn Scm> {
    match Git::discover(root) {
        Some(git) => Box::new(git),
        None => {
            tracing::debug!(root = %root.display(), "no git repository found");
            Box::new(NoScm::new(root))
        }
    }
}

use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by hashing, the cache store and repository layout handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("symlink {path} encountered while symlinks are rejected")]
    SymlinkRejected { path: PathBuf },

    #[error("invalid checksum '{value}'")]
    InvalidChecksum { value: String },

    #[error("cache entry {checksum} is missing")]
    MissingCacheEntry { checksum: String },

    #[error("cache entry {checksum} is corrupted: content hashes to {actual}")]
    CorruptedCacheEntry { checksum: String, actual: String },

    #[error("content of {path} changed while it was being cached: expected {expected}, found {found}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("malformed directory manifest {checksum}: {message}")]
    BadManifest { checksum: String, message: String },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("unknown link type '{value}'")]
    UnknownLinkType { value: String },

    #[error("config error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("repository already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("not a dvs repository (missing {path})")]
    NotInitialized { path: PathBuf },

    #[error("remote error: {message}")]
    Remote { message: String },

    #[error("operation interrupted")]
    Interrupted,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Adapter for `map_err` that tags an io error with the path it happened at.
    pub fn io(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
        move |source| Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the error is an io error of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        match err.into_io_error() {
            Some(source) => Error::Io { path, source },
            None => Error::Io {
                path,
                source: io::Error::new(io::ErrorKind::Other, "filesystem loop detected"),
            },
        }
    }
}

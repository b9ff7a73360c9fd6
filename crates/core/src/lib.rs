//! dvs core - checksums and the content-addressed cache
//!
//! This crate provides the storage layer:
//! - MD5 checksums for files and directory manifests
//! - The cache store with link strategies and protect/unprotect
//! - Remote synchronization of cache entries
//! - Repository layout and configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod link;
pub mod manifest;
pub mod remote;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use cache::{Cache, ManifestLookup};
pub use config::Config;
pub use error::{Error, Result};
pub use hash::{Checksum, ChecksumEngine, SymlinkPolicy};
pub use link::LinkType;
pub use manifest::{DirManifest, ManifestDiff, ManifestEntry};
pub use remote::{LocalRemote, Remote, TransferSummary};
pub use store::Store;

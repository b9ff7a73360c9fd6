//! On-disk layout of a dvs repository

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::ChecksumEngine;
use crate::state::StateIndex;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Name of the metadata directory at the repository root
pub const DVS_DIR: &str = ".dvs";

/// Suffix of tracking files
pub const TRACKING_FILE_SUFFIX: &str = ".dvs";

const DEFAULT_CONFIG: &str = r#"# dvs repository configuration
#
# [cache]
# dir = ".dvs/cache"
# type = ["reflink", "copy"]
# protected = false
#
# [core]
# large_dir_threshold = 100
# symlinks = "follow"
# state = true
# no_scm = false
#
# [remote]
# url = "/path/to/remote"
"#;

/// Handle on an initialized repository
///
/// Manages the `.dvs/` directory structure:
/// ```text
/// .dvs/
///   config.toml
///   lock
///   state.json
///   cache/
///     <2 hex>/<rest>
///     .tmp/
///   tmp/
/// ```
pub struct Store {
    /// Root of repository
    root: PathBuf,
    /// Path to .dvs directory
    dvs_dir: PathBuf,
    config: Config,
    cache: Arc<Cache>,
    engine: ChecksumEngine,
    pool: Arc<rayon::ThreadPool>,
    interrupt: Arc<AtomicBool>,
}

impl Store {
    /// Create `.dvs/` under `repo_root` and open it
    pub fn init(repo_root: &Path) -> Result<Self> {
        let dvs_dir = repo_root.join(DVS_DIR);
        if dvs_dir.exists() {
            return Err(Error::AlreadyInitialized {
                path: repo_root.to_path_buf(),
            });
        }

        fs::create_dir_all(dvs_dir.join("tmp")).map_err(Error::io(&dvs_dir))?;
        fs::write(dvs_dir.join("config.toml"), DEFAULT_CONFIG).map_err(Error::io(&dvs_dir))?;
        // Keep cache and state out of source control
        fs::write(dvs_dir.join(".gitignore"), "/cache\n/tmp\n/lock\n/state.json\n")
            .map_err(Error::io(&dvs_dir))?;

        tracing::info!(root = %repo_root.display(), "initialized dvs repository");
        Self::open(repo_root)
    }

    /// Open an existing repository
    pub fn open(repo_root: &Path) -> Result<Self> {
        let dvs_dir = repo_root.join(DVS_DIR);
        if !dvs_dir.is_dir() {
            return Err(Error::NotInitialized { path: dvs_dir });
        }

        let config = Config::load(&dvs_dir.join("config.toml"))?;
        Self::with_config(repo_root, config)
    }

    /// Open with an explicit configuration instead of reading config files
    pub fn with_config(repo_root: &Path, config: Config) -> Result<Self> {
        let dvs_dir = repo_root.join(DVS_DIR);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.core.jobs)
            .thread_name(|i| format!("dvs-worker-{}", i))
            .build()
            .map_err(|e| Error::Config {
                path: dvs_dir.join("config.toml"),
                message: format!("cannot start worker pool: {}", e),
            })?;
        let pool = Arc::new(pool);

        let cache_dir = if config.cache.dir.is_absolute() {
            config.cache.dir.clone()
        } else {
            repo_root.join(&config.cache.dir)
        };
        let interrupt = Arc::new(AtomicBool::new(false));
        let cache = Cache::new(
            cache_dir,
            config.cache.link_types.clone(),
            config.cache.effective_protected(),
        )
        .with_interrupt(Arc::clone(&interrupt));

        let mut engine = ChecksumEngine::new(config.core.symlinks, Arc::clone(&pool));
        if config.core.state {
            engine = engine.with_state(Arc::new(StateIndex::load(&dvs_dir.join("state.json"))));
        }

        Ok(Self {
            root: repo_root.to_path_buf(),
            dvs_dir,
            config,
            cache: Arc::new(cache),
            engine,
            pool,
            interrupt,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dvs_dir(&self) -> &Path {
        &self.dvs_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dvs_dir.join("config.toml")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.dvs_dir.join("tmp")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn engine(&self) -> &ChecksumEngine {
        &self.engine
    }

    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Flag that, once set, stops cache operations between files
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Persist the state index, if one is in use
    pub fn flush_state(&self) -> Result<()> {
        match self.engine.state() {
            Some(state) => state.save(),
            None => Ok(()),
        }
    }
}

/// Atomic write helper
///
/// Writes data to a temporary file, fsyncs it, then renames it to the target path.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    fs::create_dir_all(tmp_dir).map_err(Error::io(tmp_dir))?;
    let temp_path = tmp_dir.join(uuid::Uuid::new_v4().to_string());

    let mut temp_file = fs::File::create(&temp_path).map_err(Error::io(&temp_path))?;
    temp_file.write_all(data).map_err(Error::io(&temp_path))?;
    temp_file.sync_all().map_err(Error::io(&temp_path))?;
    drop(temp_file);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(Error::io(parent))?;
    }

    // Rename to target (atomic on POSIX systems)
    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(target)(e));
    }

    if let Some(parent) = target.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Normalize a repository-relative path
///
/// - Rejects `..` and absolute paths
/// - Drops `.` components
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "path traversal not allowed",
                })
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "absolute paths not allowed",
                })
            }
        }
    }
    Ok(normalized)
}

/// Render a relative path with `/` separators
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// True for repository-relative paths dvs never tracks: anything inside
/// `.dvs/` or `.git/`, and tracking files themselves.
pub fn should_ignore(path: &Path) -> bool {
    if path.starts_with(DVS_DIR) || path.starts_with(".git") {
        return true;
    }
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(TRACKING_FILE_SUFFIX))
        .unwrap_or(false)
}

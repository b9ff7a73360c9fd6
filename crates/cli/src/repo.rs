//! Repository handle and the operations that act on the whole stage set

use crate::error::{RepoError, Result};
use crate::locks::RepoLock;
use dvs_core::hash::Checksum;
use dvs_core::remote::{self, LocalRemote, TransferSummary};
use dvs_core::store::DVS_DIR;
use dvs_core::{Config, Store};
use dvs_scm::{Git, NoScm, Scm};
use dvs_stage::{is_stage_file, CheckoutOutcome, Stage, StageGraph, StageStatus};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// An opened dvs repository together with its source-control collaborator
pub struct Repo {
    store: Store,
    scm: Box<dyn Scm>,
}

impl Repo {
    /// Walk up from `start` to the directory holding `.dvs/`
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(DVS_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Initialize a repository at `root`.
    ///
    /// Requires a git checkout unless `no_scm` is set.
    pub fn init(root: &Path, no_scm: bool) -> Result<Self> {
        if !no_scm && Git::discover(root).is_none() {
            return Err(RepoError::InitWithoutScm {
                path: root.to_path_buf(),
            });
        }
        let store = Store::init(root)?;
        if no_scm {
            Config::set(&store.config_path(), &store.tmp_dir(), "core.no_scm", "true")?;
        }
        drop(store);
        Self::open(root)
    }

    pub fn open(root: &Path) -> Result<Self> {
        Self::from_store(Store::open(root)?)
    }

    /// Wrap an already opened store
    pub fn from_store(store: Store) -> Result<Self> {
        let scm: Box<dyn Scm> = if store.config().core.no_scm {
            Box::new(NoScm::new(store.root()))
        } else {
            dvs_scm::detect(store.root())
        };
        Ok(Self { store, scm })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scm(&self) -> &dyn Scm {
        self.scm.as_ref()
    }

    pub fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(self.store.dvs_dir())
    }

    /// Express `path` (absolute, or relative to the root) relative to the root
    pub fn rel_path(&self, path: &Path) -> Result<PathBuf> {
        let outside = || RepoError::OutsideRepository {
            path: path.to_path_buf(),
        };
        let abs = if path.is_absolute() {
            lexical_normalize(path)
        } else {
            lexical_normalize(&self.root().join(path))
        };

        if let Ok(rel) = abs.strip_prefix(self.root()) {
            return Ok(rel.to_path_buf());
        }
        // The root may have been opened through a symlink
        let root = self
            .root()
            .canonicalize()
            .map_err(|source| RepoError::Io {
                path: self.root().to_path_buf(),
                source,
            })?;
        let parent = abs.parent().ok_or_else(outside)?;
        let name = abs.file_name().ok_or_else(outside)?;
        let parent = parent.canonicalize().map_err(|_| outside())?;
        parent
            .join(name)
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .map_err(|_| outside())
    }

    /// Load every tracking file in the working tree
    pub fn collect_stages(&self) -> Result<Vec<Stage>> {
        let walker = WalkDir::new(self.root())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0 || !(entry.file_type().is_dir() && (name == DVS_DIR || name == ".git"))
            });

        let mut stages = Vec::new();
        for entry in walker {
            let entry = entry.map_err(dvs_core::Error::from)?;
            if !entry.file_type().is_file() || !is_stage_file(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(self.root()) else {
                continue;
            };
            stages.push(Stage::load(&self.store, rel)?);
        }
        tracing::debug!(count = stages.len(), "collected stages");
        Ok(stages)
    }

    /// Load every tracking file recorded at a resolved revision
    pub fn collect_stages_at(&self, rev: &str) -> Result<Vec<Stage>> {
        let mut stages = Vec::new();
        for path in self.scm.list_files_at(rev)? {
            if !is_stage_file(&path) {
                continue;
            }
            let bytes = self.scm.read_file_at(rev, &path)?;
            stages.push(Stage::load_from_bytes(&path, &bytes)?);
        }
        Ok(stages)
    }

    /// Graph over the working-tree stages
    pub fn graph(&self) -> Result<StageGraph> {
        Ok(StageGraph::build(self.collect_stages()?)?)
    }

    /// Check new or changed stages against the rest of the repository
    pub fn check_modified_graph(&self, candidates: Vec<Stage>) -> Result<StageGraph> {
        Ok(StageGraph::validate(candidates, self.collect_stages()?)?)
    }

    /// Stages named by `targets`, in dependency order; all stages when empty.
    ///
    /// A target is either a tracking file or a path owned by a stage.
    fn select<'g>(&self, graph: &'g StageGraph, targets: &[PathBuf]) -> Result<Vec<&'g Stage>> {
        let ordered = graph.topological_order();
        if targets.is_empty() {
            return Ok(ordered);
        }

        let mut wanted = Vec::with_capacity(targets.len());
        for target in targets {
            let rel = self.rel_path(target)?;
            let stage = if is_stage_file(&rel) {
                graph.stage(&rel)
            } else {
                graph.owner_of(&rel)
            };
            match stage {
                Some(stage) => wanted.push(stage.path().to_path_buf()),
                None => return Err(RepoError::NotTracked { path: rel }),
            }
        }
        Ok(ordered
            .into_iter()
            .filter(|stage| wanted.iter().any(|w| w == stage.path()))
            .collect())
    }

    /// Record the current content of the selected stages and cache it
    pub fn commit(&self, targets: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let _lock = self.lock()?;
        let graph = self.graph()?;

        let mut committed = Vec::new();
        for stage in self.select(&graph, targets)? {
            let mut stage = stage.clone();
            stage.save(&self.store)?;
            stage.commit(&self.store)?;
            stage.dump(&self.store)?;
            self.ignore_outputs(&stage)?;
            committed.push(stage.path().to_path_buf());
        }
        self.store.flush_state()?;
        Ok(committed)
    }

    /// Restore the selected stages' outputs from the cache
    pub fn checkout(&self, targets: &[PathBuf]) -> Result<Vec<(PathBuf, CheckoutOutcome)>> {
        let _lock = self.lock()?;
        let graph = self.graph()?;

        let mut outcomes = Vec::new();
        for stage in self.select(&graph, targets)? {
            outcomes.extend(stage.checkout(&self.store)?);
        }
        self.store.flush_state()?;
        Ok(outcomes)
    }

    /// Detach one tracked path from the cache so it can be edited
    pub fn unprotect(&self, target: &Path) -> Result<()> {
        let rel = self.rel_path(target)?;
        let graph = self.graph()?;
        if graph.owner_of(&rel).is_none() {
            return Err(RepoError::NotTracked { path: rel });
        }
        self.store.cache().unprotect(&self.root().join(&rel))?;
        Ok(())
    }

    /// Changes per stage, leaving out stages without changes
    pub fn status(&self) -> Result<BTreeMap<PathBuf, StageStatus>> {
        let graph = self.graph()?;
        let mut changed = BTreeMap::new();
        for stage in graph.topological_order() {
            let status = stage.status(&self.store)?;
            if !status.is_empty() {
                changed.insert(stage.path().to_path_buf(), status);
            }
        }
        self.store.flush_state()?;
        Ok(changed)
    }

    /// Upload cached outputs of every stage to the configured remote
    pub fn push(&self) -> Result<TransferSummary> {
        let remote = self.remote()?;
        let checksums = self.cached_checksums()?;
        Ok(remote::push(
            self.store.cache(),
            &remote,
            &checksums,
            self.store.pool(),
        )?)
    }

    /// Download missing cache entries for every stage from the configured remote
    pub fn pull(&self) -> Result<TransferSummary> {
        let remote = self.remote()?;
        let checksums = self.cached_checksums()?;
        Ok(remote::pull(
            self.store.cache(),
            &remote,
            &checksums,
            self.store.pool(),
        )?)
    }

    fn remote(&self) -> Result<LocalRemote> {
        let url = self
            .store
            .config()
            .remote
            .url
            .as_ref()
            .ok_or(RepoError::NoRemote)?;
        let path = PathBuf::from(url);
        Ok(LocalRemote::new(if path.is_absolute() {
            path
        } else {
            self.root().join(path)
        }))
    }

    fn cached_checksums(&self) -> Result<Vec<Checksum>> {
        let mut checksums: Vec<Checksum> = self
            .collect_stages()?
            .iter()
            .flat_map(|stage| stage.outs().to_vec())
            .filter(|out| out.is_cached())
            .filter_map(|out| out.checksum().cloned())
            .collect();
        checksums.sort();
        checksums.dedup();
        Ok(checksums)
    }

    /// Keep cached outputs out of source control
    pub(crate) fn ignore_outputs(&self, stage: &Stage) -> Result<()> {
        for out in stage.outs().iter().filter(|out| out.is_cached()) {
            self.scm.ignore(out.path())?;
        }
        Ok(())
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

//! Start tracking files and directories

use crate::error::{RepoError, Result};
use crate::repo::Repo;
use dvs_core::store::should_ignore;
use dvs_stage::Stage;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Track every file under a directory target as its own stage
    pub recursive: bool,
    /// Record checksums without moving content into the cache
    pub no_commit: bool,
    /// Tracking file name instead of `<target>.dvs`
    pub fname: Option<PathBuf>,
}

impl Repo {
    /// Create, validate, save and dump one stage per target.
    ///
    /// Every candidate stage is checked against the existing ones before
    /// anything is written, so an overlap leaves the repository untouched.
    pub fn add(&self, targets: &[PathBuf], options: &AddOptions) -> Result<Vec<Stage>> {
        if options.recursive && options.fname.is_some() {
            return Err(RepoError::RecursiveWithFilename);
        }
        let _lock = self.lock()?;

        let mut added = Vec::new();
        for target in targets {
            let target = self.rel_path(target)?;
            let sub_targets = self.find_all_targets(&target, options.recursive)?;

            let threshold = self.store().config().core.large_dir_threshold;
            if self.root().join(&target).is_dir() && sub_targets.len() > threshold {
                tracing::warn!(
                    target = %target.display(),
                    files = sub_targets.len(),
                    "adding a large directory recursively, consider tracking it as a whole instead"
                );
            }

            let stages = sub_targets
                .iter()
                .map(|out| Stage::create(out, options.fname.as_deref()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            self.check_modified_graph(stages.clone())?;

            for mut stage in stages {
                stage.save(self.store())?;
                if !options.no_commit {
                    stage.commit(self.store())?;
                }
                stage.dump(self.store())?;
                self.ignore_outputs(&stage)?;
                tracing::info!(stage = %stage.path().display(), "added");
                added.push(stage);
            }
        }
        self.store().flush_state()?;
        Ok(added)
    }

    fn find_all_targets(&self, target: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        let abs = self.root().join(target);
        if !(recursive && abs.is_dir()) {
            return Ok(vec![target.to_path_buf()]);
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(&abs)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0 || !(name == ".dvs" || name == ".git")
            });
        for entry in walker {
            let entry = entry.map_err(dvs_core::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(self.root()) else {
                continue;
            };
            if should_ignore(rel)
                || self.scm().belongs_to_scm(rel)
                || self.scm().is_tracked(rel)?
            {
                continue;
            }
            found.push(rel.to_path_buf());
        }
        Ok(found)
    }
}

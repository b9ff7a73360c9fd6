//! Git through the `git` binary
//!
//! Every command runs with `-C <root>`, so pathspecs and listed paths are
//! relative to the dvs repository root even when it sits below the git
//! top level.

use crate::{Result, Scm, ScmError};
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output};

#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Find a git checkout containing `root`
    pub fn discover(root: &Path) -> Option<Self> {
        root.ancestors()
            .any(|dir| dir.join(".git").exists())
            .then(|| Self {
                root: root.to_path_buf(),
            })
    }

    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(ScmError::Spawn)
    }

    fn run_checked(&self, command: &str, args: &[&OsStr]) -> Result<Vec<u8>> {
        let output = self.run(std::iter::once(OsStr::new(command)).chain(args.iter().copied()))?;
        if !output.status.success() {
            return Err(ScmError::Git {
                command: command.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// `a/b` form of a relative path, as git expects in `rev:path`
fn pathspec(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl Scm for Git {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_repository_present(&self) -> bool {
        true
    }

    fn resolve(&self, rev: &str) -> Result<String> {
        if rev.is_empty() || rev.starts_with('-') {
            return Err(ScmError::UnknownRevision {
                rev: rev.to_string(),
            });
        }
        let spec = format!("{}^{{commit}}", rev);
        let output = self.run(["rev-parse", "--verify", "--quiet", spec.as_str()])?;
        if !output.status.success() {
            return Err(ScmError::UnknownRevision {
                rev: rev.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn read_file_at(&self, rev: &str, path: &Path) -> Result<Vec<u8>> {
        let object = format!("{}:./{}", rev, pathspec(path));
        let output = self.run(["show", object.as_str()])?;
        if !output.status.success() {
            return Err(ScmError::NotFound {
                path: path.to_path_buf(),
                rev: rev.to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn list_files_at(&self, rev: &str) -> Result<Vec<PathBuf>> {
        let stdout = self.run_checked(
            "ls-tree",
            &[
                OsStr::new("-r"),
                OsStr::new("-z"),
                OsStr::new("--name-only"),
                OsStr::new(rev),
            ],
        )?;
        Ok(stdout
            .split(|b| *b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| PathBuf::from(String::from_utf8_lossy(name).into_owned()))
            .collect())
    }

    fn is_tracked(&self, path: &Path) -> Result<bool> {
        let output = self.run([
            OsStr::new("ls-files"),
            OsStr::new("--error-unmatch"),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        Ok(output.status.success())
    }

    fn belongs_to_scm(&self, path: &Path) -> bool {
        let is_git_file = path
            .file_name()
            .map(|name| name == ".gitignore" || name == ".gitattributes")
            .unwrap_or(false);
        is_git_file || path.components().any(|c| c.as_os_str() == ".git")
    }

    fn ignore(&self, path: &Path) -> Result<()> {
        let Some(name) = path.file_name() else {
            return Ok(());
        };
        let dir = self.root.join(path.parent().unwrap_or_else(|| Path::new("")));
        let gitignore = dir.join(".gitignore");
        let entry = format!("/{}", name.to_string_lossy());

        let existing = match fs::read_to_string(&gitignore) {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ScmError::Io {
                    path: gitignore,
                    source,
                })
            }
        };
        if existing.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }

        let io_err = |source: std::io::Error| ScmError::Io {
            path: gitignore.clone(),
            source,
        };
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&gitignore)
            .map_err(io_err)?;
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        writeln!(file, "{}{}", separator, entry).map_err(io_err)?;
        tracing::debug!(gitignore = %gitignore.display(), %entry, "added ignore entry");
        Ok(())
    }
}

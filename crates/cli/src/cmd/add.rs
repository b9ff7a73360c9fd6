//! Track files and directories

use crate::add::AddOptions;
use crate::util;
use anyhow::{Context, Result};
use dvs_stage::StageError;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(targets: &[PathBuf], recursive: bool, no_commit: bool, file: Option<PathBuf>) -> Result<()> {
    let repo = util::open_repo()?;
    let targets = util::absolute_targets(targets)?;
    let options = AddOptions {
        recursive,
        no_commit,
        fname: file,
    };

    let stages = match repo.add(&targets, &options) {
        Ok(stages) => stages,
        Err(crate::error::RepoError::Stage(StageError::OverlappingOutputs {
            output,
            parent,
            parent_stage,
            ..
        })) => {
            anyhow::bail!(
                "Cannot add '{}', because it is overlapping with other tracked output: '{}'.\n\
                 To include '{}' in '{}', run 'dvs commit {}'",
                output.display(),
                parent.display(),
                output.display(),
                parent.display(),
                parent_stage.display()
            );
        }
        Err(e) => return Err(e).context("Failed to add targets"),
    };

    for stage in &stages {
        println!("{} {}", "Added".green(), stage.path().display());
    }
    if !stages.is_empty() {
        let files: Vec<String> = stages
            .iter()
            .map(|s| s.path().display().to_string())
            .collect();
        println!();
        println!("To track the changes with git, run:");
        println!("  {}", format!("git add {}", files.join(" ")).cyan());
    }
    Ok(())
}

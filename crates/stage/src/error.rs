use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StageError>;

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while building, saving or validating stages.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("output '{path}' does not exist")]
    OutputMissing { path: PathBuf },

    #[error("dependency '{path}' does not exist")]
    DependencyMissing { path: PathBuf },

    #[error("output '{path}' has no checksum, save the stage first")]
    OutputNotSaved { path: PathBuf },

    #[error("parameters {} are missing from '{path}'", .keys.join(", "))]
    MissingParams { path: PathBuf, keys: Vec<String> },

    #[error("unable to read parameters from '{path}': {message}")]
    BadParamFile { path: PathBuf, message: String },

    #[error("output '{output}' of '{stage}' overlaps with output '{parent}' of '{parent_stage}'")]
    OverlappingOutputs {
        /// The nested output
        output: PathBuf,
        stage: PathBuf,
        /// The output containing it
        parent: PathBuf,
        parent_stage: PathBuf,
    },

    #[error("output '{output}' is specified in more than one stage: {}", join_paths(.stages))]
    OutputDuplication { output: PathBuf, stages: Vec<PathBuf> },

    #[error("circular dependency between stages: {}", join_paths(.stages))]
    CyclicGraph { stages: Vec<PathBuf> },

    #[error("tracking file '{path}' is malformed: {message}")]
    BadRecord { path: PathBuf, message: String },

    #[error("'{path}' is not a valid tracking file name, it must end with '.dvs'")]
    BadStageFilename { path: PathBuf },

    #[error(transparent)]
    Core(#[from] dvs_core::Error),
}

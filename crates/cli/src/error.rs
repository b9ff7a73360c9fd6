use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RepoError>;

fn held_by(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(" (pid {})", pid)).unwrap_or_default()
}

/// Errors from repository-level operations
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("diff is only supported under source control, this repository was not found in git")]
    NoScm,

    #[error("unknown revision '{rev}'")]
    UnknownRevision { rev: String },

    #[error("'{path}' is not tracked by git, use `dvs init --no-scm` to work without source control")]
    InitWithoutScm { path: PathBuf },

    #[error("another dvs operation is in progress{}", held_by(.pid))]
    Locked { pid: Option<u32> },

    #[error("'{path}' is not tracked by dvs")]
    NotTracked { path: PathBuf },

    #[error("'{path}' is outside the repository")]
    OutsideRepository { path: PathBuf },

    #[error("cannot use recursive with a single file name")]
    RecursiveWithFilename,

    #[error("no remote configured, set one with `dvs config remote.url <path>`")]
    NoRemote,

    #[error("i/o error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Stage(#[from] dvs_stage::StageError),

    #[error(transparent)]
    Core(#[from] dvs_core::Error),

    #[error(transparent)]
    Scm(dvs_scm::ScmError),
}

impl From<dvs_scm::ScmError> for RepoError {
    fn from(e: dvs_scm::ScmError) -> Self {
        match e {
            dvs_scm::ScmError::UnknownRevision { rev } => RepoError::UnknownRevision { rev },
            dvs_scm::ScmError::NotARepository { .. } => RepoError::NoScm,
            other => RepoError::Scm(other),
        }
    }
}

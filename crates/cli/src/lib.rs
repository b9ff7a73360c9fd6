//! dvs CLI library - repository operations and command implementations

pub mod add;
pub mod cmd;
pub mod diff;
pub mod error;
pub mod locks;
pub mod repo;
pub mod util;

pub use add::AddOptions;
pub use diff::{DiffOptions, DiffResult, Snapshot};
pub use error::{RepoError, Result};
pub use repo::Repo;

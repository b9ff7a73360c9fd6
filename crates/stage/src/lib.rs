//! Stages for dvs
//!
//! A stage is one `.dvs` tracking file: the outputs it owns, the paths and
//! parameters it depends on, and the checksums recorded for them. This crate
//! provides:
//! - Outputs and dependencies with save, commit, status and checkout
//! - The tracking-record format
//! - The stage graph that rejects overlapping outputs and cycles

pub mod dependency;
pub mod error;
pub mod graph;
pub mod output;
pub mod record;
pub mod stage;

pub use dependency::{parse_params_specs, Dependency, ParamsDependency, PathDependency};
pub use error::{Result, StageError};
pub use graph::StageGraph;
pub use output::{CheckoutOutcome, Output, OutputStatus};
pub use record::StageRecord;
pub use stage::{is_stage_file, Stage, StageState, StageStatus};

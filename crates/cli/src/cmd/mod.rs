//! CLI command implementations

pub mod add;
pub mod checkout;
pub mod commit;
pub mod config;
pub mod diff;
pub mod init;
pub mod pull;
pub mod push;
pub mod status;
pub mod unprotect;

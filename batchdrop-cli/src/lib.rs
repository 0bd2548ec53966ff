//! Operator binary support for the batchdrop disbursement engine.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`error`] - Binary error types
//! - [`runner`] - Request loading, adapter selection and the disbursement run
//! - [`util`] - Shutdown signal handling

pub mod config;
pub mod error;
pub mod runner;
pub mod util;

pub use config::CliConfig;
pub use error::CliError;
pub use runner::{RequestFile, run};

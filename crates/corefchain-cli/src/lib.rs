//! Corefchain CLI library.
//!
//! Argument parsing, configuration loading, run store selection and report
//! rendering for the `corefchain` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod store;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{CliError, Result};
pub use output::Formatter;
pub use store::AnyStore;

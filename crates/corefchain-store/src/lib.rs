//! Corefchain Storage Layer
//!
//! Implements the `RunStore` trait for pipeline run state and stage artifacts.
//!
//! # Backends
//!
//! - `FsStore`: one directory per (document, category) holding `state.json`
//!   and one file per artifact; every write goes through a temp file and a
//!   rename so a crash never leaves a half-written artifact
//! - `SqliteStore`: two tables (`run_state`, `artifacts`) keyed by
//!   document and category
//!
//! # Examples
//!
//! ```no_run
//! use corefchain_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for run state operations
//! ```

#![warn(missing_docs)]

mod fs;
mod sqlite;

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use fs::FsStore;
pub use sqlite::SqliteStore;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Seconds since the Unix epoch
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

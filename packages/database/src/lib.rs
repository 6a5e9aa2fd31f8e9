#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Storage for the geomatch address matcher.
//!
//! Reference records live in a single `DuckDB` file, one table shared by
//! every collection and partition. Input addresses and results travel as
//! CSV.

pub mod paths;
pub mod reference_db;
pub mod tabular;

pub use reference_db::DuckDbSource;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON token list.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

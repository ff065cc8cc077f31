//! Error types for sched-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sched-core
///
/// None of these are raised for identifier collisions or hierarchy cycles;
/// both are resolved silently under either decode policy.
#[derive(Debug, Error)]
pub enum Error {
    /// A present field value could not be decoded as the requested type
    #[error("failed to decode field '{field}' value '{raw}' as {target}")]
    FieldDecode {
        field: String,
        raw: String,
        target: &'static str,
    },

    /// The same column name appears twice in one table header
    #[error("duplicate field '{name}' at positions {first} and {second}")]
    DuplicateField {
        name: String,
        first: usize,
        second: usize,
    },

    /// A record is missing a field the import cannot proceed without
    #[error("missing required field '{field}' in table '{table}'")]
    MissingField { table: String, field: String },

    /// A record references an entity that was never read
    #[error("{kind} {id} referenced from '{table}' is unknown")]
    UnknownReference {
        table: String,
        kind: &'static str,
        id: i32,
    },

    /// An earlier strict read failed, so the session has nothing to hand over
    #[error("import session was aborted by an earlier error")]
    SessionAborted,

    /// Invalid import configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

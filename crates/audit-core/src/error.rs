use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the billing audit.
///
/// Soft data conditions (unmatched prices, zero denominators) are never
/// errors; they surface as nulls and flags in the output relations. Every
/// variant here aborts the run.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A staged file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output file or directory could not be written.
    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be parsed or serialised.
    #[error("Failed to process CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A staged row violates the relation's schema.
    #[error("Invalid record in {relation} at row {row}: {reason}")]
    InvalidRecord {
        relation: String,
        row: usize,
        reason: String,
    },

    /// No staged file was found for a required input relation.
    #[error("No staged {relation} file found under {path}")]
    MissingInput { relation: String, path: PathBuf },

    /// A required input relation was present but held no rows.
    #[error("Staged relation {0} is empty")]
    EmptyRelation(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The output snapshot could not be assembled.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the audit crates.
pub type Result<T> = std::result::Result<T, AuditError>;

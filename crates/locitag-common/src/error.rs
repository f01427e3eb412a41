use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocitagError {
    /// A single record could not be normalised. Recovered by the scan driver.
    #[error("Record format error in {record_id}: {reason}")]
    RecordFormat { record_id: String, reason: String },

    /// The store or overlap resolver failed. Aborts the current scan.
    #[error("Resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// A referenced record is absent from its collection.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Unknown normalizer '{name}' configured for section '{section}'")]
    UnknownNormalizer { section: String, name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LocitagError {
    pub fn record_format(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecordFormat { record_id: record_id.into(), reason: reason.into() }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), id: id.into() }
    }

    /// True for errors that only invalidate one record's contribution.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Self::RecordFormat { .. } | Self::NotFound { .. })
    }
}

/// Failure persisting a finished aggregate. Reported after the scan is done.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise aggregate: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("loader rejected output: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, LocitagError>;

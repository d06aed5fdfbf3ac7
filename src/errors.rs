//! Typed error hierarchy for the release board.
//!
//! `BoardError` covers the failures the HTTP layer needs to tell apart:
//! - validation and not-found errors raised at the ingestion boundary
//! - upload policy violations
//! - storage and database failures surfaced verbatim
//!
//! The schedule engine itself never fails; malformed dates are rejected here
//! before a snapshot is built.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Release {id} not found")]
    ReleaseNotFound { id: i64 },

    #[error("Version history {id} not found")]
    HistoryNotFound { id: i64 },

    #[error("Customer module {id} not found")]
    CustomerModuleNotFound { id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid date for {field}: '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("{0}")]
    Conflict(String),

    #[error("File size must be less than {}", describe_limit(*limit))]
    UploadTooLarge { size: usize, limit: usize },

    #[error("Only JPEG, PNG, and WebP images are allowed (got '{0}')")]
    UnsupportedMediaType(String),

    #[error("Object storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn missing_fields() -> Self {
        Self::Validation("Missing required fields".to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReleaseNotFound { .. }
                | Self::HistoryNotFound { .. }
                | Self::CustomerModuleNotFound { .. }
        )
    }
}

fn describe_limit(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    match bytes {
        0 => "0 bytes".to_string(),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{} bytes", b),
    }
}

//! Error types for gangwatch.
//!
//! Every failure is cycle-scoped: a fetch failure aborts the cycle before any
//! mutation, a storage failure is reported but never rolls back memory state.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Unknown granularity: {0} (expected daily, weekly or monthly)")]
    UnknownGranularity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        TrackerError::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Network, timeout or payload problems from the upstream scoreboard
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            TrackerError::Fetch(_) | TrackerError::Timeout(_) | TrackerError::MalformedPayload(_)
        )
    }

    /// Durable write or read problems
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            TrackerError::Storage { .. } | TrackerError::Io(_) | TrackerError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

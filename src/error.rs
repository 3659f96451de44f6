//! Error types for the registry and the fetcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store exists but could not be read or parsed.
    #[error("failed to load source store {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("source '{0}' already exists")]
    DuplicateSource(String),

    #[error("source '{0}' not found")]
    NotFound(String),

    /// Rejected name or URL on registration.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Writing the store failed; the in-memory change was rolled back.
    #[error("failed to persist source store {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

impl RegistryError {
    pub fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persist {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single source fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}ms")]
    Timeout(u128),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("failed to decode body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short category label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::UnexpectedStatus(_) => "status",
            FetchError::Decode(_) => "decode",
        }
    }
}

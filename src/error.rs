//! Error types for upprobe
//!
//! This module defines all error types using thiserror for structured error handling.
//! The three transport outcomes (`Network`, `HttpStatus`, `Aborted`) carry the exact
//! messages surfaced to the display layer when an awaitable upload rejects.

use std::io;
use thiserror::Error;

/// Main error type for upprobe
#[derive(Error, Debug)]
pub enum UploadError {
    /// Connection could not be established or was dropped mid-transfer
    #[error("Network error")]
    Network {
        /// Underlying transport failure, kept for diagnostics only
        detail: String,
    },

    /// Server answered with a status code outside `[200, 300)`
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// Attempt was cancelled by an external actor
    #[error("Request aborted")]
    Aborted,

    /// A new attempt was requested while one is still in flight on the same transport
    #[error("{0} upload already in progress")]
    AttemptInFlight(String),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Background upload task panicked or was cancelled by the runtime
    #[error("Upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    /// Build a network error from any displayable transport failure
    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::Network {
            detail: detail.to_string(),
        }
    }

    /// Whether this error is one of the terminal transport outcomes
    pub fn is_transport_outcome(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::HttpStatus(_) | Self::Aborted
        )
    }
}

/// Result type alias for upprobe
pub type Result<T> = std::result::Result<T, UploadError>;

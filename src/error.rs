//! Error types for chatline
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for chatline operations
///
/// Covers configuration loading, completion transport failures, stream
/// decoding, request lifecycle bookkeeping and state persistence.
#[derive(Error, Debug)]
pub enum ChatlineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion transport errors (network, non-2xx status, bad body)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Malformed server-sent event payload
    #[error("Stream decode error: {0}")]
    Decode(String),

    /// A request slot already has a live stream registered
    ///
    /// Two concurrent streams for the same slot indicate a bug in the caller.
    #[error("Request slot already registered: {0}")]
    SlotAlreadyRegistered(String),

    /// Persisted state errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for chatline operations
///
/// Uses `anyhow::Error` so call sites can attach context while still
/// downcasting to [`ChatlineError`] where the variant matters.
pub type Result<T> = anyhow::Result<T>;

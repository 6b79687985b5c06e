//! Error types for quiver-core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by core operations
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown plugin, unknown version, or missing log file
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate version on publish
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing keypair or unusable configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-200/404 registry response, carrying the registry's message payload
    #[error("registry error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Key generation, signing, or verification failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Malformed archive payload or member path
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Plugin manifest parsing error
    #[error("manifest error: {0}")]
    Toml(#[from] toml::de::Error),
}

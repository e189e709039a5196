//! Error types for config loading and override resolution.

use thiserror::Error;

/// Errors returned while loading, merging, or persisting config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A referenced document does not exist or cannot be read.
    #[error("config not found: {path}")]
    NotFound { path: String },
    /// A document parsed, but its shape is not usable as config.
    #[error("invalid config format in {path}: {message}")]
    Format { path: String, message: String },
    /// A document has malformed syntax.
    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
    /// An include chain revisits a document that is still being resolved.
    #[error("include cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    /// An explicit key override is malformed.
    #[error("invalid override: {0}")]
    Override(String),
    /// Rendering a snapshot failed.
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    /// Writing a snapshot or resolving the working directory failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Error types for the shell-cache library.

use thiserror::Error;

/// Errors that can occur while reconciling or serving the asset cache.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client error (connection refused, DNS failure, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error from a disk-backed cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The asset manifest document could not be read.
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// A URL could not be parsed or resolved against the origin.
    #[error("Invalid URL: {0}")]
    Url(String),

    /// A fetch completed but the server answered with a non-OK status.
    #[error("Request for {url} failed with status {status}")]
    BadStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },

    /// The network could not be reached.
    #[error("Network error for {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The cache store rejected an operation.
    #[error("Cache store error: {0}")]
    Store(String),

    /// Activation failed and every cache namespace was wiped.
    #[error("Cache reset after failed activation: {0}")]
    ActivationReset(Box<Error>),
}

impl Error {
    /// Returns true if the error came from the network rather than the store.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Network { .. } | Self::BadStatus { .. }
        )
    }
}

/// A specialized `Result` type for shell-cache operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for dockyard-cloud.

use thiserror::Error;

/// Result type alias for provider API operations.
pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors returned by the provider API client.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The requested resource does not exist (HTTP 404)
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Resource kind, e.g. "server"
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The provider rejected the request
    #[error("provider API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure talking to the provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// No server appliance matched the image query
    #[error("no server appliance matches {0}")]
    NoMatchingAppliance(String),

    /// The configured API endpoint is unusable
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(String),
}

impl CloudError {
    /// True if the provider reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }
}

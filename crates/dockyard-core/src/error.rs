//! Error types for dockyard-core.

use dockyard_cloud::CloudError;
use thiserror::Error;

/// Result type alias for dockyard-core operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can occur while provisioning or managing a machine.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Bad sizing or configuration; raised before any remote call
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A server or firewall policy with the machine's name already exists
    #[error("the name '{0}' is already in use")]
    NameInUse(String),

    /// No base image matched the image filter
    #[error("failed to resolve base image: {0}")]
    ImageResolution(String),

    /// Any provider call failure
    #[error("provider API error: {0}")]
    RemoteApi(#[from] CloudError),

    /// The server reached its running state without an address
    #[error("server '{0}' has no IP address assigned")]
    NoAddressAssigned(String),

    /// The provider did not hand out an initial root password
    #[error("server '{0}' has no initial password")]
    MissingPassword(String),

    /// Connecting to the new server or installing the key failed
    #[error("SSH bootstrap failed: {0}")]
    SshBootstrap(String),

    /// Lifecycle operation on a machine without a remote server
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A readiness wait exhausted its retry policy
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    /// A readiness wait was cancelled by the caller
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// Local key pair could not be generated or read
    #[error("SSH key error: {0}")]
    KeyGeneration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// True for errors produced by a retry policy or cancellation.
    pub fn is_wait_aborted(&self) -> bool {
        matches!(
            self,
            ProvisionError::Timeout { .. } | ProvisionError::Cancelled(_)
        )
    }
}

impl From<ssh2::Error> for ProvisionError {
    fn from(err: ssh2::Error) -> Self {
        ProvisionError::SshBootstrap(err.to_string())
    }
}

impl From<ssh_key::Error> for ProvisionError {
    fn from(err: ssh_key::Error) -> Self {
        ProvisionError::KeyGeneration(err.to_string())
    }
}

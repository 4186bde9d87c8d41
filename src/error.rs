//! Error types for the suite orchestrator
//!
//! The taxonomy follows the suite lifecycle: configuration errors happen
//! before any resource exists, setup errors may leave partial resources in
//! place (intentionally, for inspection), and teardown errors are collected
//! without aborting the remaining cleanup steps.

use thiserror::Error;

/// Main error type for suite orchestration
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Bad or unrecognized input; fatal before any resource is created
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A provisioning step failed; resources may be partially created
    #[error("setup error: {0}")]
    Setup(String),

    /// One or more cleanup steps failed after all steps were attempted
    #[error("teardown error: {0}")]
    Teardown(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a setup error with the given message
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Create a teardown error with the given message
    pub fn teardown(msg: impl Into<String>) -> Self {
        Self::Teardown(msg.into())
    }
}

/// True when the Kubernetes error is a 404 for the targeted resource
///
/// Deleting something that is already gone counts as success during
/// teardown, which is what makes teardown idempotent.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// True when the Kubernetes error is a 409 "already exists"
///
/// Creating a namespace that survived a previous run counts as success
/// during setup.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

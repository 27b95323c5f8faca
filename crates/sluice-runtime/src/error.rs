//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use sluice_framework::BuildError;
use sluice_transport::TransportError;

/// Errors that can occur while building or running an app.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dispatcher could not be built.
    #[error("Failed to build dispatcher: {0}")]
    Build(#[from] BuildError),

    /// The HTTP receiver failed to start.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Installing a shutdown signal handler failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

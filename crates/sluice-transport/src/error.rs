//! Transport error types.

use thiserror::Error;

/// Errors raised while binding or serving the HTTP receiver.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No route was configured.
    #[error("at least one request path is required")]
    NoPaths,

    /// A configured path is not absolute.
    #[error("invalid request path '{0}': paths must start with '/'")]
    InvalidPath(String),

    /// A path is configured more than once.
    #[error("duplicate request path '{0}'")]
    DuplicatePath(String),

    /// Binding or inspecting the listening socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

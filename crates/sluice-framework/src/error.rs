//! Error types for the Sluice framework.

use thiserror::Error;
pub use tower::BoxError;

/// Errors raised by the acknowledgement state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    /// `ack()` was called on an already acknowledged request.
    ///
    /// This is a programming error in a listener, not a retryable condition.
    #[error("the request was already acknowledged; ack() must be called exactly once")]
    MultipleAcknowledgements,
}

/// Machine-readable classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Authorization of the request failed.
    Authorization,
    /// A listener asked to defer the request to the unhandled fallback.
    DeferredRequest,
    /// A listener called `ack()` twice.
    MultipleAcknowledgements,
    /// More than one listener failed.
    MultipleListeners,
    /// Any other failure raised by user code.
    Unknown,
}

/// Errors raised while running middleware and listeners for one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The authorize step rejected the request.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The request should be answered as unhandled (`404`).
    #[error("request deferred: {0}")]
    DeferredRequest(String),

    /// An acknowledgement error surfaced from user code.
    #[error(transparent)]
    Ack(#[from] AckError),

    /// Several listeners failed for the same request.
    #[error("{} listeners failed", .0.len())]
    MultipleListeners(Vec<DispatchError>),

    /// An uncoded error raised by middleware or a listener.
    #[error("middleware failed: {0}")]
    Handler(BoxError),
}

impl DispatchError {
    /// Creates an authorization error.
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Creates a deferred-request error.
    pub fn deferred(msg: impl Into<String>) -> Self {
        Self::DeferredRequest(msg.into())
    }

    /// Returns the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Authorization(_) => ErrorCode::Authorization,
            Self::DeferredRequest(_) => ErrorCode::DeferredRequest,
            Self::Ack(AckError::MultipleAcknowledgements) => ErrorCode::MultipleAcknowledgements,
            Self::MultipleListeners(_) => ErrorCode::MultipleListeners,
            Self::Handler(_) => ErrorCode::Unknown,
        }
    }

    /// Recovers a coded error from a boxed middleware error.
    ///
    /// Middleware returns [`BoxError`] so `?` works on any error type; coded
    /// errors survive the round trip through the box.
    pub fn from_boxed(err: BoxError) -> Self {
        let err = match err.downcast::<DispatchError>() {
            Ok(dispatch) => return *dispatch,
            Err(other) => other,
        };
        match err.downcast::<AckError>() {
            Ok(ack) => Self::Ack(*ack),
            Err(other) => Self::Handler(other),
        }
    }
}

/// Errors raised while assembling a dispatcher.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Signature verification is enabled but no signing secret was given.
    #[error("signature verification is enabled but no signing secret is configured")]
    MissingSigningSecret,
}

/// Result type returned by middleware.
pub type MiddlewareResult = Result<(), BoxError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coded_errors_survive_boxing() {
        let boxed: BoxError = Box::new(DispatchError::authorization("no installation"));
        assert_eq!(DispatchError::from_boxed(boxed).code(), ErrorCode::Authorization);

        let boxed: BoxError = Box::new(AckError::MultipleAcknowledgements);
        assert_eq!(
            DispatchError::from_boxed(boxed).code(),
            ErrorCode::MultipleAcknowledgements
        );
    }

    #[test]
    fn test_foreign_errors_are_uncoded() {
        let boxed: BoxError = "database unavailable".into();
        let err = DispatchError::from_boxed(boxed);
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert_eq!(err.to_string(), "middleware failed: database unavailable");
    }
}

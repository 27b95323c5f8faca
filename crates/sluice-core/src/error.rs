//! Error types for request verification and body decoding.
//!
//! These errors are resolved at the edge of the receiver: they never reach
//! middleware. Authenticity failures map to `401`, decoding failures to `400`.

use thiserror::Error;

// =============================================================================
// Authenticity Errors
// =============================================================================

/// Reasons a request failed signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticityError {
    /// The signature or the timestamp header is absent.
    #[error("missing signature or timestamp header")]
    MissingHeaders,

    /// The timestamp header is not an integer.
    #[error("invalid request timestamp: {0}")]
    InvalidTimestamp(String),

    /// The timestamp is older than the tolerance window.
    #[error("stale request timestamp {timestamp} (cutoff {cutoff})")]
    StaleTimestamp {
        /// Timestamp carried by the request.
        timestamp: i64,
        /// Oldest timestamp still accepted.
        cutoff: i64,
    },

    /// The computed digest does not match the one in the signature header.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The signing secret could not be resolved.
    #[error("signing secret unavailable: {0}")]
    SecretUnavailable(String),
}

// =============================================================================
// Body Parsing Errors
// =============================================================================

/// Errors that can occur while decoding a request body.
#[derive(Debug, Clone, Error)]
pub enum BodyParsingError {
    /// The body is not valid UTF-8.
    #[error("request body is not valid UTF-8")]
    InvalidUtf8,

    /// The body (or the nested `payload` field) is not valid JSON.
    #[error("malformed JSON body: {0}")]
    Json(String),

    /// The form-encoded body could not be decoded.
    #[error("malformed form body: {0}")]
    Form(String),
}

impl From<serde_json::Error> for BodyParsingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// Receiver Errors
// =============================================================================

/// Failures that end a request before any middleware runs.
#[derive(Debug, Clone, Error)]
pub enum ReceiverError {
    /// The request is not authentic.
    #[error(transparent)]
    Authenticity(#[from] AuthenticityError),

    /// The request body could not be decoded.
    #[error(transparent)]
    BodyParsing(#[from] BodyParsingError),
}

impl ReceiverError {
    /// Returns the HTTP status code this failure is answered with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authenticity(_) => 401,
            Self::BodyParsing(_) => 400,
        }
    }
}

/// Result type for verification operations.
pub type AuthenticityResult<T> = Result<T, AuthenticityError>;

/// Result type for decoding operations.
pub type BodyParsingResult<T> = Result<T, BodyParsingError>;

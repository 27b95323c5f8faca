//! Platform API client seam.
//!
//! Middleware receives an optional client handle to call platform methods
//! (posting replies, opening views). Only the interface lives here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by an [`ApiClient`].
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform answered with an error.
    #[error("API error from {method}: {message}")]
    Platform {
        /// The API method that failed.
        method: String,
        /// Error message returned by the platform.
        message: String,
    },

    /// The request could not be delivered.
    #[error("API request failed: {0}")]
    Request(String),
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// A client for the platform's Web API.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Calls `method` with JSON `params`, authenticated with `token`.
    async fn call(&self, method: &str, token: Option<&str>, params: Value) -> ApiResult<Value>;
}

/// A shared, type-erased API client.
pub type BoxedClient = Arc<dyn ApiClient>;

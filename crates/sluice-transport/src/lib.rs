//! # Sluice Transport
//!
//! HTTP binding for a [`Dispatcher`](sluice_framework::Dispatcher).
//!
//! ```rust,ignore
//! let handle = HttpReceiver::new("0.0.0.0:3000")
//!     .path("/slack/events")
//!     .listen(dispatcher)
//!     .await?;
//! ```

pub mod error;
pub mod http;

pub use error::{TransportError, TransportResult};
pub use http::{HttpReceiver, ListenerHandle, into_http_response, router};

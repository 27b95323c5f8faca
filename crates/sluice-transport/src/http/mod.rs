//! HTTP receiver built on axum.

mod server;

pub use server::{HttpReceiver, ListenerHandle, into_http_response, router};

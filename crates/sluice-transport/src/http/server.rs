//! HTTP server binding a [`Dispatcher`] to POST routes.
//!
//! The server only translates between HTTP and the transport-neutral request
//! and response types; every decision is taken by the dispatcher.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace};

use sluice_core::{Headers, InboundRequest, ReceiverResponse};
use sluice_framework::Dispatcher;

use crate::error::{TransportError, TransportResult};

/// Builds a router answering `POST` on every path with the dispatcher.
///
/// Repeated paths are routed once.
pub fn router(dispatcher: Dispatcher, paths: &[String]) -> Router {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|path| seen.insert(path.as_str()))
        .fold(Router::new(), |router, path| {
            router.route(path, post(receive))
        })
        .with_state(dispatcher)
}

async fn receive(
    State(dispatcher): State<Dispatcher>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    trace!(path = uri.path(), len = body.len(), "Received HTTP request");

    let request = InboundRequest::new(method.as_str(), uri.path(), convert_headers(&headers), body);
    into_http_response(dispatcher.receive(request).await)
}

/// Copies headers with UTF-8 values; others cannot carry signatures.
fn convert_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

/// Converts a dispatcher response into an HTTP response.
pub fn into_http_response(response: ReceiverResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = response.body.content_type();
    let mut http = (status, Body::from(response.body.to_bytes())).into_response();
    if let Some(content_type) = content_type {
        http.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    http
}

// =============================================================================
// HttpReceiver
// =============================================================================

/// Handle to a running receiver. Dropping it stops the server.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ListenerHandle {
    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// An HTTP receiver bound to one address and a set of paths.
#[derive(Debug, Clone)]
pub struct HttpReceiver {
    addr: String,
    paths: Vec<String>,
}

impl HttpReceiver {
    /// Creates a receiver for `addr` (e.g. `0.0.0.0:3000`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            paths: Vec::new(),
        }
    }

    /// Adds a request path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Adds several request paths.
    pub fn paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.paths.extend(paths);
        self
    }

    /// Binds the socket and starts serving in the background.
    ///
    /// # Errors
    ///
    /// Fails when no path is configured, a path is not absolute or repeated,
    /// or the address cannot be bound.
    pub async fn listen(&self, dispatcher: Dispatcher) -> TransportResult<ListenerHandle> {
        if self.paths.is_empty() {
            return Err(TransportError::NoPaths);
        }
        if let Some(path) = self.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(TransportError::InvalidPath(path.clone()));
        }
        let mut seen = HashSet::new();
        if let Some(path) = self.paths.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(TransportError::DuplicatePath(path.clone()));
        }

        let router = router(dispatcher, &self.paths);
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, paths = ?self.paths, "HTTP receiver listening");

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let server = axum::serve(listener, router);

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "HTTP receiver error");
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("HTTP receiver shutting down");
                }
            }
        });

        Ok(ListenerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde_json::{Value, json};
    use sluice_framework::{MiddlewareArgs, on_command};
    use tower::ServiceExt;

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .signature_verification(false)
            .listener(on_command("/echo").handler(|args: MiddlewareArgs| async move {
                let text = args.body()["text"].as_str().unwrap_or_default().to_string();
                args.ack().ok_or("missing ack")?.ack(json!({ "text": text }))?;
                Ok(())
            }))
            .build()
            .unwrap()
    }

    fn app() -> Router {
        router(dispatcher(), &["/slack/events".to_string()])
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_form_command_returns_json() {
        let request = Request::post("/slack/events")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("command=%2Fecho&text=hi"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_json(response).await, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn test_url_verification() {
        let request = Request::post("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"url_verification","challenge":"c1"}"#))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"challenge": "c1"}));
    }

    #[tokio::test]
    async fn test_bad_body_is_bad_request() {
        let request = Request::post("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from("{"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected_when_verifying() {
        let app = router(
            Dispatcher::builder()
                .signing_secret("secret")
                .build()
                .unwrap(),
            &["/slack/events".to_string()],
        );
        let request = Request::post("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"event_callback"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_not_routed() {
        let request = Request::get("/slack/events").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_empty_response_has_no_content_type() {
        let response = into_http_response(ReceiverResponse::status(404));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_listen_requires_paths() {
        let result = HttpReceiver::new("127.0.0.1:0").listen(dispatcher()).await;
        assert!(matches!(result, Err(TransportError::NoPaths)));
    }

    #[tokio::test]
    async fn test_listen_rejects_duplicate_paths() {
        let result = HttpReceiver::new("127.0.0.1:0")
            .paths(vec!["/slack/events".to_string(), "/slack/events".to_string()])
            .listen(dispatcher())
            .await;
        assert!(matches!(result, Err(TransportError::DuplicatePath(p)) if p == "/slack/events"));
    }

    #[tokio::test]
    async fn test_router_routes_repeated_path_once() {
        let paths = vec!["/slack/events".to_string(), "/slack/events".to_string()];
        let request = Request::get("/slack/events").body(Body::empty()).unwrap();
        let response = router(dispatcher(), &paths).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_listen_binds_ephemeral_port() {
        let handle = HttpReceiver::new("127.0.0.1:0")
            .path("/slack/events")
            .listen(dispatcher())
            .await
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        handle.stop();
    }
}

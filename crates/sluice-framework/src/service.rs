//! tower integration.
//!
//! [`Dispatcher`] implements `tower::Service<InboundRequest>`, so any tower
//! layer (timeouts, concurrency limits, load shedding) can wrap it before it
//! is handed to a transport:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use tower::limit::ConcurrencyLimitLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ConcurrencyLimitLayer::new(64))
//!     .service(dispatcher);
//! ```

use std::convert::Infallible;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;

use sluice_core::{InboundRequest, ReceiverResponse};

use crate::dispatcher::Dispatcher;

impl Service<InboundRequest> for Dispatcher {
    type Response = ReceiverResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<ReceiverResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: InboundRequest) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.receive(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{Headers, ResponseBody};
    use tower::ServiceExt;

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .signature_verification(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_oneshot_url_verification() {
        let request = InboundRequest::post(
            "/slack/events",
            Headers::new().with("content-type", "application/json"),
            r#"{"type":"url_verification","challenge":"abc"}"#,
        );

        let response = tokio_test::assert_ok!(dispatcher().oneshot(request).await);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, ResponseBody::Json(json!({"challenge": "abc"})));
    }

    #[tokio::test]
    async fn test_poll_ready_is_always_ready() {
        let mut service = dispatcher();
        tokio_test::assert_ok!(service.ready().await);
    }
}

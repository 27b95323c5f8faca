//! Built-in global middleware.

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use sluice_core::EventCategory;

use crate::error::MiddlewareResult;
use crate::middleware::{Middleware, MiddlewareArgs, Next};

/// Event types delivered about the app's own user that are still relevant.
const KEPT_SELF_EVENTS: &[&str] = &["member_joined_channel", "member_left_channel"];

/// Drops events authored by the app itself.
///
/// A message event is dropped when its `bot_id` equals the context's bot
/// id. Any event is dropped when its user equals the context's bot user id
/// (channel membership changes excepted). The comparison uses the identity resolved by the authorize
/// step; without one every event passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreSelf;

impl IgnoreSelf {
    fn is_own_event(args: &MiddlewareArgs) -> bool {
        let payload = args.payload();
        if payload.category() != EventCategory::Event {
            return false;
        }
        let (bot_id, bot_user_id) = args
            .context()
            .with(|data| (data.bot_id.clone(), data.bot_user_id.clone()));

        if payload.event_type() == Some("message")
            && bot_id.is_some()
            && bot_id.as_deref() == payload.event_bot_id()
        {
            return true;
        }

        if let (Some(own), Some(user)) = (bot_user_id.as_deref(), payload.user_id()) {
            let kept = payload
                .event_type()
                .is_some_and(|t| KEPT_SELF_EVENTS.contains(&t));
            if own == user && !kept {
                return true;
            }
        }
        false
    }
}

impl Middleware for IgnoreSelf {
    fn call(&self, args: MiddlewareArgs, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        if Self::is_own_event(&args) {
            debug!(
                event_type = args.payload().event_type(),
                "Ignoring event authored by this app"
            );
            return async { Ok(()) }.boxed();
        }
        next.run().boxed()
    }

    fn name(&self) -> &str {
        "ignore_self"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextData};
    use crate::middleware::{BoxedMiddleware, MiddlewareChain, middleware_fn};
    use serde_json::{Value, json};
    use sluice_core::IncomingPayload;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn reaches_downstream(body: Value) -> bool {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let downstream: BoxedMiddleware = Arc::new(middleware_fn(move |_args, _next| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }));
        let ignore_self: BoxedMiddleware = Arc::new(IgnoreSelf);
        let chain = MiddlewareChain::new(vec![ignore_self, downstream]);
        let context = Context::new(ContextData {
            bot_id: Some("B1".into()),
            bot_user_id: Some("U0BOT".into()),
            ..Default::default()
        });
        let args = MiddlewareArgs::new(
            Arc::new(IncomingPayload::classify(body).unwrap()),
            context,
            None,
            None,
            tracing::Span::none(),
        );
        chain.run(args, None).await.unwrap();
        calls.load(Ordering::SeqCst) == 1
    }

    #[tokio::test]
    async fn test_drops_own_bot_message() {
        assert!(
            !reaches_downstream(json!({
                "type": "event_callback",
                "event": {"type": "message", "subtype": "bot_message", "bot_id": "B1"}
            }))
            .await
        );
    }

    #[tokio::test]
    async fn test_bot_id_only_checked_for_messages() {
        assert!(
            reaches_downstream(json!({
                "type": "event_callback",
                "event": {"type": "app_home_opened", "bot_id": "B1", "user": "U2"}
            }))
            .await
        );
    }

    #[tokio::test]
    async fn test_drops_events_by_own_user() {
        assert!(
            !reaches_downstream(json!({
                "type": "event_callback",
                "event": {"type": "reaction_added", "user": "U0BOT"}
            }))
            .await
        );
    }

    #[tokio::test]
    async fn test_keeps_membership_events() {
        assert!(
            reaches_downstream(json!({
                "type": "event_callback",
                "event": {"type": "member_joined_channel", "user": "U0BOT"}
            }))
            .await
        );
    }

    #[tokio::test]
    async fn test_passes_other_authors() {
        assert!(
            reaches_downstream(json!({
                "type": "event_callback",
                "event": {"type": "message", "user": "U1", "bot_id": "B2"}
            }))
            .await
        );
    }

    #[tokio::test]
    async fn test_passes_non_event_categories() {
        assert!(reaches_downstream(json!({"command": "/deploy", "user_id": "U0BOT"})).await);
    }
}

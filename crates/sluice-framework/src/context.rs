//! Per-request context shared along a middleware chain.
//!
//! A [`Context`] is created by the dispatcher after the authorize step and
//! handed to every middleware of the global chain. Writes made by one
//! middleware are visible to every middleware running after it.
//!
//! When several listeners match, each listener receives a [`Context::fork`]:
//! a deep copy taken when the global chain hands over, so listeners cannot
//! observe each other's writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use sluice_core::DecodedEvent;

use crate::authorize::AuthorizeResult;

/// The data carried by a [`Context`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextData {
    /// Bot token returned by the authorize step.
    pub bot_token: Option<String>,
    /// User token returned by the authorize step.
    pub user_token: Option<String>,
    /// Bot identifier of this app.
    pub bot_id: Option<String>,
    /// Bot user identifier of this app.
    pub bot_user_id: Option<String>,
    /// Workspace the request originates from.
    pub team_id: Option<String>,
    /// Enterprise organization the request originates from.
    pub enterprise_id: Option<String>,
    /// Whether the app is installed at the organization level.
    pub is_enterprise_install: bool,
    /// Delivery attempt number reported by the platform.
    pub retry_num: Option<u32>,
    /// Reason for the redelivery reported by the platform.
    pub retry_reason: Option<String>,
    /// Custom properties and values stored by middleware.
    pub extra: HashMap<String, Value>,
}

impl ContextData {
    /// Seeds context data from the authorize result and the decoded event.
    pub fn from_request(auth: AuthorizeResult, event: &DecodedEvent) -> Self {
        Self {
            bot_token: auth.bot_token,
            user_token: auth.user_token,
            bot_id: auth.bot_id,
            bot_user_id: auth.bot_user_id,
            team_id: auth.team_id,
            enterprise_id: auth.enterprise_id,
            is_enterprise_install: auth.is_enterprise_install,
            retry_num: event.retry_num,
            retry_reason: event.retry_reason.clone(),
            extra: event.custom_properties.clone(),
        }
    }
}

/// Mutable key/value context for one request.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<ContextData>>,
}

impl Context {
    /// Wraps the given data.
    pub fn new(data: ContextData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a deep copy with its own storage.
    pub fn fork(&self) -> Self {
        Self::new(self.snapshot())
    }

    /// Returns a copy of the current data.
    pub fn snapshot(&self) -> ContextData {
        self.inner.read().clone()
    }

    /// Reads the data through a closure.
    pub fn with<R>(&self, f: impl FnOnce(&ContextData) -> R) -> R {
        f(&self.inner.read())
    }

    /// Mutates the data through a closure.
    pub fn update<R>(&self, f: impl FnOnce(&mut ContextData) -> R) -> R {
        f(&mut self.inner.write())
    }

    // ─── Custom values ───────────────────────────────────────────────────────

    /// Returns a custom value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().extra.get(key).cloned()
    }

    /// Stores a custom value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.write().extra.insert(key.into(), value.into())
    }

    /// Removes a custom value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().extra.remove(key)
    }

    /// Returns `true` if a custom value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().extra.contains_key(key)
    }

    // ─── Well-known fields ───────────────────────────────────────────────────

    /// Bot token returned by the authorize step.
    pub fn bot_token(&self) -> Option<String> {
        self.inner.read().bot_token.clone()
    }

    /// User token returned by the authorize step.
    pub fn user_token(&self) -> Option<String> {
        self.inner.read().user_token.clone()
    }

    /// Bot identifier of this app.
    pub fn bot_id(&self) -> Option<String> {
        self.inner.read().bot_id.clone()
    }

    /// Bot user identifier of this app.
    pub fn bot_user_id(&self) -> Option<String> {
        self.inner.read().bot_user_id.clone()
    }

    /// Workspace the request originates from.
    pub fn team_id(&self) -> Option<String> {
        self.inner.read().team_id.clone()
    }

    /// Enterprise organization the request originates from.
    pub fn enterprise_id(&self) -> Option<String> {
        self.inner.read().enterprise_id.clone()
    }

    /// Whether the app is installed at the organization level.
    pub fn is_enterprise_install(&self) -> bool {
        self.inner.read().is_enterprise_install
    }

    /// Delivery attempt number, if this is a redelivery.
    pub fn retry_num(&self) -> Option<u32> {
        self.inner.read().retry_num
    }

    /// Reason for the redelivery.
    pub fn retry_reason(&self) -> Option<String> {
        self.inner.read().retry_reason.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writes_visible_through_clones() {
        let ctx = Context::default();
        let other = ctx.clone();

        ctx.set("step", "a");
        assert_eq!(other.get("step"), Some(json!("a")));
    }

    #[test]
    fn test_fork_isolates_writes() {
        let ctx = Context::default();
        ctx.set("shared", 1);

        let left = ctx.fork();
        let right = ctx.fork();
        left.set("shared", 2);
        right.remove("shared");

        assert_eq!(ctx.get("shared"), Some(json!(1)));
        assert_eq!(left.get("shared"), Some(json!(2)));
        assert!(!right.contains("shared"));
    }

    #[test]
    fn test_from_request_seeds_fields() {
        let mut event = DecodedEvent::new(json!({}));
        event.retry_num = Some(2);
        event.retry_reason = Some("http_timeout".into());
        event.custom_properties.insert("region".into(), json!("eu"));

        let auth = AuthorizeResult {
            bot_token: Some("xoxb-1".into()),
            team_id: Some("T1".into()),
            ..Default::default()
        };
        let ctx = Context::new(ContextData::from_request(auth, &event));

        assert_eq!(ctx.bot_token().as_deref(), Some("xoxb-1"));
        assert_eq!(ctx.team_id().as_deref(), Some("T1"));
        assert_eq!(ctx.retry_num(), Some(2));
        assert_eq!(ctx.retry_reason().as_deref(), Some("http_timeout"));
        assert_eq!(ctx.get("region"), Some(json!("eu")));
    }

    #[test]
    fn test_update_closure() {
        let ctx = Context::default();
        ctx.update(|data| data.bot_user_id = Some("U0BOT".into()));
        assert_eq!(ctx.with(|data| data.bot_user_id.clone()), Some("U0BOT".into()));
    }
}

//! Listener builder functions, one per payload category.
//!
//! ```rust,ignore
//! let registry: ListenerRegistry = [
//!     on_command("/deploy").handler(deploy),
//!     on_action("approve").block_id("review").handler(approve),
//!     on_event("app_mention").handler(mention),
//!     on_view("survey").of_type("view_submission").handler(survey),
//! ]
//! .into_iter()
//! .collect();
//! ```

use sluice_core::EventCategory;

use crate::listener::ListenerBuilder;
use crate::matcher::{Field, Pattern};

/// Slash commands whose `command` matches.
pub fn on_command(command: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Command).constraint(Field::Command, command)
}

/// Interactive actions whose `action_id` matches.
///
/// Use [`on_actions`] to match on other fields only.
pub fn on_action(action_id: impl Into<Pattern>) -> ListenerBuilder {
    on_actions().action_id(action_id)
}

/// Every interactive action.
pub fn on_actions() -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Action)
}

/// Events API callbacks whose inner event `type` matches.
pub fn on_event(event_type: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Event).constraint(Field::EventType, event_type)
}

/// Message events, optionally narrowed with [`ListenerBuilder::subtype`].
pub fn on_message() -> ListenerBuilder {
    on_event("message")
}

/// Global and message shortcuts whose `callback_id` matches.
pub fn on_shortcut(callback_id: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Shortcut).callback_id(callback_id)
}

/// Options requests whose `action_id` matches.
pub fn on_options(action_id: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Options).action_id(action_id)
}

/// View submissions and closures whose view `callback_id` matches.
pub fn on_view(callback_id: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::View).callback_id(callback_id)
}

/// Custom function executions whose function `callback_id` matches.
pub fn on_function(callback_id: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Function).callback_id(callback_id)
}

/// Subscription interactions whose `callback_id` matches.
pub fn on_subscription(callback_id: impl Into<Pattern>) -> ListenerBuilder {
    ListenerBuilder::new(EventCategory::Subscription).callback_id(callback_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::IncomingPayload;

    fn classify(body: serde_json::Value) -> IncomingPayload {
        IncomingPayload::classify(body).unwrap()
    }

    #[test]
    fn test_on_command() {
        let listener = on_command("/deploy").build();
        assert!(listener.matches(&classify(json!({"command": "/deploy"}))));
        assert!(!listener.matches(&classify(json!({"command": "/rollback"}))));
    }

    #[test]
    fn test_on_message_subtype() {
        let listener = on_message().subtype("bot_message").build();
        let bot = classify(json!({
            "type": "event_callback",
            "event": {"type": "message", "subtype": "bot_message"}
        }));
        let human = classify(json!({
            "type": "event_callback",
            "event": {"type": "message"}
        }));
        assert!(listener.matches(&bot));
        assert!(!listener.matches(&human));
    }

    #[test]
    fn test_on_function() {
        let listener = on_function("sample_fn").build();
        let payload = classify(json!({
            "type": "event_callback",
            "event": {"type": "function_executed", "function": {"callback_id": "sample_fn"}}
        }));
        assert!(listener.matches(&payload));
        assert!(!on_event("function_executed").build().matches(&payload));
    }

    #[test]
    fn test_on_shortcut_covers_message_actions() {
        let listener = on_shortcut("share").build();
        assert!(listener.matches(&classify(json!({"type": "shortcut", "callback_id": "share"}))));
        assert!(listener.matches(&classify(json!({"type": "message_action", "callback_id": "share"}))));
    }

    #[test]
    fn test_on_options_and_subscription() {
        let options = on_options("pick").build();
        assert!(options.matches(&classify(json!({"type": "block_suggestion", "action_id": "pick"}))));

        let subscription = on_subscription("sub").build();
        assert!(subscription.matches(&classify(json!({
            "type": "subscription_interaction",
            "callback_id": "sub"
        }))));
    }
}

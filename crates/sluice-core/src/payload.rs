//! Payload classification and the decoded event envelope.
//!
//! Every decoded body is classified into exactly one [`EventCategory`] using
//! an explicit discriminant table rather than probing for properties ad hoc.
//! [`IncomingPayload`] then exposes the identifying fields listeners match
//! against (action id, block id, callback id, event type and subtype, ...).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event Category
// ============================================================================

/// Coarse payload category; each category has its own listener bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Slash command.
    Command,
    /// Block action, legacy attachment action or dialog submission.
    Action,
    /// Events API callback.
    Event,
    /// Global or message shortcut.
    Shortcut,
    /// External select options request.
    Options,
    /// Modal view submission or close.
    View,
    /// Custom function execution.
    Function,
    /// Subscription interaction.
    Subscription,
}

/// Discriminant table: `type` value → category.
///
/// `event_callback` is resolved further by [`EventCategory::classify`]
/// because function executions arrive wrapped as events.
const DISCRIMINANTS: &[(&str, EventCategory)] = &[
    ("block_actions", EventCategory::Action),
    ("interactive_message", EventCategory::Action),
    ("dialog_submission", EventCategory::Action),
    ("workflow_step_edit", EventCategory::Action),
    ("event_callback", EventCategory::Event),
    ("shortcut", EventCategory::Shortcut),
    ("message_action", EventCategory::Shortcut),
    ("block_suggestion", EventCategory::Options),
    ("dialog_suggestion", EventCategory::Options),
    ("view_submission", EventCategory::View),
    ("view_closed", EventCategory::View),
    ("subscription_interaction", EventCategory::Subscription),
];

/// Event type of a custom function execution.
pub const FUNCTION_EXECUTED: &str = "function_executed";

impl EventCategory {
    /// All categories, in bucket order.
    pub const ALL: [EventCategory; 8] = [
        Self::Command,
        Self::Action,
        Self::Event,
        Self::Shortcut,
        Self::Options,
        Self::View,
        Self::Function,
        Self::Subscription,
    ];

    /// Classifies a decoded body. Returns `None` for unknown shapes.
    pub fn classify(body: &Value) -> Option<Self> {
        if let Some(ty) = body.get("type").and_then(Value::as_str) {
            let category = DISCRIMINANTS
                .iter()
                .find(|(name, _)| *name == ty)
                .map(|(_, category)| *category)?;

            if category == Self::Event
                && body.pointer("/event/type").and_then(Value::as_str) == Some(FUNCTION_EXECUTED)
            {
                return Some(Self::Function);
            }
            return Some(category);
        }

        // Slash commands are flat form bodies without a `type` tag.
        if body.get("command").is_some_and(Value::is_string) {
            return Some(Self::Command);
        }
        None
    }

    /// Returns the category name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Action => "action",
            Self::Event => "event",
            Self::Shortcut => "shortcut",
            Self::Options => "options",
            Self::View => "view",
            Self::Function => "function",
            Self::Subscription => "subscription",
        }
    }

    /// Returns `true` for categories that carry no response body and are
    /// acknowledged by the dispatcher itself.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, Self::Event | Self::Function)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event category: {s}"))
    }
}

// ============================================================================
// IncomingPayload
// ============================================================================

/// A classified body with accessors for the fields listeners match on.
#[derive(Debug, Clone)]
pub struct IncomingPayload {
    category: EventCategory,
    body: Value,
}

impl IncomingPayload {
    /// Classifies `body`; returns `None` when no category applies.
    pub fn classify(body: Value) -> Option<Self> {
        EventCategory::classify(&body).map(|category| Self { category, body })
    }

    /// Returns the category.
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Returns the whole decoded body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns the category-specific payload.
    ///
    /// For events and function executions this is the inner `event` object;
    /// for actions and options requests it is the first action (or the body
    /// itself for options); for views it is the `view` object; otherwise it
    /// is the body.
    pub fn payload(&self) -> &Value {
        let inner = match self.category {
            EventCategory::Event | EventCategory::Function => self.body.get("event"),
            EventCategory::Action => self.body.pointer("/actions/0"),
            EventCategory::View => self.body.get("view"),
            _ => None,
        };
        inner.unwrap_or(&self.body)
    }

    /// The top-level `type` tag.
    pub fn type_tag(&self) -> Option<&str> {
        self.str_at("/type")
    }

    /// Slash command name (e.g. `/deploy`).
    pub fn command(&self) -> Option<&str> {
        self.str_at("/command")
    }

    /// Inner event type for Events API callbacks.
    pub fn event_type(&self) -> Option<&str> {
        self.str_at("/event/type")
    }

    /// Inner event subtype for Events API callbacks.
    pub fn event_subtype(&self) -> Option<&str> {
        self.str_at("/event/subtype")
    }

    /// Action id of the first action, or of an options request.
    pub fn action_id(&self) -> Option<&str> {
        self.str_at("/actions/0/action_id")
            .or_else(|| self.str_at("/action_id"))
    }

    /// Block id of the first action, or of an options request.
    pub fn block_id(&self) -> Option<&str> {
        self.str_at("/actions/0/block_id")
            .or_else(|| self.str_at("/block_id"))
    }

    /// Callback id, looked up where each category keeps it.
    pub fn callback_id(&self) -> Option<&str> {
        match self.category {
            EventCategory::View => self.str_at("/view/callback_id"),
            EventCategory::Function => self.str_at("/event/function/callback_id"),
            _ => self
                .str_at("/callback_id")
                .or_else(|| self.str_at("/view/callback_id")),
        }
    }

    /// Team (workspace) id.
    pub fn team_id(&self) -> Option<&str> {
        self.str_at("/team_id")
            .or_else(|| self.str_at("/team/id"))
            .or_else(|| self.str_at("/user/team_id"))
            .or_else(|| self.str_at("/view/team_id"))
    }

    /// Enterprise (org) id.
    pub fn enterprise_id(&self) -> Option<&str> {
        self.str_at("/enterprise_id")
            .or_else(|| self.str_at("/enterprise/id"))
            .or_else(|| self.str_at("/authorizations/0/enterprise_id"))
    }

    /// Id of the acting user.
    pub fn user_id(&self) -> Option<&str> {
        match self.category {
            EventCategory::Event | EventCategory::Function => self
                .str_at("/event/user/id")
                .or_else(|| self.str_at("/event/user")),
            _ => self
                .str_at("/user_id")
                .or_else(|| self.str_at("/user/id")),
        }
    }

    /// Id of the conversation the payload happened in.
    pub fn conversation_id(&self) -> Option<&str> {
        match self.category {
            EventCategory::Event | EventCategory::Function => self
                .str_at("/event/channel")
                .or_else(|| self.str_at("/event/channel/id"))
                .or_else(|| self.str_at("/event/item/channel")),
            _ => self
                .str_at("/channel_id")
                .or_else(|| self.str_at("/channel/id")),
        }
    }

    /// Bot id of the message author, for events authored by bots.
    pub fn event_bot_id(&self) -> Option<&str> {
        self.str_at("/event/bot_id")
    }

    /// Whether the request comes from an org-wide installation.
    pub fn is_enterprise_install(&self) -> bool {
        self.body
            .get("is_enterprise_install")
            .and_then(|v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
            .or_else(|| {
                self.body
                    .pointer("/authorizations/0/is_enterprise_install")
                    .and_then(Value::as_bool)
            })
            .unwrap_or(false)
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.body.pointer(pointer).and_then(Value::as_str)
    }
}

// ============================================================================
// DecodedEvent
// ============================================================================

/// The envelope built for one accepted request.
///
/// Owned by a single dispatch; never shared across requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedEvent {
    /// The decoded body.
    pub body: Value,
    /// Platform retry count, when this is a redelivery.
    pub retry_num: Option<u32>,
    /// Platform retry reason, when this is a redelivery.
    pub retry_reason: Option<String>,
    /// Values produced by the custom properties extractor.
    pub custom_properties: HashMap<String, Value>,
}

impl DecodedEvent {
    /// Creates an envelope around `body`.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminant_table() {
        let cases = [
            (json!({"type": "block_actions"}), EventCategory::Action),
            (json!({"type": "interactive_message"}), EventCategory::Action),
            (json!({"type": "dialog_submission"}), EventCategory::Action),
            (json!({"type": "shortcut"}), EventCategory::Shortcut),
            (json!({"type": "message_action"}), EventCategory::Shortcut),
            (json!({"type": "block_suggestion"}), EventCategory::Options),
            (json!({"type": "view_submission"}), EventCategory::View),
            (json!({"type": "view_closed"}), EventCategory::View),
            (json!({"type": "event_callback", "event": {"type": "app_mention"}}), EventCategory::Event),
            (json!({"type": "subscription_interaction"}), EventCategory::Subscription),
            (json!({"command": "/deploy", "text": ""}), EventCategory::Command),
        ];
        for (body, expected) in cases {
            assert_eq!(EventCategory::classify(&body), Some(expected), "{body}");
        }
    }

    #[test]
    fn test_function_executed_is_its_own_category() {
        let body = json!({
            "type": "event_callback",
            "event": {"type": "function_executed", "function": {"callback_id": "sample_fn"}}
        });
        let payload = IncomingPayload::classify(body).unwrap();
        assert_eq!(payload.category(), EventCategory::Function);
        assert_eq!(payload.callback_id(), Some("sample_fn"));
    }

    #[test]
    fn test_fire_and_forget_categories() {
        assert!(EventCategory::Event.is_fire_and_forget());
        assert!(EventCategory::Function.is_fire_and_forget());
        assert!(!EventCategory::Command.is_fire_and_forget());
        assert!(!EventCategory::View.is_fire_and_forget());
    }

    #[test]
    fn test_unknown_shapes_are_unclassified() {
        assert_eq!(EventCategory::classify(&json!({"type": "mystery"})), None);
        assert_eq!(EventCategory::classify(&json!({"hello": "world"})), None);
    }

    #[test]
    fn test_action_accessors() {
        let payload = IncomingPayload::classify(json!({
            "type": "block_actions",
            "team": {"id": "T1"},
            "user": {"id": "U1"},
            "channel": {"id": "C1"},
            "actions": [{"action_id": "approve", "block_id": "b1"}]
        }))
        .unwrap();
        assert_eq!(payload.action_id(), Some("approve"));
        assert_eq!(payload.block_id(), Some("b1"));
        assert_eq!(payload.team_id(), Some("T1"));
        assert_eq!(payload.user_id(), Some("U1"));
        assert_eq!(payload.conversation_id(), Some("C1"));
        assert_eq!(payload.payload()["action_id"], "approve");
    }

    #[test]
    fn test_event_accessors() {
        let payload = IncomingPayload::classify(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": {"type": "message", "subtype": "bot_message", "channel": "C9", "user": "U7"}
        }))
        .unwrap();
        assert_eq!(payload.event_type(), Some("message"));
        assert_eq!(payload.event_subtype(), Some("bot_message"));
        assert_eq!(payload.conversation_id(), Some("C9"));
        assert_eq!(payload.user_id(), Some("U7"));
        assert_eq!(payload.payload()["type"], "message");
    }

    #[test]
    fn test_view_callback_id() {
        let payload = IncomingPayload::classify(json!({
            "type": "view_submission",
            "view": {"callback_id": "survey", "team_id": "T2"}
        }))
        .unwrap();
        assert_eq!(payload.callback_id(), Some("survey"));
        assert_eq!(payload.team_id(), Some("T2"));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("View".parse::<EventCategory>(), Ok(EventCategory::View));
        assert!("nothing".parse::<EventCategory>().is_err());
    }
}

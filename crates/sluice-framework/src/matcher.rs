//! Constraint matching for listeners.
//!
//! A payload is first classified into an [`EventCategory`]; only listeners
//! registered for that category are considered. Each listener then carries
//! [`Constraints`]: a list of `(field, pattern)` checks that must all pass.

use std::fmt;

use regex::Regex;

use sluice_core::{EventCategory, IncomingPayload};

/// A value a payload field is compared against.
#[derive(Clone)]
pub enum Pattern {
    /// The field must equal the string exactly.
    Exact(String),
    /// The field must match the regular expression.
    Regex(Regex),
}

impl Pattern {
    /// Returns `true` if `value` is present and satisfies the pattern.
    pub fn is_match(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Exact(expected) => expected == value,
            Self::Regex(re) => re.is_match(value),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "{s:?}"),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Exact(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Exact(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

/// Payload fields a constraint can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Top-level `type`.
    Type,
    /// Slash command name.
    Command,
    /// Action id.
    ActionId,
    /// Block id.
    BlockId,
    /// Callback id (view or function callback id where applicable).
    CallbackId,
    /// Inner event `type`.
    EventType,
    /// Inner event `subtype`.
    EventSubtype,
}

impl Field {
    /// Extracts the field from a payload.
    pub fn extract(self, payload: &IncomingPayload) -> Option<&str> {
        match self {
            Self::Type => payload.type_tag(),
            Self::Command => payload.command(),
            Self::ActionId => payload.action_id(),
            Self::BlockId => payload.block_id(),
            Self::CallbackId => payload.callback_id(),
            Self::EventType => payload.event_type(),
            Self::EventSubtype => payload.event_subtype(),
        }
    }
}

/// The ANDed constraints of one listener.
#[derive(Debug, Clone)]
pub struct Constraints {
    category: EventCategory,
    checks: Vec<(Field, Pattern)>,
}

impl Constraints {
    /// Matches every payload of `category`.
    pub fn new(category: EventCategory) -> Self {
        Self {
            category,
            checks: Vec::new(),
        }
    }

    /// Adds a check.
    pub fn with(mut self, field: Field, pattern: impl Into<Pattern>) -> Self {
        self.checks.push((field, pattern.into()));
        self
    }

    pub(crate) fn push(&mut self, field: Field, pattern: Pattern) {
        self.checks.push((field, pattern));
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn checks(&self) -> &[(Field, Pattern)] {
        &self.checks
    }

    /// Returns `true` if the payload is in the category and passes every check.
    pub fn matches(&self, payload: &IncomingPayload) -> bool {
        payload.category() == self.category
            && self
                .checks
                .iter()
                .all(|(field, pattern)| pattern.is_match(field.extract(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(action_id: &str, block_id: &str) -> IncomingPayload {
        IncomingPayload::classify(json!({
            "type": "block_actions",
            "actions": [{"action_id": action_id, "block_id": block_id}]
        }))
        .unwrap()
    }

    #[test]
    fn test_exact_pattern() {
        let p = Pattern::from("approve");
        assert!(p.is_match(Some("approve")));
        assert!(!p.is_match(Some("approve_all")));
        assert!(!p.is_match(None));
    }

    #[test]
    fn test_regex_pattern() {
        let p = Pattern::from(Regex::new("^approve_\\d+$").unwrap());
        assert!(p.is_match(Some("approve_12")));
        assert!(!p.is_match(Some("reject_12")));
    }

    #[test]
    fn test_constraints_are_anded() {
        let c = Constraints::new(EventCategory::Action)
            .with(Field::ActionId, "approve")
            .with(Field::BlockId, "b1");

        assert!(c.matches(&action("approve", "b1")));
        assert!(!c.matches(&action("approve", "b2")));
        assert!(!c.matches(&action("reject", "b1")));
    }

    #[test]
    fn test_category_must_match() {
        let c = Constraints::new(EventCategory::Command);
        assert!(!c.matches(&action("approve", "b1")));
    }

    #[test]
    fn test_no_checks_matches_whole_category() {
        let c = Constraints::new(EventCategory::Action);
        assert!(c.matches(&action("anything", "any")));
    }

    #[test]
    fn test_view_callback_id() {
        let payload = IncomingPayload::classify(json!({
            "type": "view_submission",
            "view": {"callback_id": "survey"}
        }))
        .unwrap();
        let c = Constraints::new(EventCategory::View)
            .with(Field::Type, "view_submission")
            .with(Field::CallbackId, "survey");
        assert!(c.matches(&payload));
    }

    #[test]
    fn test_event_subtype_missing_fails_constraint() {
        let payload = IncomingPayload::classify(json!({
            "type": "event_callback",
            "event": {"type": "message"}
        }))
        .unwrap();
        let c = Constraints::new(EventCategory::Event)
            .with(Field::EventType, "message")
            .with(Field::EventSubtype, "bot_message");
        assert!(!c.matches(&payload));
    }
}

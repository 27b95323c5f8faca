//! Listeners and the per-category listener registry.
//!
//! A [`Listener`] pairs [`Constraints`] with a middleware chain whose last
//! stage is the handler. Listeners are built with the `on_*` functions in
//! [`crate::listener_builders`] and collected in a [`ListenerRegistry`],
//! which keeps one ordered bucket per [`EventCategory`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use sluice_core::{EventCategory, IncomingPayload};

use crate::error::MiddlewareResult;
use crate::matcher::{Constraints, Field, Pattern};
use crate::middleware::{BoxedMiddleware, Middleware, MiddlewareArgs, MiddlewareChain, handler_fn};

// =============================================================================
// Listener
// =============================================================================

struct ListenerInner {
    name: Option<String>,
    constraints: Constraints,
    chain: MiddlewareChain,
}

/// A constrained middleware chain ending in a handler.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Returns the listener name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn category(&self) -> EventCategory {
        self.inner.constraints.category()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.inner.constraints
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.inner.chain
    }

    /// Returns `true` if this listener should run for the payload.
    pub fn matches(&self, payload: &IncomingPayload) -> bool {
        self.inner.constraints.matches(payload)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.inner.name)
            .field("constraints", &self.inner.constraints)
            .field("chain", &self.inner.chain)
            .finish()
    }
}

// =============================================================================
// ListenerBuilder
// =============================================================================

/// Builds a [`Listener`].
///
/// Constraint methods add ANDed checks; [`middleware`](Self::middleware)
/// appends a stage; [`handler`](Self::handler) appends the final stage and
/// finishes the listener.
pub struct ListenerBuilder {
    name: Option<String>,
    constraints: Constraints,
    stages: Vec<BoxedMiddleware>,
}

impl fmt::Debug for ListenerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBuilder")
            .field("name", &self.name)
            .field("constraints", &self.constraints)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ListenerBuilder {
    /// Starts a listener for every payload of `category`.
    pub fn new(category: EventCategory) -> Self {
        Self {
            name: None,
            constraints: Constraints::new(category),
            stages: Vec::new(),
        }
    }

    /// Sets a name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an arbitrary field constraint.
    pub fn constraint(mut self, field: Field, pattern: impl Into<Pattern>) -> Self {
        self.constraints.push(field, pattern.into());
        self
    }

    /// Requires the top-level `type`.
    pub fn of_type(self, pattern: impl Into<Pattern>) -> Self {
        self.constraint(Field::Type, pattern)
    }

    pub fn action_id(self, pattern: impl Into<Pattern>) -> Self {
        self.constraint(Field::ActionId, pattern)
    }

    pub fn block_id(self, pattern: impl Into<Pattern>) -> Self {
        self.constraint(Field::BlockId, pattern)
    }

    pub fn callback_id(self, pattern: impl Into<Pattern>) -> Self {
        self.constraint(Field::CallbackId, pattern)
    }

    /// Requires the inner event `subtype`.
    pub fn subtype(self, pattern: impl Into<Pattern>) -> Self {
        self.constraint(Field::EventSubtype, pattern)
    }

    /// Appends a listener middleware stage.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends the handler and builds the listener.
    pub fn handler<F, Fut>(mut self, f: F) -> Listener
    where
        F: Fn(MiddlewareArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.stages.push(Arc::new(handler_fn(f)));
        self.build()
    }

    /// Builds the listener from the stages added so far.
    pub fn build(self) -> Listener {
        Listener {
            inner: Arc::new(ListenerInner {
                name: self.name,
                constraints: self.constraints,
                chain: MiddlewareChain::new(self.stages),
            }),
        }
    }
}

// =============================================================================
// ListenerRegistry
// =============================================================================

/// Listeners grouped by category, in registration order.
///
/// Built at start-up and read-only while requests are served.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    buckets: HashMap<EventCategory, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener to its category bucket.
    pub fn register(&mut self, listener: Listener) {
        debug!(
            category = %listener.category(),
            name = listener.name().unwrap_or("<unnamed>"),
            "Registered listener"
        );
        self.buckets
            .entry(listener.category())
            .or_default()
            .push(listener);
    }

    /// Returns the listeners of one category.
    pub fn bucket(&self, category: EventCategory) -> &[Listener] {
        self.buckets.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of listeners.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every listener matching the payload, in registration order.
    pub fn matching(&self, payload: &IncomingPayload) -> Vec<Listener> {
        let matched: Vec<Listener> = self
            .bucket(payload.category())
            .iter()
            .filter(|listener| listener.matches(payload))
            .cloned()
            .collect();
        trace!(
            category = %payload.category(),
            matched = matched.len(),
            "Matched listeners"
        );
        matched
    }
}

impl Extend<Listener> for ListenerRegistry {
    fn extend<I: IntoIterator<Item = Listener>>(&mut self, iter: I) {
        for listener in iter {
            self.register(listener);
        }
    }
}

impl FromIterator<Listener> for ListenerRegistry {
    fn from_iter<I: IntoIterator<Item = Listener>>(iter: I) -> Self {
        let mut registry = Self::new();
        registry.extend(iter);
        registry
    }
}

//! Ordered asynchronous middleware with explicit continuations.
//!
//! A chain is a slice of [`Middleware`] stages. Stage 0 is called with a
//! [`Next`] that runs stage 1, and so on. `Next` is consumed by
//! [`Next::run`], so a stage can continue the chain at most once; a stage
//! that returns without running `next` ends the chain.
//!
//! ```rust,ignore
//! let log_team = middleware_fn(|args: MiddlewareArgs, next: Next| async move {
//!     tracing::info!(team = ?args.context().team_id(), "before");
//!     next.run().await?;
//!     tracing::info!("after");
//!     Ok(())
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{Instrument, Span, trace, warn};

use sluice_core::{BoxedClient, IncomingPayload};

use crate::ack::Ack;
use crate::context::Context;
use crate::error::MiddlewareResult;

// =============================================================================
// MiddlewareArgs
// =============================================================================

/// Everything a middleware stage can see about the current request.
///
/// Cloning is cheap: the payload, context, ack and client are shared.
#[derive(Clone)]
pub struct MiddlewareArgs {
    payload: Arc<IncomingPayload>,
    context: Context,
    ack: Option<Ack>,
    client: Option<BoxedClient>,
    span: Span,
}

impl MiddlewareArgs {
    pub fn new(
        payload: Arc<IncomingPayload>,
        context: Context,
        ack: Option<Ack>,
        client: Option<BoxedClient>,
        span: Span,
    ) -> Self {
        Self {
            payload,
            context,
            ack,
            client,
            span,
        }
    }

    /// The classified payload.
    pub fn payload(&self) -> &IncomingPayload {
        &self.payload
    }

    /// The full decoded body.
    pub fn body(&self) -> &Value {
        self.payload.body()
    }

    /// The request context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The acknowledgement handle.
    ///
    /// `None` for categories the dispatcher acknowledges itself.
    pub fn ack(&self) -> Option<&Ack> {
        self.ack.as_ref()
    }

    /// The platform client, if one was configured.
    pub fn client(&self) -> Option<&BoxedClient> {
        self.client.as_ref()
    }

    /// The request span. Enter it or use it as a parent for custom logging.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns a copy with a forked context and its own span.
    pub(crate) fn fork(&self, span: Span) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            context: self.context.fork(),
            ack: self.ack.clone(),
            client: self.client.clone(),
            span,
        }
    }
}

impl fmt::Debug for MiddlewareArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareArgs")
            .field("category", &self.payload.category())
            .field("type", &self.payload.type_tag())
            .field("has_ack", &self.ack.is_some())
            .field("has_client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Middleware Trait
// =============================================================================

/// One stage of a middleware chain.
pub trait Middleware: Send + Sync + 'static {
    /// Runs the stage. Call `next.run()` to continue the chain.
    fn call(&self, args: MiddlewareArgs, next: Next) -> BoxFuture<'static, MiddlewareResult>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A type-erased middleware stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware built from an async closure taking `(args, next)`.
pub struct MiddlewareFn<F> {
    f: F,
}

/// Wraps an async closure as a middleware stage.
pub fn middleware_fn<F, Fut>(f: F) -> MiddlewareFn<F>
where
    F: Fn(MiddlewareArgs, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    MiddlewareFn { f }
}

impl<F, Fut> Middleware for MiddlewareFn<F>
where
    F: Fn(MiddlewareArgs, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn call(&self, args: MiddlewareArgs, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        (self.f)(args, next).boxed()
    }

    fn name(&self) -> &str {
        "middleware_fn"
    }
}

/// The final stage of a listener chain.
///
/// Handlers receive only the args; the chain always ends with them.
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps an async closure as a terminal handler.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(MiddlewareArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Middleware for HandlerFn<F>
where
    F: Fn(MiddlewareArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn call(&self, args: MiddlewareArgs, _next: Next) -> BoxFuture<'static, MiddlewareResult> {
        (self.f)(args).boxed()
    }

    fn name(&self) -> &str {
        "handler"
    }
}

// =============================================================================
// Next
// =============================================================================

/// Continuation invoked after the last stage of a chain, if any.
pub type Finally = Box<dyn FnOnce(MiddlewareArgs) -> BoxFuture<'static, MiddlewareResult> + Send>;

/// The continuation handed to a middleware stage.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    index: usize,
    args: MiddlewareArgs,
    finally: Option<Finally>,
}

impl Next {
    fn new(
        chain: Arc<[BoxedMiddleware]>,
        index: usize,
        args: MiddlewareArgs,
        finally: Option<Finally>,
    ) -> Self {
        Self {
            chain,
            index,
            args,
            finally,
        }
    }

    /// Returns `true` if running this continuation does nothing.
    pub fn is_terminal(&self) -> bool {
        self.index >= self.chain.len() && self.finally.is_none()
    }

    /// Runs the rest of the chain.
    pub async fn run(self) -> MiddlewareResult {
        let Next {
            chain,
            index,
            args,
            finally,
        } = self;

        let stage = chain.get(index).cloned();
        match stage {
            Some(stage) => {
                trace!(index, stage = stage.name(), "Running middleware");
                let next = Next::new(chain, index + 1, args.clone(), finally);
                stage.call(args, next).await
            }
            None => match finally {
                Some(finally) => finally(args).await,
                None => {
                    warn!("next() was called by the last middleware of a chain; nothing to run");
                    Ok(())
                }
            },
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.chain.len())
            .field("terminal", &self.is_terminal())
            .finish()
    }
}

// =============================================================================
// MiddlewareChain
// =============================================================================

/// An immutable, shareable list of middleware stages.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Arc<[BoxedMiddleware]>,
}

impl MiddlewareChain {
    pub fn new(stages: Vec<BoxedMiddleware>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the chain from stage 0.
    ///
    /// `finally` runs when the last stage calls `next`; an empty chain runs
    /// it directly.
    pub async fn run(&self, args: MiddlewareArgs, finally: Option<Finally>) -> MiddlewareResult {
        let span = args.span().clone();
        Next::new(Arc::clone(&self.stages), 0, args, finally)
            .run()
            .instrument(span)
            .await
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

//! # Sluice Framework
//!
//! Everything between a decoded request and its response:
//!
//! - **Acknowledgement**: at-most-once [`Ack`] with a watchdog fallback
//!   ([`Acknowledger`], [`Responder`])
//! - **Middleware**: ordered async stages with explicit continuations
//!   ([`Middleware`], [`Next`], [`MiddlewareChain`])
//! - **Matching**: per-category listener buckets with ANDed constraints
//!   ([`Listener`], [`ListenerRegistry`], [`on_command`], [`on_action`], ...)
//! - **Authorization**: credentials for the originating workspace
//!   ([`Authorize`], [`SingleTeamAuthorize`], [`InstallationAuthorize`])
//! - **Dispatch**: the pipeline tying it together ([`Dispatcher`])
//!
//! ```text
//! InboundRequest ─▶ verify ─▶ decode ─▶ authorize ─▶ global chain ─▶ listener chains
//!                                           │                              │
//!                                           └──── Ack / watchdog ◀─────────┘
//! ```

pub mod ack;
pub mod authorize;
pub mod builtin;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod listener_builders;
pub mod matcher;
pub mod middleware;
mod service;

pub use ack::{
    Ack, Acknowledger, DEFAULT_UNHANDLED_REQUEST_TIMEOUT, FUNCTION_UNHANDLED_REQUEST_TIMEOUT,
    Responder, ResponseMode, UnhandledRequest, UnhandledRequestHandler,
    default_unhandled_request_handler,
};
pub use authorize::{
    Authorize, AuthorizeResult, AuthorizeSource, BoxedAuthorize, Installation,
    InstallationAuthorize, InstallationQuery, InstallationStore, SingleTeamAuthorize,
};
pub use builtin::IgnoreSelf;
pub use context::{Context, ContextData};
pub use dispatcher::{
    CustomPropertiesExtractor, Decoded, DispatchErrorHandler, Dispatcher, DispatcherBuilder,
    DispatcherConfig, default_dispatch_error_handler,
};
pub use error::{
    AckError, BoxError, BuildError, DispatchError, DispatchResult, ErrorCode, MiddlewareResult,
};
pub use listener::{Listener, ListenerBuilder, ListenerRegistry};
pub use listener_builders::{
    on_action, on_actions, on_command, on_event, on_function, on_message, on_options,
    on_shortcut, on_subscription, on_view,
};
pub use matcher::{Constraints, Field, Pattern};
pub use middleware::{
    BoxedMiddleware, Finally, HandlerFn, Middleware, MiddlewareArgs, MiddlewareChain,
    MiddlewareFn, Next, handler_fn, middleware_fn,
};

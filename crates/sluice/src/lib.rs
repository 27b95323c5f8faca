//! # Sluice
//!
//! A receiver for signed webhook deliveries from chat platforms.
//!
//! ## Architecture
//!
//! Every delivery runs through the same pipeline:
//!
//! ```text
//! ┌───────────┐   ┌────────┐   ┌────────┐   ┌───────────────────┐   ┌──────────────────────────┐
//! │ HTTP edge │──▶│ verify │──▶│ decode │──▶│ global middleware │──▶│ listener "deploy"  (fork) │
//! │  (axum)   │   │ (HMAC) │   │        │   │  ignore_self, ... │──▶│ listener "approve" (fork) │
//! └───────────┘   └────────┘   └────────┘   └───────────────────┘   └──────────────────────────┘
//!       ▲                                                                      │
//!       └───────────────────────── ack / watchdog 404 ◀───────────────────────┘
//! ```
//!
//! - **Core** (`sluice-core`): request model, signature verification, body codec, payloads
//! - **Framework** (`sluice-framework`): acknowledgement, context, middleware, listeners, dispatcher
//! - **Transport** (`sluice-transport`): the axum HTTP receiver
//! - **Runtime** (`sluice-runtime`): configuration, logging, [`SluiceApp`](runtime::SluiceApp)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! async fn deploy(args: MiddlewareArgs) -> MiddlewareResult {
//!     args.ack().ok_or("missing ack")?.ack("Deploying")?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     SluiceApp::builder()
//!         .listener(on_command("/deploy").handler(deploy))
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use sluice_core as core;
pub use sluice_framework as framework;
pub use sluice_runtime as runtime;
pub use sluice_transport as transport;

/// Commonly used types for building receivers.
pub mod prelude {
    // Application entry point
    pub use sluice_runtime::{SluiceApp, SluiceConfig};

    // Listener registration
    pub use sluice_framework::{
        Listener, ListenerBuilder, on_action, on_actions, on_command, on_event, on_function,
        on_message, on_options, on_shortcut, on_subscription, on_view,
    };

    // Middleware and handlers
    pub use sluice_framework::{
        Ack, Context, Middleware, MiddlewareArgs, MiddlewareResult, Next, handler_fn,
        middleware_fn,
    };

    // Authorization
    pub use sluice_framework::{
        Authorize, AuthorizeResult, AuthorizeSource, Installation, InstallationAuthorize,
        InstallationStore,
    };

    // Embedding without the runtime
    pub use sluice_core::{EventCategory, InboundRequest, ReceiverResponse, ResponseBody};
    pub use sluice_framework::{DispatchError, Dispatcher};
}

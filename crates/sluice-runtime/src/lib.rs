//! Sluice Runtime - configuration, logging and application wiring.
//!
//! This crate provides:
//! - Layered configuration with figment (`sluice.toml`, `SLUICE_*` variables)
//! - Logging setup over `tracing-subscriber`
//! - [`SluiceApp`], which builds a dispatcher from configuration and serves
//!   it over HTTP until shutdown
//!
//! ```ignore
//! use sluice_runtime::SluiceApp;
//! use sluice_framework::on_command;
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

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::{SluiceApp, SluiceAppBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, Profile, SluiceConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

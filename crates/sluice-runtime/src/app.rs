//! Application wiring: configuration → dispatcher → HTTP receiver.
//!
//! ```rust,ignore
//! use sluice_runtime::SluiceApp;
//! use sluice_framework::on_command;
//!
//! let app = SluiceApp::builder()
//!     .listener(on_command("/deploy").handler(deploy))
//!     .build()?;
//! app.run().await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tokio::signal;
use tracing::{debug, info};

use crate::config::{ConfigLoader, SluiceConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use sluice_core::{BoxedClient, InboundRequest, SignatureVerifier};
use sluice_framework::{
    Authorize, DispatchError, Dispatcher, DispatcherBuilder, Listener, Middleware, Responder,
    SingleTeamAuthorize, UnhandledRequest,
};
use sluice_transport::{HttpReceiver, ListenerHandle};

/// A configured receiver ready to serve.
pub struct SluiceApp {
    config: SluiceConfig,
    dispatcher: Dispatcher,
}

impl SluiceApp {
    pub fn builder() -> SluiceAppBuilder {
        SluiceAppBuilder::new()
    }

    pub fn config(&self) -> &SluiceConfig {
        &self.config
    }

    /// The dispatcher, for embedding into another server.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Starts the HTTP receiver in the background.
    pub async fn start(&self) -> RuntimeResult<ListenerHandle> {
        let receiver =
            HttpReceiver::new(self.config.server.addr()).paths(self.config.server.paths.clone());
        Ok(receiver.listen(self.dispatcher.clone()).await?)
    }

    /// Serves until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        let handle = self.start().await?;
        info!(addr = %handle.local_addr(), "Sluice is running. Press Ctrl+C to stop.");

        let result = wait_for_shutdown().await;
        handle.stop();
        result
    }

    /// Serves until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start().await?;
        shutdown.await;
        handle.stop();
        info!("Sluice stopped");
        Ok(())
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SluiceApp`].
///
/// Configuration comes from a [`ConfigLoader`] unless [`config`](Self::config)
/// supplies one. Listener and middleware registration is forwarded to the
/// underlying [`DispatcherBuilder`].
pub struct SluiceAppBuilder {
    loader: ConfigLoader,
    config: Option<SluiceConfig>,
    dispatcher: DispatcherBuilder,
    custom_authorize: bool,
    init_logging: bool,
}

impl Default for SluiceAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SluiceAppBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            dispatcher: DispatcherBuilder::new(),
            custom_authorize: false,
            init_logging: true,
        }
    }

    // ─── Configuration ───

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges values over the loaded configuration.
    pub fn merge<T: Serialize>(mut self, values: T) -> Self {
        self.loader = self.loader.merge(values);
        self
    }

    /// Uses `config` as is, skipping the loader.
    pub fn config(mut self, config: SluiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Skips installing the global tracing subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    // ─── Dispatch ───

    pub fn listener(mut self, listener: Listener) -> Self {
        self.dispatcher = self.dispatcher.listener(listener);
        self
    }

    pub fn listeners(mut self, listeners: impl IntoIterator<Item = Listener>) -> Self {
        self.dispatcher = self.dispatcher.listeners(listeners);
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.dispatcher = self.dispatcher.middleware(middleware);
        self
    }

    /// Replaces the single-workspace authorizer built from `[auth]`.
    pub fn authorize(mut self, authorize: impl Authorize + 'static) -> Self {
        self.dispatcher = self.dispatcher.authorize(authorize);
        self.custom_authorize = true;
        self
    }

    pub fn client(mut self, client: BoxedClient) -> Self {
        self.dispatcher = self.dispatcher.client(client);
        self
    }

    pub fn custom_properties<F>(mut self, f: F) -> Self
    where
        F: Fn(&InboundRequest) -> HashMap<String, Value> + Send + Sync + 'static,
    {
        self.dispatcher = self.dispatcher.custom_properties(f);
        self
    }

    pub fn unhandled_request_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(UnhandledRequest) + Send + Sync + 'static,
    {
        self.dispatcher = self.dispatcher.unhandled_request_handler(f);
        self
    }

    pub fn dispatch_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&DispatchError, &Responder) -> bool + Send + Sync + 'static,
    {
        self.dispatcher = self.dispatcher.dispatch_error_handler(f);
        self
    }

    /// Loads and validates configuration, installs logging and builds the
    /// dispatcher.
    pub fn build(self) -> RuntimeResult<SluiceApp> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        validate_config(&config)?;

        let receiver = &config.receiver;
        let mut dispatcher = self.dispatcher.config(receiver.to_dispatcher_config());

        if let Some(secret) = receiver.signing_secret.clone() {
            dispatcher = dispatcher.verifier(
                SignatureVerifier::new(secret)
                    .tolerance(receiver.timestamp_tolerance())
                    .header_names(&receiver.signature_header, &receiver.timestamp_header),
            );
        }

        if !self.custom_authorize {
            let auth = &config.auth;
            dispatcher = dispatcher.authorize(
                SingleTeamAuthorize::new(auth.bot_token.clone())
                    .identity(auth.bot_id.clone(), auth.bot_user_id.clone()),
            );
        }

        let dispatcher = dispatcher.build()?;
        debug!(addr = %config.server.addr(), "Sluice app built");

        Ok(SluiceApp { config, dispatcher })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::ConfigError;
    use sluice_core::{
        CONTENT_TYPE_HEADER, FORM_CONTENT_TYPE, Headers, TIMESTAMP_HEADER, format_signature_header,
        unix_now,
    };
    use sluice_framework::{MiddlewareArgs, on_command};

    const SECRET: &str = "test-secret";
    const BODY: &str = "command=%2Fdeploy&team_id=T1&user_id=U1";

    fn config() -> SluiceConfig {
        let mut config = SluiceConfig::default();
        config.receiver.signing_secret = Some(SECRET.to_string());
        config.auth.bot_token = Some("xoxb-1".to_string());
        config.auth.bot_user_id = Some("UBOT".to_string());
        config
    }

    fn request(signature_header: &str) -> InboundRequest {
        let timestamp = unix_now();
        InboundRequest::post(
            "/slack/events",
            Headers::new()
                .with(CONTENT_TYPE_HEADER, FORM_CONTENT_TYPE)
                .with(
                    signature_header,
                    format_signature_header(SECRET, timestamp, BODY.as_bytes()),
                )
                .with(TIMESTAMP_HEADER, timestamp.to_string()),
            BODY,
        )
    }

    #[test]
    fn test_build_rejects_missing_secret() {
        let result = SluiceApp::builder()
            .config(SluiceConfig::default())
            .without_logging()
            .build();
        assert!(matches!(
            result,
            Err(RuntimeError::Config(ConfigError::MissingField { .. }))
        ));
    }

    #[tokio::test]
    async fn test_auth_config_reaches_context() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        let app = SluiceApp::builder()
            .config(config())
            .without_logging()
            .listener(on_command("/deploy").handler(move |args: MiddlewareArgs| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = Some((args.context().bot_token(), args.context().bot_user_id()));
                    args.ack().ok_or("missing ack")?.ack(())?;
                    Ok(())
                }
            }))
            .build()
            .unwrap();

        let response = app.dispatcher().receive(request("x-slack-signature")).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            *seen.lock(),
            Some((Some("xoxb-1".to_string()), Some("UBOT".to_string())))
        );
    }

    #[tokio::test]
    async fn test_custom_signature_header() {
        let mut config = config();
        config.receiver.signature_header = "x-hub-signature".to_string();

        let app = SluiceApp::builder()
            .config(config)
            .without_logging()
            .listener(on_command("/deploy").handler(|args: MiddlewareArgs| async move {
                args.ack().ok_or("missing ack")?.ack(())?;
                Ok(())
            }))
            .build()
            .unwrap();

        let accepted = app.dispatcher().receive(request("x-hub-signature")).await;
        assert_eq!(accepted.status, 200);

        let rejected = app.dispatcher().receive(request("x-slack-signature")).await;
        assert_eq!(rejected.status, 401);
    }

    #[tokio::test]
    async fn test_run_until_stops() {
        let mut config = config();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;

        // Validation rejects port 0, so build the app around the dispatcher directly.
        let dispatcher = Dispatcher::builder()
            .signing_secret(SECRET)
            .build()
            .unwrap();
        let app = SluiceApp { config, dispatcher };

        app.run_until(async {}).await.unwrap();
    }
}

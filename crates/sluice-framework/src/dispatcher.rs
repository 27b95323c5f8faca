//! The request dispatcher.
//!
//! [`Dispatcher::receive`] turns one [`InboundRequest`] into exactly one
//! [`ReceiverResponse`]:
//!
//! 1. verify the signature (skipped for the connectivity probe) → `401`
//! 2. decode the body → `400`
//! 3. answer reserved probes directly
//! 4. build the [`DecodedEvent`], classify it and arm the [`Acknowledger`]
//! 5. authorize, seed the [`Context`], auto-acknowledge fire-and-forget
//!    categories
//! 6. run the global middleware chain, then every matching listener chain
//! 7. flush a deferred response, or hand failures to the
//!    [`DispatchErrorHandler`]
//!
//! Steps 4 to 7 run on their own task. `receive` returns as soon as a
//! response is written, which may be long before listeners finish.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, debug_span, error, info_span, trace, warn};

use sluice_core::{
    AuthenticityError, BodyCodec, BoxedClient, DecodedEvent, EventCategory, InboundRequest,
    IncomingPayload, Probe, ReceiverError, ReceiverResponse, SecretProvider, SignatureVerifier,
};

use crate::ack::{
    Acknowledger, DEFAULT_UNHANDLED_REQUEST_TIMEOUT, FUNCTION_UNHANDLED_REQUEST_TIMEOUT,
    Responder, ResponseMode, UnhandledRequest, UnhandledRequestHandler,
    default_unhandled_request_handler,
};
use crate::authorize::{Authorize, AuthorizeSource, BoxedAuthorize, SingleTeamAuthorize};
use crate::builtin::IgnoreSelf;
use crate::context::{Context, ContextData};
use crate::error::{BoxError, BuildError, DispatchError, ErrorCode, MiddlewareResult};
use crate::listener::{Listener, ListenerRegistry};
use crate::middleware::{BoxedMiddleware, Finally, Middleware, MiddlewareArgs, MiddlewareChain};

// =============================================================================
// Configuration & Hooks
// =============================================================================

/// Behavioural switches of a [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Verify request signatures. Only disable for trusted transports.
    pub signature_verification: bool,
    /// Defer writing the acknowledgement until all middleware finished.
    pub process_before_response: bool,
    /// Watchdog timeout for ordinary requests.
    pub unhandled_request_timeout: Duration,
    /// Watchdog timeout for custom function executions.
    pub function_unhandled_request_timeout: Duration,
    /// Install the [`IgnoreSelf`] global middleware.
    pub ignore_self: bool,
    /// Acknowledge custom function executions before middleware runs.
    pub function_auto_acknowledge: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            signature_verification: true,
            process_before_response: false,
            unhandled_request_timeout: DEFAULT_UNHANDLED_REQUEST_TIMEOUT,
            function_unhandled_request_timeout: FUNCTION_UNHANDLED_REQUEST_TIMEOUT,
            ignore_self: true,
            function_auto_acknowledge: true,
        }
    }
}

/// Extracts custom properties from a request into the context.
pub type CustomPropertiesExtractor =
    Arc<dyn Fn(&InboundRequest) -> HashMap<String, Value> + Send + Sync>;

/// Decides how a failed request is answered.
///
/// Called only when no response was written yet. Returns `true` if the
/// request should count as acknowledged.
pub type DispatchErrorHandler = Arc<dyn Fn(&DispatchError, &Responder) -> bool + Send + Sync>;

/// Answers `401` for authorization failures, `404` for deferred requests and
/// `500` otherwise.
pub fn default_dispatch_error_handler(err: &DispatchError, responder: &Responder) -> bool {
    match err.code() {
        ErrorCode::Authorization => {
            responder.send(ReceiverResponse::status(401));
            true
        }
        ErrorCode::DeferredRequest => {
            responder.send(ReceiverResponse::status(404));
            false
        }
        _ => {
            responder.send(ReceiverResponse::status(500));
            false
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`Dispatcher`].
///
/// ```rust,ignore
/// let dispatcher = Dispatcher::builder()
///     .signing_secret("8f742231b10e8888abcd99yyyzzz85a5")
///     .listener(on_command("/deploy").handler(deploy))
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    verifier: Option<SignatureVerifier>,
    authorize: Option<BoxedAuthorize>,
    client: Option<BoxedClient>,
    custom_properties: Option<CustomPropertiesExtractor>,
    unhandled_request_handler: UnhandledRequestHandler,
    error_handler: DispatchErrorHandler,
    middleware: Vec<BoxedMiddleware>,
    listeners: ListenerRegistry,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            config: DispatcherConfig::default(),
            verifier: None,
            authorize: None,
            client: None,
            custom_properties: None,
            unhandled_request_handler: Arc::new(default_unhandled_request_handler),
            error_handler: Arc::new(default_dispatch_error_handler),
            middleware: Vec::new(),
            listeners: ListenerRegistry::new(),
        }
    }
}

impl DispatcherBuilder {
    /// Creates a builder with the default configuration and hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Verifies requests with a secret using default header names and
    /// tolerance.
    pub fn signing_secret(mut self, secret: impl SecretProvider + 'static) -> Self {
        self.verifier = Some(SignatureVerifier::new(secret));
        self
    }

    /// Verifies requests with a fully configured verifier.
    pub fn verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Enables or disables signature verification.
    pub fn signature_verification(mut self, enabled: bool) -> Self {
        self.config.signature_verification = enabled;
        self
    }

    /// Defers acknowledgements until every middleware has finished.
    pub fn process_before_response(mut self, enabled: bool) -> Self {
        self.config.process_before_response = enabled;
        self
    }

    /// Sets the watchdog timeout for ordinary requests.
    pub fn unhandled_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.unhandled_request_timeout = timeout;
        self
    }

    /// Installs or removes the [`IgnoreSelf`] global middleware.
    pub fn ignore_self(mut self, enabled: bool) -> Self {
        self.config.ignore_self = enabled;
        self
    }

    /// Replaces the default single-workspace authorizer.
    pub fn authorize(mut self, authorize: impl Authorize + 'static) -> Self {
        self.authorize = Some(Arc::new(authorize));
        self
    }

    /// Sets the platform client handed to middleware.
    pub fn client(mut self, client: BoxedClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Extracts extra context values from each request.
    pub fn custom_properties<F>(mut self, f: F) -> Self
    where
        F: Fn(&InboundRequest) -> HashMap<String, Value> + Send + Sync + 'static,
    {
        self.custom_properties = Some(Arc::new(f));
        self
    }

    /// Replaces the handler called when the watchdog fires.
    pub fn unhandled_request_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(UnhandledRequest) + Send + Sync + 'static,
    {
        self.unhandled_request_handler = Arc::new(f);
        self
    }

    /// Replaces the handler deciding how failed requests are answered.
    pub fn dispatch_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&DispatchError, &Responder) -> bool + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(f);
        self
    }

    /// Appends a global middleware stage.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers a listener.
    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.register(listener);
        self
    }

    /// Registers several listeners.
    pub fn listeners(mut self, listeners: impl IntoIterator<Item = Listener>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Builds the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingSigningSecret`] if signature verification
    /// is enabled without a verifier.
    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let verifier = match (self.config.signature_verification, self.verifier) {
            (true, None) => return Err(BuildError::MissingSigningSecret),
            (true, verifier) => verifier,
            (false, _) => {
                warn!("Signature verification is disabled; requests are not authenticated");
                None
            }
        };

        let mut global: Vec<BoxedMiddleware> = Vec::with_capacity(self.middleware.len() + 1);
        if self.config.ignore_self {
            global.push(Arc::new(IgnoreSelf));
        }
        global.extend(self.middleware);

        debug!(
            global_middleware = global.len(),
            listeners = self.listeners.len(),
            "Dispatcher built"
        );

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                config: self.config,
                verifier,
                authorize: self
                    .authorize
                    .unwrap_or_else(|| Arc::new(SingleTeamAuthorize::default())),
                client: self.client,
                custom_properties: self.custom_properties,
                unhandled_request_handler: self.unhandled_request_handler,
                error_handler: self.error_handler,
                global: MiddlewareChain::new(global),
                listeners: self.listeners,
            }),
        })
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outcome of verifying and decoding a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A reserved probe, answered without dispatch.
    Probe(Probe),
    /// An event to dispatch.
    Event(DecodedEvent),
}

struct DispatcherInner {
    config: DispatcherConfig,
    verifier: Option<SignatureVerifier>,
    authorize: BoxedAuthorize,
    client: Option<BoxedClient>,
    custom_properties: Option<CustomPropertiesExtractor>,
    unhandled_request_handler: UnhandledRequestHandler,
    error_handler: DispatchErrorHandler,
    global: MiddlewareChain,
    listeners: ListenerRegistry,
}

/// Verifies, decodes and dispatches inbound requests.
///
/// Cloning is cheap; all clones share the same registry and hooks.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Returns the registered listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    /// Verifies and decodes a request without dispatching it.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::Authenticity`] when verification fails and
    /// [`ReceiverError::BodyParsing`] when the body cannot be decoded.
    pub async fn decode(&self, request: &InboundRequest) -> Result<Decoded, ReceiverError> {
        let raw = request.body();
        let content_type = request.content_type();

        let bypassed = BodyCodec::should_bypass_verification(raw, content_type);
        if bypassed {
            trace!("Connectivity probe, skipping signature verification");
        } else if let Some(verifier) = &self.inner.verifier {
            verifier.verify_now(raw, request.headers()).await?;
        }

        let body = BodyCodec::decode(raw, content_type)?;
        let probe = BodyCodec::probe(&body);
        // An unverified body may only ever be answered as the connectivity probe.
        if bypassed && self.inner.verifier.is_some() && probe != Some(Probe::SslCheck) {
            return Err(AuthenticityError::MissingHeaders.into());
        }
        if let Some(probe) = probe {
            return Ok(Decoded::Probe(probe));
        }

        let mut event = DecodedEvent::new(body);
        event.retry_num = request.retry_num();
        event.retry_reason = request.retry_reason().map(str::to_string);
        if let Some(extract) = &self.inner.custom_properties {
            event.custom_properties = extract(request);
        }
        Ok(Decoded::Event(event))
    }

    /// Handles one request and returns its response.
    ///
    /// Never fails: every failure is mapped to a status code.
    pub async fn receive(&self, request: InboundRequest) -> ReceiverResponse {
        let span = info_span!(
            "request",
            path = request.path(),
            retry_num = ?request.retry_num()
        );

        async move {
            let event = match self.decode(&request).await {
                Ok(Decoded::Probe(probe)) => {
                    debug!(?probe, "Answering probe");
                    return probe_response(probe);
                }
                Ok(Decoded::Event(event)) => event,
                Err(err) => {
                    warn!(error = %err, status = err.status_code(), "Rejected request");
                    return ReceiverResponse::status(err.status_code());
                }
            };

            let (responder, rx) = Responder::channel();
            let this = self.clone();
            tokio::spawn(
                async move { this.process(request, event, responder).await }.in_current_span(),
            );

            match rx.await {
                Ok(response) => response,
                Err(_) => {
                    error!("Request processing ended without writing a response");
                    ReceiverResponse::status(500)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: InboundRequest,
        mut event: DecodedEvent,
        responder: Arc<Responder>,
    ) {
        let mode = if self.inner.config.process_before_response {
            ResponseMode::Deferred
        } else {
            ResponseMode::Immediate
        };
        let acknowledger = Acknowledger::new(responder, mode);

        let payload = IncomingPayload::classify(std::mem::take(&mut event.body));
        let timeout = match payload.as_ref().map(IncomingPayload::category) {
            Some(EventCategory::Function) => self.inner.config.function_unhandled_request_timeout,
            _ => self.inner.config.unhandled_request_timeout,
        };
        acknowledger.arm(
            timeout,
            request,
            Arc::clone(&self.inner.unhandled_request_handler),
        );

        let Some(payload) = payload else {
            warn!("Could not determine the category of an incoming request");
            return;
        };
        debug!(category = %payload.category(), "Dispatching request");

        let result = self.run(&acknowledger, Arc::new(payload), &event).await;
        self.finish(&acknowledger, result);
    }

    async fn run(
        &self,
        acknowledger: &Acknowledger,
        payload: Arc<IncomingPayload>,
        event: &DecodedEvent,
    ) -> Result<(), DispatchError> {
        let source = AuthorizeSource::from_payload(&payload);
        let auth = self
            .inner
            .authorize
            .authorize(&source)
            .await
            .map_err(|e| DispatchError::authorization(e.to_string()))?;

        let category = payload.category();
        let auto_ack = category.is_fire_and_forget()
            && (category != EventCategory::Function || self.inner.config.function_auto_acknowledge);
        let ack = if auto_ack {
            acknowledger.bind().ack(())?;
            None
        } else {
            Some(acknowledger.bind())
        };

        let context = Context::new(ContextData::from_request(auth, event));
        let args = MiddlewareArgs::new(
            Arc::clone(&payload),
            context,
            ack,
            self.inner.client.clone(),
            Span::current(),
        );

        let listeners = self.inner.listeners.matching(&payload);
        let finally: Finally = Box::new(move |args| run_listeners(listeners, args).boxed());

        self.inner
            .global
            .run(args, Some(finally))
            .await
            .map_err(DispatchError::from_boxed)
    }

    fn finish(&self, acknowledger: &Acknowledger, result: Result<(), DispatchError>) {
        let responder = acknowledger.responder();
        match result {
            Ok(()) => {
                if acknowledger.mode() == ResponseMode::Deferred && acknowledger.is_acknowledged() {
                    let body = acknowledger.take_stored_response().unwrap_or_default();
                    responder.send(ReceiverResponse::ok(body));
                }
            }
            Err(err) if responder.is_sent() => {
                error!(
                    error = %err,
                    code = ?err.code(),
                    "Request failed after its response was sent"
                );
            }
            Err(err) => {
                if err.code() == ErrorCode::Authorization {
                    warn!(error = %err, "Request rejected by authorization");
                } else {
                    error!(error = %err, code = ?err.code(), "Request failed");
                }
                if (self.inner.error_handler)(&err, responder) {
                    acknowledger.mark_handled();
                }
            }
        }

        if responder.is_sent() {
            acknowledger.cancel_watchdog();
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("global", &self.inner.global)
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}

fn probe_response(probe: Probe) -> ReceiverResponse {
    match probe {
        Probe::SslCheck => ReceiverResponse::ok(()),
        Probe::UrlVerification { challenge } => ReceiverResponse::ok(json!({ "challenge": challenge })),
    }
}

/// Runs every matched listener concurrently, each with a forked context.
async fn run_listeners(listeners: Vec<Listener>, args: MiddlewareArgs) -> MiddlewareResult {
    if listeners.is_empty() {
        debug!(category = %args.payload().category(), "No listener matched");
        return Ok(());
    }

    let runs = listeners.iter().map(|listener| {
        let span = debug_span!(
            parent: args.span(),
            "listener",
            name = listener.name().unwrap_or("<unnamed>")
        );
        listener.chain().run(args.fork(span), None)
    });

    let mut errors: Vec<BoxError> = join_all(runs)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(DispatchError::MultipleListeners(
            errors.into_iter().map(DispatchError::from_boxed).collect(),
        )
        .into()),
    }
}

//! At-most-once acknowledgement with a watchdog fallback.
//!
//! Every accepted request gets one [`Acknowledger`]. It is a two-state
//! machine, `Pending → Acknowledged`, bound 1:1 to the request:
//!
//! - creating it and calling [`Acknowledger::arm`] starts a one-shot
//!   watchdog; if the request is still pending when it fires, the
//!   [`UnhandledRequestHandler`] runs exactly once
//! - [`Acknowledger::bind`] hands user code an [`Ack`] capability; the first
//!   `ack()` cancels the watchdog, every later call fails with
//!   [`AckError::MultipleAcknowledgements`]
//!
//! The response itself travels through a [`Responder`], a single-use slot
//! shared with the transport. In [`ResponseMode::Immediate`] the ack body is
//! written at once; in [`ResponseMode::Deferred`] it is stored and written by
//! the dispatcher after the whole middleware chain has finished.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, trace, warn};

use sluice_core::{InboundRequest, ReceiverResponse, ResponseBody};

use crate::error::AckError;

/// Default time a request may stay unacknowledged.
pub const DEFAULT_UNHANDLED_REQUEST_TIMEOUT: Duration = Duration::from_millis(3001);

/// Timeout used for custom function executions, which run longer.
pub const FUNCTION_UNHANDLED_REQUEST_TIMEOUT: Duration = Duration::from_millis(5001);

// =============================================================================
// Responder
// =============================================================================

/// Single-use slot through which exactly one response reaches the transport.
pub struct Responder {
    tx: Mutex<Option<oneshot::Sender<ReceiverResponse>>>,
}

impl Responder {
    /// Creates a responder and the receiver the transport awaits.
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<ReceiverResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Writes the response. Returns `false` if one was already written.
    pub fn send(&self, response: ReceiverResponse) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            trace!(status = response.status, "Response already sent, dropping");
            return false;
        };
        // The transport may have gone away; the slot is spent either way.
        let _ = tx.send(response);
        true
    }

    /// Returns `true` once a response has been written.
    pub fn is_sent(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("sent", &self.is_sent())
            .finish()
    }
}

// =============================================================================
// Unhandled Request Handler
// =============================================================================

/// Arguments handed to the [`UnhandledRequestHandler`].
pub struct UnhandledRequest {
    /// The request that was never acknowledged.
    pub request: InboundRequest,
    /// Slot for the fallback response.
    pub responder: Arc<Responder>,
    /// How long the request waited.
    pub timeout: Duration,
}

/// Called once when a request is still unacknowledged after the timeout.
pub type UnhandledRequestHandler = Arc<dyn Fn(UnhandledRequest) + Send + Sync>;

/// Logs the timeout and answers `404` if nothing was sent yet.
pub fn default_unhandled_request_handler(args: UnhandledRequest) {
    error!(
        path = args.request.path(),
        timeout_ms = args.timeout.as_millis() as u64,
        "An incoming event was not acknowledged in time. Ensure that ack() is called in a listener"
    );
    if !args.responder.is_sent() {
        args.responder.send(ReceiverResponse::status(404));
    }
}

// =============================================================================
// Acknowledger
// =============================================================================

/// When an acknowledgement body is written to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Write the response as soon as `ack()` is called.
    #[default]
    Immediate,
    /// Store the body and write it after the middleware chain completes.
    Deferred,
}

#[derive(Debug, Default)]
struct AckState {
    acknowledged: bool,
    stored_response: Option<ResponseBody>,
}

struct AckInner {
    state: Mutex<AckState>,
    mode: ResponseMode,
    responder: Arc<Responder>,
    watchdog: CancellationToken,
}

/// The per-request acknowledgement state machine.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct Acknowledger {
    inner: Arc<AckInner>,
}

impl Acknowledger {
    /// Creates a pending acknowledger writing to `responder`.
    pub fn new(responder: Arc<Responder>, mode: ResponseMode) -> Self {
        Self {
            inner: Arc::new(AckInner {
                state: Mutex::new(AckState::default()),
                mode,
                responder,
                watchdog: CancellationToken::new(),
            }),
        }
    }

    /// Arms the watchdog.
    ///
    /// The spawned task holds only what the fallback needs; it ends either
    /// when the watchdog is cancelled or right after the handler ran.
    pub fn arm(
        &self,
        timeout: Duration,
        request: InboundRequest,
        handler: UnhandledRequestHandler,
    ) {
        let token = self.inner.watchdog.clone();
        let acknowledger = self.clone();

        tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!("Watchdog cancelled");
                    }
                    _ = tokio::time::sleep(timeout) => {
                        if acknowledger.is_acknowledged() {
                            return;
                        }
                        let responder = Arc::clone(&acknowledger.inner.responder);
                        handler(UnhandledRequest { request, responder, timeout });
                    }
                }
            }
            .in_current_span(),
        );
    }

    /// Returns the capability handle given to user code.
    pub fn bind(&self) -> Ack {
        Ack {
            acknowledger: self.clone(),
        }
    }

    /// Returns `true` once the request has been acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        self.inner.state.lock().acknowledged
    }

    /// Returns the response mode.
    pub fn mode(&self) -> ResponseMode {
        self.inner.mode
    }

    /// Returns the response slot.
    pub fn responder(&self) -> &Arc<Responder> {
        &self.inner.responder
    }

    /// Stops the watchdog without acknowledging.
    pub fn cancel_watchdog(&self) {
        self.inner.watchdog.cancel();
    }

    /// Marks the request acknowledged without a body.
    ///
    /// Used when an error handler answered the request itself. Returns
    /// `false` if it was already acknowledged.
    pub fn mark_handled(&self) -> bool {
        let mut state = self.inner.state.lock();
        let first = !state.acknowledged;
        state.acknowledged = true;
        drop(state);
        self.cancel_watchdog();
        first
    }

    /// Takes the body stored by a deferred `ack()`.
    pub fn take_stored_response(&self) -> Option<ResponseBody> {
        self.inner.state.lock().stored_response.take()
    }

    fn acknowledge(&self, body: ResponseBody) -> Result<(), AckError> {
        {
            let mut state = self.inner.state.lock();
            if state.acknowledged {
                drop(state);
                error!("ack() was called more than once for the same request");
                return Err(AckError::MultipleAcknowledgements);
            }
            state.acknowledged = true;
            if self.inner.mode == ResponseMode::Deferred {
                state.stored_response = Some(body.clone());
            }
        }
        self.cancel_watchdog();

        match self.inner.mode {
            ResponseMode::Deferred => {
                debug!("Request acknowledged, response deferred until processing completes");
            }
            ResponseMode::Immediate => {
                if self.inner.responder.send(ReceiverResponse::ok(body)) {
                    debug!("Request acknowledged");
                } else {
                    warn!("Request acknowledged after a response was already sent");
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger")
            .field("acknowledged", &self.is_acknowledged())
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

/// The acknowledgement capability handed to middleware.
///
/// All clones share one state: exactly one `ack()` call succeeds across
/// every listener of the request.
#[derive(Clone, Debug)]
pub struct Ack {
    acknowledger: Acknowledger,
}

impl Ack {
    /// Acknowledges the request with an optional body.
    ///
    /// `()` or an empty string sends a bodiless `200`, a string is sent raw
    /// and a JSON value is sent as JSON.
    pub fn ack(&self, body: impl Into<ResponseBody>) -> Result<(), AckError> {
        self.acknowledger.acknowledge(body.into())
    }

    /// Returns `true` once the request has been acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledger.is_acknowledged()
    }
}

//! # Sluice Core
//!
//! Edge primitives of the Sluice event receiver.
//!
//! Everything in this crate runs before any user code:
//!
//! - **Requests**: buffered inbound requests with case-insensitive headers
//!   ([`InboundRequest`], [`Headers`])
//! - **Verification**: HMAC-SHA256 signatures with a replay window
//!   ([`SignatureVerifier`], [`SecretProvider`])
//! - **Decoding**: JSON and form bodies, nested `payload` fields and the
//!   reserved probes ([`BodyCodec`], [`Probe`])
//! - **Payload model**: category classification and identifying fields
//!   ([`EventCategory`], [`IncomingPayload`], [`DecodedEvent`])
//! - **Responses**: transport-neutral status and body ([`ReceiverResponse`])
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────┐   ┌──────────────┐
//! │  Transport   │──▶│ SignatureVerifier│──▶│ BodyCodec │──▶│ DecodedEvent │──▶ framework
//! └──────────────┘   └──────────────────┘   └───────────┘   └──────────────┘
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod payload;
pub mod request;
pub mod response;
pub mod signature;

pub use client::{ApiClient, ApiError, ApiResult, BoxedClient};
pub use codec::{BodyCodec, BodyKind, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, Probe};
pub use error::{
    AuthenticityError, AuthenticityResult, BodyParsingError, BodyParsingResult, ReceiverError,
};
pub use payload::{DecodedEvent, EventCategory, FUNCTION_EXECUTED, IncomingPayload};
pub use request::{
    CONTENT_TYPE_HEADER, Headers, InboundRequest, RETRY_NUM_HEADER, RETRY_REASON_HEADER,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use response::{ReceiverResponse, ResponseBody};
pub use signature::{
    BoxedSecretProvider, DEFAULT_TOLERANCE, SecretProvider, SignatureVerifier, compute_signature,
    format_signature_header, unix_now, verify_request,
};

//! HMAC-SHA256 request signature verification.
//!
//! A signed request carries two headers:
//!
//! - a signature formatted `{version}={hex digest}` (conventionally `v0`)
//! - the integer UNIX timestamp at which the platform signed the request
//!
//! The digest is `HMAC-SHA256(secret, "{version}:{timestamp}:{raw body}")`.
//! Requests older than the tolerance window are rejected to defeat replay of
//! captured traffic.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::trace;

use crate::error::{AuthenticityError, AuthenticityResult};
use crate::request::{Headers, SIGNATURE_HEADER, TIMESTAMP_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

// =============================================================================
// Secret Providers
// =============================================================================

/// Resolves the signing secret, possibly asynchronously.
///
/// Implement this to fetch the secret from a vault or secret manager. Plain
/// strings implement it directly.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Returns the current signing secret.
    async fn signing_secret(&self) -> Result<String, String>;
}

#[async_trait]
impl SecretProvider for String {
    async fn signing_secret(&self) -> Result<String, String> {
        Ok(self.clone())
    }
}

#[async_trait]
impl SecretProvider for &'static str {
    async fn signing_secret(&self) -> Result<String, String> {
        Ok((*self).to_string())
    }
}

/// A shared, type-erased secret provider.
pub type BoxedSecretProvider = Arc<dyn SecretProvider>;

// =============================================================================
// Signature Primitives
// =============================================================================

/// Computes the hex digest for a request.
///
/// `version` is the scheme prefix found in the signature header.
pub fn compute_signature(secret: &str, version: &str, timestamp: &str, body: &[u8]) -> String {
    hex::encode(signing_mac(secret, version, timestamp, body).finalize().into_bytes())
}

/// Formats a complete signature header value (`v0={digest}`).
pub fn format_signature_header(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let ts = timestamp.to_string();
    format!("v0={}", compute_signature(secret, "v0", &ts, body))
}

fn signing_mac(secret: &str, version: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(version.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
}

/// Returns the current UNIX time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Splits a signature header into `(version, digest)`.
fn parse_signature(value: &str) -> Option<(&str, &str)> {
    let (version, digest) = value.trim().split_once('=')?;
    if version.is_empty() || digest.is_empty() {
        return None;
    }
    Some((version, digest))
}

/// Verifies a request against an already-resolved secret.
///
/// Pure validation: no side effects. When either header is missing, no hash
/// is computed.
pub fn verify_request(
    secret: &str,
    body: &[u8],
    headers: &Headers,
    now_secs: i64,
    tolerance: Duration,
    signature_header: &str,
    timestamp_header: &str,
) -> AuthenticityResult<()> {
    let (Some(signature), Some(timestamp_raw)) =
        (headers.get(signature_header), headers.get(timestamp_header))
    else {
        return Err(AuthenticityError::MissingHeaders);
    };

    let timestamp: i64 = timestamp_raw
        .trim()
        .parse()
        .map_err(|_| AuthenticityError::InvalidTimestamp(timestamp_raw.to_string()))?;

    let cutoff = now_secs - tolerance.as_secs() as i64;
    if timestamp < cutoff {
        return Err(AuthenticityError::StaleTimestamp { timestamp, cutoff });
    }

    let (version, digest) =
        parse_signature(signature).ok_or(AuthenticityError::SignatureMismatch)?;
    let expected = hex::decode(digest).map_err(|_| AuthenticityError::SignatureMismatch)?;

    signing_mac(secret, version, timestamp_raw.trim(), body)
        .verify_slice(&expected)
        .map_err(|_| AuthenticityError::SignatureMismatch)
}

// =============================================================================
// SignatureVerifier
// =============================================================================

/// Verifies request signatures with a configurable secret source.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: BoxedSecretProvider,
    tolerance: Duration,
    signature_header: String,
    timestamp_header: String,
}

impl SignatureVerifier {
    /// Creates a verifier with the default header names and a 300 s window.
    pub fn new(secret: impl SecretProvider + 'static) -> Self {
        Self::from_provider(Arc::new(secret))
    }

    /// Creates a verifier from a shared secret provider.
    pub fn from_provider(secret: BoxedSecretProvider) -> Self {
        Self {
            secret,
            tolerance: DEFAULT_TOLERANCE,
            signature_header: SIGNATURE_HEADER.to_string(),
            timestamp_header: TIMESTAMP_HEADER.to_string(),
        }
    }

    /// Sets the replay window.
    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Overrides the header names.
    pub fn header_names(
        mut self,
        signature: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        self.signature_header = signature.into();
        self.timestamp_header = timestamp.into();
        self
    }

    /// Verifies `body` and `headers` as of `now_secs`.
    ///
    /// The secret provider is only awaited once both headers are present.
    pub async fn verify(&self, body: &[u8], headers: &Headers, now_secs: i64) -> AuthenticityResult<()> {
        if headers.get(&self.signature_header).is_none()
            || headers.get(&self.timestamp_header).is_none()
        {
            return Err(AuthenticityError::MissingHeaders);
        }

        let secret = self
            .secret
            .signing_secret()
            .await
            .map_err(AuthenticityError::SecretUnavailable)?;

        trace!(body_len = body.len(), "Verifying request signature");

        verify_request(
            &secret,
            body,
            headers,
            now_secs,
            self.tolerance,
            &self.signature_header,
            &self.timestamp_header,
        )
    }

    /// Verifies against the system clock.
    pub async fn verify_now(&self, body: &[u8], headers: &Headers) -> AuthenticityResult<()> {
        self.verify(body, headers, unix_now()).await
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .field("signature_header", &self.signature_header)
            .field("timestamp_header", &self.timestamp_header)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_531_420_618;
    const BODY: &str = "token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&command=%2Fweather&text=94070";

    fn signed_headers(secret: &str, timestamp: i64, body: &str) -> Headers {
        Headers::new()
            .with(SIGNATURE_HEADER, format_signature_header(secret, timestamp, body.as_bytes()))
            .with(TIMESTAMP_HEADER, timestamp.to_string())
    }

    #[tokio::test]
    async fn test_valid_signature_passes() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = signed_headers(SECRET, NOW, BODY);
        assert_eq!(verifier.verify(BODY.as_bytes(), &headers, NOW).await, Ok(()));
    }

    #[tokio::test]
    async fn test_timestamp_inside_window_passes() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = signed_headers(SECRET, NOW - 299, BODY);
        assert!(verifier.verify(BODY.as_bytes(), &headers, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_flipped_body_character_fails() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = signed_headers(SECRET, NOW, BODY);
        let mut tampered = BODY.as_bytes().to_vec();
        for i in [0, tampered.len() / 2, tampered.len() - 1] {
            let original = tampered[i];
            tampered[i] = original ^ 0x01;
            assert_eq!(
                verifier.verify(&tampered, &headers, NOW).await,
                Err(AuthenticityError::SignatureMismatch)
            );
            tampered[i] = original;
        }
    }

    #[tokio::test]
    async fn test_flipped_digest_character_fails() {
        let verifier = SignatureVerifier::new(SECRET);
        let good = format_signature_header(SECRET, NOW, BODY.as_bytes());
        let last = good.chars().last().unwrap();
        let replacement = if last == '0' { '1' } else { '0' };
        let bad = format!("{}{}", &good[..good.len() - 1], replacement);
        let headers = Headers::new()
            .with(SIGNATURE_HEADER, bad)
            .with(TIMESTAMP_HEADER, NOW.to_string());
        assert_eq!(
            verifier.verify(BODY.as_bytes(), &headers, NOW).await,
            Err(AuthenticityError::SignatureMismatch)
        );
    }

    #[tokio::test]
    async fn test_stale_timestamp_fails_even_with_valid_signature() {
        let verifier = SignatureVerifier::new(SECRET);
        let old = NOW - 301;
        let headers = signed_headers(SECRET, old, BODY);
        assert_eq!(
            verifier.verify(BODY.as_bytes(), &headers, NOW).await,
            Err(AuthenticityError::StaleTimestamp {
                timestamp: old,
                cutoff: NOW - 300
            })
        );
    }

    #[tokio::test]
    async fn test_non_numeric_timestamp_fails() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = Headers::new()
            .with(SIGNATURE_HEADER, "v0=abcd")
            .with(TIMESTAMP_HEADER, "yesterday");
        assert!(matches!(
            verifier.verify(BODY.as_bytes(), &headers, NOW).await,
            Err(AuthenticityError::InvalidTimestamp(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_signature_header_fails() {
        let verifier = SignatureVerifier::new(SECRET);
        for value in ["v0", "v0=", "=abcd", "v0=not-hex"] {
            let headers = Headers::new()
                .with(SIGNATURE_HEADER, value)
                .with(TIMESTAMP_HEADER, NOW.to_string());
            assert_eq!(
                verifier.verify(BODY.as_bytes(), &headers, NOW).await,
                Err(AuthenticityError::SignatureMismatch),
                "header {value:?}"
            );
        }
    }

    struct CountingSecret(Arc<AtomicUsize>);

    #[async_trait]
    impl SecretProvider for CountingSecret {
        async fn signing_secret(&self) -> Result<String, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SECRET.to_string())
        }
    }

    #[tokio::test]
    async fn test_missing_headers_fail_before_secret_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let verifier = SignatureVerifier::new(CountingSecret(Arc::clone(&calls)));

        let only_timestamp = Headers::new().with(TIMESTAMP_HEADER, NOW.to_string());
        let only_signature = Headers::new().with(SIGNATURE_HEADER, "v0=00");

        for headers in [Headers::new(), only_timestamp, only_signature] {
            assert_eq!(
                verifier.verify(BODY.as_bytes(), &headers, NOW).await,
                Err(AuthenticityError::MissingHeaders)
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct FailingSecret;

    #[async_trait]
    impl SecretProvider for FailingSecret {
        async fn signing_secret(&self) -> Result<String, String> {
            Err("vault sealed".to_string())
        }
    }

    #[tokio::test]
    async fn test_secret_provider_failure() {
        let verifier = SignatureVerifier::new(FailingSecret);
        let headers = signed_headers(SECRET, NOW, BODY);
        assert_eq!(
            verifier.verify(BODY.as_bytes(), &headers, NOW).await,
            Err(AuthenticityError::SecretUnavailable("vault sealed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_custom_header_names() {
        let verifier = SignatureVerifier::new(SECRET).header_names("x-sig", "x-ts");
        let headers = Headers::new()
            .with("x-sig", format_signature_header(SECRET, NOW, BODY.as_bytes()))
            .with("x-ts", NOW.to_string());
        assert!(verifier.verify(BODY.as_bytes(), &headers, NOW).await.is_ok());
    }

    #[test]
    fn test_version_prefix_is_part_of_the_base_string() {
        let v0 = compute_signature(SECRET, "v0", "1", b"body");
        let v1 = compute_signature(SECRET, "v1", "1", b"body");
        assert_ne!(v0, v1);
        assert_eq!(v0.len(), 64);
    }
}

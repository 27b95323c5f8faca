//! The raw inbound request as captured by a transport.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

/// Default name of the signature header.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Default name of the request timestamp header.
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
/// Header carrying the number of times the platform has retried this delivery.
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
/// Header carrying why the platform retried this delivery.
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";
/// Standard content type header.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Case-insensitive header map.
///
/// Names are normalised to lowercase on insertion. When a header repeats,
/// the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header unless one with the same name is already present.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .entry(name.as_ref().to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Adds a header (builder pattern).
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no headers are present.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A buffered inbound HTTP request.
///
/// The body is fully buffered before verification starts: HMAC needs the
/// whole raw payload. The request is immutable once captured.
#[derive(Clone)]
pub struct InboundRequest {
    method: String,
    path: String,
    headers: Headers,
    body: Bytes,
}

impl InboundRequest {
    /// Creates a new request.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers,
            body: body.into(),
        }
    }

    /// Convenience constructor for a `POST` request.
    pub fn post(path: impl Into<String>, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self::new("POST", path, headers, body)
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the header map.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE_HEADER)
    }

    /// Returns the platform retry count, if present and numeric.
    pub fn retry_num(&self) -> Option<u32> {
        self.headers
            .get(RETRY_NUM_HEADER)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Returns the platform retry reason, if present.
    pub fn retry_reason(&self) -> Option<&str> {
        self.headers.get(RETRY_REASON_HEADER)
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("content_type", &self.content_type())
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

//! Transport-neutral responses produced by the receiver.

use serde_json::Value;

/// A response body with the content negotiation rules used for both
/// acknowledgement bodies and error responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// Raw text, sent as-is.
    Text(String),
    /// A JSON document.
    Json(Value),
}

impl ResponseBody {
    /// Returns `true` for an empty body (including an empty string).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Returns the content type to send with this body, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(s) if s.is_empty() => None,
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Json(_) => Some("application/json"),
        }
    }

    /// Serialises the body to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Text(s) => s.clone().into_bytes(),
            Self::Json(v) => v.to_string().into_bytes(),
        }
    }
}

impl From<()> for ResponseBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<&str> for ResponseBody {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Value> for ResponseBody {
    /// Strings and `null` follow the text and empty rules; everything else
    /// is sent as JSON.
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

impl<T: Into<ResponseBody>> From<Option<T>> for ResponseBody {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

/// A status code and body, ready for any transport to write.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: ResponseBody,
}

impl ReceiverResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<ResponseBody>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `200` with the given body.
    pub fn ok(body: impl Into<ResponseBody>) -> Self {
        Self::new(200, body)
    }

    /// A bodiless response with the given status.
    pub fn status(status: u16) -> Self {
        Self::new(status, ResponseBody::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_negotiation() {
        assert_eq!(ResponseBody::from(()), ResponseBody::Empty);
        assert_eq!(ResponseBody::from(None::<String>), ResponseBody::Empty);
        assert_eq!(ResponseBody::from("done"), ResponseBody::Text("done".into()));
        assert_eq!(
            ResponseBody::from(json!({"text": "hi"})),
            ResponseBody::Json(json!({"text": "hi"}))
        );
        assert_eq!(ResponseBody::from(json!("plain")), ResponseBody::Text("plain".into()));
    }

    #[test]
    fn test_empty_string_has_no_content_type() {
        let body = ResponseBody::from("");
        assert!(body.is_empty());
        assert_eq!(body.content_type(), None);
        assert!(body.to_bytes().is_empty());
    }

    #[test]
    fn test_json_bytes() {
        let body = ResponseBody::Json(json!({"challenge": "abc"}));
        assert_eq!(body.to_bytes(), br#"{"challenge":"abc"}"#.to_vec());
        assert_eq!(body.content_type(), Some("application/json"));
    }
}

//! Request body decoding.
//!
//! The platform posts two body shapes:
//!
//! - JSON bodies (Events API callbacks)
//! - form-encoded bodies (slash commands, interactive payloads, options),
//!   where rich payloads are nested as a JSON string in a `payload` field
//!
//! Two reserved probes are recognised here as well: the `ssl_check`
//! connectivity probe, which is exempt from signature verification, and the
//! `url_verification` challenge.

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{BodyParsingError, BodyParsingResult};

/// The form-encoded content type.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// The JSON content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body encodings understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/x-www-form-urlencoded`.
    Form,
    /// JSON, or any unrecognised/absent content type.
    Json,
}

impl BodyKind {
    /// Classifies a `content-type` header value, ignoring parameters.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());
        match essence.as_deref() {
            Some(FORM_CONTENT_TYPE) => Self::Form,
            _ => Self::Json,
        }
    }
}

/// A reserved request that is answered without dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Connectivity check; answered with an empty `200`.
    SslCheck,
    /// URL ownership challenge; answered with `{"challenge": ...}`.
    UrlVerification {
        /// The challenge value to echo back.
        challenge: String,
    },
}

/// Stateless body decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyCodec;

impl BodyCodec {
    /// Decodes `raw` according to `content_type`.
    ///
    /// Form bodies decode to a flat object of strings, unless they carry a
    /// string `payload` field, in which case that field is parsed as JSON and
    /// returned instead. Every other content type is parsed as JSON.
    pub fn decode(raw: &[u8], content_type: Option<&str>) -> BodyParsingResult<Value> {
        match BodyKind::from_content_type(content_type) {
            BodyKind::Form => {
                let fields = decode_form(raw)?;
                match fields.get("payload") {
                    Some(Value::String(nested)) => Ok(serde_json::from_str(nested)?),
                    _ => Ok(Value::Object(fields)),
                }
            }
            BodyKind::Json => {
                let text = std::str::from_utf8(raw).map_err(|_| BodyParsingError::InvalidUtf8)?;
                Ok(serde_json::from_str(text)?)
            }
        }
    }

    /// Returns `true` if the request is the connectivity probe, which
    /// predates signed requests and skips verification entirely.
    ///
    /// A form body that also carries a `payload` field is never a probe.
    pub fn should_bypass_verification(raw: &[u8], content_type: Option<&str>) -> bool {
        if BodyKind::from_content_type(content_type) != BodyKind::Form {
            return false;
        }
        let mut ssl_check = false;
        for (key, value) in form_urlencoded::parse(raw) {
            match key.as_ref() {
                "payload" => return false,
                "ssl_check" if !ssl_check => ssl_check = is_truthy(&value),
                _ => {}
            }
        }
        ssl_check
    }

    /// Detects a reserved probe in an already-decoded body.
    pub fn probe(body: &Value) -> Option<Probe> {
        if body.get("ssl_check").is_some_and(is_truthy_value) {
            return Some(Probe::SslCheck);
        }
        if body.get("type").and_then(Value::as_str) == Some("url_verification") {
            let challenge = match body.get("challenge") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            return Some(Probe::UrlVerification { challenge });
        }
        None
    }
}

fn decode_form(raw: &[u8]) -> BodyParsingResult<Map<String, Value>> {
    // Form bodies must be valid UTF-8 after percent-decoding; reject early.
    std::str::from_utf8(raw).map_err(|_| BodyParsingError::InvalidUtf8)?;

    let mut fields = Map::new();
    for (key, value) in form_urlencoded::parse(raw) {
        if key.is_empty() {
            return Err(BodyParsingError::Form("empty field name".to_string()));
        }
        fields
            .entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    Ok(fields)
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false")
}

fn is_truthy_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => is_truthy(s),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FORM: Option<&str> = Some(FORM_CONTENT_TYPE);
    const JSON: Option<&str> = Some(JSON_CONTENT_TYPE);

    #[test]
    fn test_content_type_classification() {
        assert_eq!(BodyKind::from_content_type(FORM), BodyKind::Form);
        assert_eq!(
            BodyKind::from_content_type(Some("Application/X-WWW-Form-Urlencoded; charset=utf-8")),
            BodyKind::Form
        );
        assert_eq!(BodyKind::from_content_type(JSON), BodyKind::Json);
        assert_eq!(BodyKind::from_content_type(Some("text/plain")), BodyKind::Json);
        assert_eq!(BodyKind::from_content_type(None), BodyKind::Json);
    }

    #[test]
    fn test_form_decodes_to_flat_map() {
        let body = b"command=%2Fdeploy&text=prod+now&team_id=T1";
        let value = BodyCodec::decode(body, FORM).unwrap();
        assert_eq!(
            value,
            json!({"command": "/deploy", "text": "prod now", "team_id": "T1"})
        );
    }

    #[test]
    fn test_form_payload_field_is_parsed_as_json() {
        let payload = r#"{"type":"block_actions","actions":[{"action_id":"approve"}]}"#;
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", payload)
            .finish();
        let value = BodyCodec::decode(body.as_bytes(), FORM).unwrap();
        assert_eq!(value["type"], "block_actions");
        assert_eq!(value["actions"][0]["action_id"], "approve");
    }

    #[test]
    fn test_malformed_nested_payload_is_a_parse_error() {
        let value = BodyCodec::decode(b"payload=%7Bnot-json", FORM);
        assert!(matches!(value, Err(BodyParsingError::Json(_))));
    }

    #[test]
    fn test_json_body() {
        let value = BodyCodec::decode(br#"{"type":"event_callback"}"#, JSON).unwrap();
        assert_eq!(value, json!({"type": "event_callback"}));
    }

    #[test]
    fn test_missing_content_type_defaults_to_json() {
        assert!(BodyCodec::decode(br#"{"a":1}"#, None).is_ok());
        assert!(BodyCodec::decode(b"a=1", None).is_err());
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            BodyCodec::decode(b"{\"type\":", JSON),
            Err(BodyParsingError::Json(_))
        ));
        assert!(matches!(
            BodyCodec::decode(&[0xff, 0xfe], JSON),
            Err(BodyParsingError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let body = b"command=%2Fweather&text=94070&user_id=U1";
        let first = BodyCodec::decode(body, FORM).unwrap();
        let second = BodyCodec::decode(body, FORM).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ssl_check_bypass() {
        assert!(BodyCodec::should_bypass_verification(b"ssl_check=1&token=x", FORM));
        assert!(!BodyCodec::should_bypass_verification(b"ssl_check=0", FORM));
        assert!(!BodyCodec::should_bypass_verification(b"ssl_check=", FORM));
        assert!(!BodyCodec::should_bypass_verification(b"command=%2Fx", FORM));
        assert!(!BodyCodec::should_bypass_verification(br#"{"ssl_check":1}"#, JSON));
    }

    #[test]
    fn test_ssl_check_with_payload_is_not_bypassed() {
        let body = br#"ssl_check=1&payload=%7B%22type%22%3A%22block_actions%22%7D"#;
        assert!(!BodyCodec::should_bypass_verification(body, FORM));
        assert!(!BodyCodec::should_bypass_verification(
            br#"payload=%7B%7D&ssl_check=1"#,
            FORM
        ));
    }

    #[test]
    fn test_probe_detection() {
        let ssl = BodyCodec::decode(b"ssl_check=1", FORM).unwrap();
        assert_eq!(BodyCodec::probe(&ssl), Some(Probe::SslCheck));

        let challenge = json!({"type": "url_verification", "challenge": "abc"});
        assert_eq!(
            BodyCodec::probe(&challenge),
            Some(Probe::UrlVerification {
                challenge: "abc".to_string()
            })
        );

        assert_eq!(BodyCodec::probe(&json!({"type": "event_callback"})), None);
    }
}

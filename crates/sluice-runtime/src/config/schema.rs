//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sluice_core::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use sluice_framework::DispatcherConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SluiceConfig {
    /// Request verification and acknowledgement settings.
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Single-workspace credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Receiver
// =============================================================================

/// Request verification and acknowledgement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Shared secret used to verify request signatures.
    pub signing_secret: Option<String>,
    /// Verify request signatures.
    pub signature_verification: bool,
    /// Replay window for request timestamps, in seconds.
    pub timestamp_tolerance_secs: u64,
    /// Write acknowledgements only after all middleware finished.
    pub process_before_response: bool,
    /// Time a request may stay unacknowledged, in milliseconds.
    pub unhandled_request_timeout_ms: u64,
    /// Same, for custom function executions.
    pub function_unhandled_request_timeout_ms: u64,
    /// Drop events authored by the app itself.
    pub ignore_self: bool,
    /// Acknowledge custom function executions automatically.
    pub function_auto_acknowledge: bool,
    /// Name of the signature header.
    pub signature_header: String,
    /// Name of the timestamp header.
    pub timestamp_header: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            signature_verification: true,
            timestamp_tolerance_secs: 300,
            process_before_response: false,
            unhandled_request_timeout_ms: 3001,
            function_unhandled_request_timeout_ms: 5001,
            ignore_self: true,
            function_auto_acknowledge: true,
            signature_header: SIGNATURE_HEADER.to_string(),
            timestamp_header: TIMESTAMP_HEADER.to_string(),
        }
    }
}

impl ReceiverConfig {
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }

    /// Converts to the dispatcher's configuration.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            signature_verification: self.signature_verification,
            process_before_response: self.process_before_response,
            unhandled_request_timeout: Duration::from_millis(self.unhandled_request_timeout_ms),
            function_unhandled_request_timeout: Duration::from_millis(
                self.function_unhandled_request_timeout_ms,
            ),
            ignore_self: self.ignore_self,
            function_auto_acknowledge: self.function_auto_acknowledge,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Paths accepting event deliveries.
    pub paths: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            paths: vec!["/slack/events".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Credentials for single-workspace authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bot_token: Option<String>,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
}

// =============================================================================
// Logging
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Output destination.
    pub output: LogOutput,
    /// Span lifecycle events to log.
    pub span_events: SpanEventConfig,
    /// Include thread ids.
    pub thread_ids: bool,
    /// Include file names and line numbers.
    pub file_location: bool,
    /// Log file path, used with [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    /// Per-target levels, e.g. `sluice_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Span lifecycle events to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_defaults() {
        let config = ReceiverConfig::default();
        assert!(config.signature_verification);
        assert_eq!(config.timestamp_tolerance(), Duration::from_secs(300));

        let dispatcher = config.to_dispatcher_config();
        assert_eq!(dispatcher, DispatcherConfig::default());
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(ServerConfig::default().addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: SluiceConfig = serde_json::from_value(serde_json::json!({
            "receiver": {"process_before_response": true},
            "logging": {"level": "debug", "filters": {"sluice_framework": "trace"}}
        }))
        .unwrap();

        assert!(config.receiver.process_before_response);
        assert_eq!(config.receiver.unhandled_request_timeout_ms, 3001);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.filters["sluice_framework"], LogLevel::Trace);
        assert_eq!(config.server.paths, vec!["/slack/events"]);
    }
}

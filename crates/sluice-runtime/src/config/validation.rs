//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ReceiverConfig, ServerConfig, SluiceConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SluiceConfig) -> ConfigResult<()> {
    validate_receiver_config(&config.receiver)?;
    validate_server_config(&config.server)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_receiver_config(receiver: &ReceiverConfig) -> ConfigResult<()> {
    if receiver.signature_verification
        && receiver
            .signing_secret
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
    {
        return Err(ConfigError::missing_field("receiver.signing_secret"));
    }

    if receiver.timestamp_tolerance_secs == 0 {
        return Err(ConfigError::validation(
            "Timestamp tolerance must be greater than 0",
        ));
    }

    if receiver.unhandled_request_timeout_ms == 0
        || receiver.function_unhandled_request_timeout_ms == 0
    {
        return Err(ConfigError::validation(
            "Unhandled request timeouts must be greater than 0",
        ));
    }

    for (field, name) in [
        ("receiver.signature_header", &receiver.signature_header),
        ("receiver.timestamp_header", &receiver.timestamp_header),
    ] {
        if name.trim().is_empty() {
            return Err(ConfigError::missing_field(field));
        }
    }

    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }

    if server.paths.is_empty() {
        return Err(ConfigError::missing_field("server.paths"));
    }

    let mut seen = HashSet::new();
    for path in &server.paths {
        validate_path(path)?;
        if !seen.insert(path.as_str()) {
            return Err(ConfigError::validation(format!(
                "Path is listed more than once: {path}"
            )));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates a path.
fn validate_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::validation(format!(
            "Path must start with '/': {path}"
        )));
    }
    Ok(())
}

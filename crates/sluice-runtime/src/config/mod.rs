//! Layered configuration: defaults, files, environment and code.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AuthConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ReceiverConfig, ServerConfig,
    SluiceConfig, SpanEventConfig,
};
pub use validation::validate_config;

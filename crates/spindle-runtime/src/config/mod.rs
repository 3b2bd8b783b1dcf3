//! Configuration module for the Spindle runtime.
//!
//! Layered TOML/YAML/environment loading for application options and logging,
//! plus validation of the loaded values.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig, SpindleConfig,
};
pub use validation::{validate_config, validate_options};

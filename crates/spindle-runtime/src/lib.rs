//! Spindle Runtime - application facade for the Spindle handler loader.
//!
//! This crate provides:
//! - The [`Application`] facade (`on`, `once`, `run`)
//! - Layered configuration loading ([`ConfigLoader`])
//! - Logging setup ([`LoggingBuilder`], [`logging::init_from_config`])
//!
//! ```ignore
//! use std::sync::Arc;
//! use spindle_core::{EventBus, FunctionRegistry, ManifestLoader};
//! use spindle_runtime::{Application, ConfigLoader, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let bus = Arc::new(EventBus::new());
//!     let loader = ManifestLoader::new(FunctionRegistry::new());
//!     let mut app = Application::from_config(Arc::clone(&bus), loader, &config)?;
//!     app.on("ping", "handlers", None)?;
//!
//!     bus.emit("ping", vec![serde_json::json!(42)]).await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod config;
pub mod logging;

// Re-exports
pub use application::{Application, ApplicationBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, SpindleConfig};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

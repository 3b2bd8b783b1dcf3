//! # Spindle
//!
//! Wire event handlers stored as files on disk to an event-emitting client.
//!
//! Point an [`Application`](runtime::Application) at a directory. Every file
//! whose loaded artifact is a handler, either a function named after the
//! `code` key or a record with a callable `code` field, is cached per event
//! and invoked, in a stable order, each time the client fires that event.
//!
//! ```text
//! handlers/            on("ping", "handlers")          bus.emit("ping", [42])
//! ├── a.toml   ──┐    ┌──────────────────────┐        ┌──────────────────────┐
//! └── b.toml   ──┴──▶ │ scan → filter → cache│ ─────▶ │ a(42) then b(42)     │
//!                     └──────────────────────┘        └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spindle::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = FunctionRegistry::new().with(
//!         "code",
//!         into_code(|args| async move {
//!             println!("pong {args:?}");
//!             Ok(())
//!         }),
//!     );
//!
//!     let bus = Arc::new(EventBus::new());
//!     let mut app = Application::builder()
//!         .client(Arc::clone(&bus))
//!         .loader(ManifestLoader::new(registry))
//!         .build()?;
//!
//!     app.on("ping", "handlers", None)?;
//!     bus.emit("ping", vec![serde_json::json!(42)]).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `spindle.toml` configuration files
//! - `yaml-config`: `spindle.yaml` configuration files
//! - `json-log`: JSON log output

pub use spindle_core as core;
pub use spindle_runtime as runtime;

/// Commonly used types.
///
/// ```rust,ignore
/// use spindle::prelude::*;
/// ```
pub mod prelude {
    // Entry point
    pub use spindle_runtime::{Application, ConfigLoader, LoggingBuilder, SpindleConfig};

    // Event clients
    pub use spindle_core::{Emitter, EventBus, ListenerId, Mode};

    // Loaders and handler code
    pub use spindle_core::{
        FunctionRegistry, HandlerArtifact, HandlerResult, Loader, ManifestLoader, Record,
        StaticLoader, into_code, sync_code,
    };

    // Registration callbacks
    pub use spindle_core::{Callback, Firing, callback};

    // Errors
    pub use spindle_core::{ErrorKind, SpindleResult, UnexpectedError};
}

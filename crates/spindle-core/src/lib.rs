//! # Spindle Core
//!
//! The engine behind Spindle: it wires handler files on disk to an
//! event-emitting client.
//!
//! ## Pipeline
//!
//! - **Scanner**: recursive, sorted file listing with a suffix filter ([`scan`])
//! - **Loader**: turns a path into a [`HandlerArtifact`] ([`Loader`],
//!   [`ManifestLoader`], [`StaticLoader`])
//! - **Filter**: the structural handler contract ([`qualifies`], [`extract`],
//!   [`resolve_target`])
//! - **Cache**: `mode → event → path → descriptor`, built once per event
//!   ([`EventCache`])
//! - **Dispatcher**: one route per subscribed `(mode, event)`, invoking
//!   handlers in cache order ([`Dispatcher`])
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌────────┐   ┌───────┐   ┌────────────┐
//! │ Scanner │──▶│ Loader │──▶│ Filter │──▶│ Cache │──▶│ Dispatcher │──▶ Emitter
//! └─────────┘   └────────┘   └────────┘   └───────┘   └────────────┘
//! ```
//!
//! The [`Application`](https://docs.rs/spindle-runtime) facade living in
//! `spindle-runtime` drives this pipeline; most users never touch these types
//! directly.

pub mod artifact;
pub mod cache;
pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod loader;
pub mod options;
pub mod scanner;

pub use artifact::{
    BoxedCode, Code, CodeFn, Field, HandlerArtifact, HandlerResult, NamedCode, Record, into_code,
    sync_code,
};
pub use cache::{EventCache, HandlerDescriptor, SharedCache};
pub use dispatcher::{Callback, Dispatcher, Firing, Route, callback};
pub use emitter::{BoxedListener, Emitter, EventBus, ListenerId, Mode, listener};
pub use error::{ErrorKind, LoadError, ScanError, SpindleResult, UnexpectedError};
pub use filter::{code_of, discover, extract, qualifies, resolve_target};
pub use loader::{BoxedLoader, FUNCTION_KEY, FunctionRegistry, Loader, ManifestLoader, StaticLoader};
pub use options::{CacheDriver, CacheOptions, FilterOptions, Nomenclature, Options, deep_merge};
pub use scanner::scan;

pub use futures::future::BoxFuture;

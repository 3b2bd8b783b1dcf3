//! Turning handler files into [`HandlerArtifact`]s.
//!
//! The [`Loader`] trait is the seam between the filesystem and the handler
//! cache. Two implementations ship with the crate:
//!
//! - [`ManifestLoader`] reads TOML manifests and resolves function references
//!   against a [`FunctionRegistry`] of named Rust functions.
//! - [`StaticLoader`] serves pre-built artifacts from memory, keyed by path.
//!
//! # Manifest format
//!
//! An inline table of the form `{ fn = "name" }` is a function reference.
//! A manifest containing nothing but `fn = "name"` exports that function
//! directly; any other manifest is a record.
//!
//! ```toml
//! # greet.toml – a record handler
//! name = "greeter"
//! code = { fn = "greet" }
//!
//! [data]
//! event = "ping"
//! once = false
//! ```
//!
//! ```toml
//! # bare.toml – a bare function export
//! fn = "code"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::artifact::{BoxedCode, Field, HandlerArtifact, NamedCode, Record};
use crate::error::LoadError;

/// Key marking a function reference in a manifest.
pub const FUNCTION_KEY: &str = "fn";

/// Resolves a handler file into an artifact.
pub trait Loader: Send + Sync + 'static {
    /// Loads the artifact stored at `path`.
    fn load(&self, path: &Path) -> Result<HandlerArtifact, LoadError>;
}

/// Shared handle to a loader.
pub type BoxedLoader = Arc<dyn Loader>;

impl<L: Loader + ?Sized> Loader for Arc<L> {
    fn load(&self, path: &Path) -> Result<HandlerArtifact, LoadError> {
        (**self).load(path)
    }
}

// ============================================================================
// StaticLoader
// ============================================================================

/// Serves artifacts registered in memory.
///
/// Entries may be replaced at any time; with the handler cache disabled the
/// replacement is picked up on the next firing.
#[derive(Default)]
pub struct StaticLoader {
    artifacts: RwLock<HashMap<PathBuf, HandlerArtifact>>,
}

impl StaticLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an artifact (builder pattern).
    pub fn with(self, path: impl Into<PathBuf>, artifact: impl Into<HandlerArtifact>) -> Self {
        self.insert(path, artifact);
        self
    }

    /// Registers or replaces an artifact.
    pub fn insert(&self, path: impl Into<PathBuf>, artifact: impl Into<HandlerArtifact>) {
        self.artifacts.write().insert(path.into(), artifact.into());
    }

    /// Removes an artifact.
    pub fn remove(&self, path: &Path) -> Option<HandlerArtifact> {
        self.artifacts.write().remove(path)
    }
}

impl Loader for StaticLoader {
    fn load(&self, path: &Path) -> Result<HandlerArtifact, LoadError> {
        self.artifacts
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotRegistered(path.to_path_buf()))
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLoader")
            .field("artifacts", &self.artifacts.read().len())
            .finish()
    }
}

// ============================================================================
// FunctionRegistry
// ============================================================================

/// Named functions that manifests may reference.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, BoxedCode>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function (builder pattern).
    pub fn with(mut self, name: impl Into<String>, code: BoxedCode) -> Self {
        self.register(name, code);
        self
    }

    /// Registers or replaces a function.
    pub fn register(&mut self, name: impl Into<String>, code: BoxedCode) {
        self.functions.insert(name.into(), code);
    }

    /// Looks up a function.
    pub fn get(&self, name: &str) -> Option<&BoxedCode> {
        self.functions.get(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    fn resolve(&self, name: &str) -> Result<BoxedCode, LoadError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::UnknownFunction(name.to_string()))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// ManifestLoader
// ============================================================================

/// Loads TOML handler manifests.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    registry: FunctionRegistry,
}

impl ManifestLoader {
    /// Creates a loader resolving functions against `registry`.
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    /// The registry used for function references.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Parses manifest text.
    pub fn parse(&self, text: &str) -> Result<HandlerArtifact, LoadError> {
        let table: toml::Table = toml::from_str(text)?;

        if let Some(name) = function_ref(&table) {
            let code = self.registry.resolve(name)?;
            return Ok(HandlerArtifact::Callable(NamedCode::new(name, code)));
        }

        let mut record = Record::new();
        for (key, value) in table {
            let reference = match &value {
                toml::Value::Table(inner) => function_ref(inner).map(str::to_owned),
                _ => None,
            };
            let field = match reference {
                Some(name) => Field::Code(self.registry.resolve(&name)?),
                None => Field::Value(to_json(value)),
            };
            record.insert(key, field);
        }
        Ok(HandlerArtifact::Record(record))
    }
}

impl Loader for ManifestLoader {
    fn load(&self, path: &Path) -> Result<HandlerArtifact, LoadError> {
        let text = fs::read_to_string(path)?;
        let artifact = self.parse(&text)?;
        trace!(path = %path.display(), shape = artifact.shape(), "Loaded manifest");
        Ok(artifact)
    }
}

/// Returns the referenced function name when `table` is exactly `{ fn = "…" }`.
fn function_ref(table: &toml::Table) -> Option<&str> {
    if table.len() != 1 {
        return None;
    }
    table.get(FUNCTION_KEY).and_then(toml::Value::as_str)
}

fn to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

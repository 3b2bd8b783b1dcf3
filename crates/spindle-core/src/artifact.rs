//! Handler artifacts and callable code.
//!
//! A [`HandlerArtifact`] is the value a [`Loader`](crate::loader::Loader)
//! produces for one file. It is a closed set of shapes, classified once when
//! the file is loaded:
//!
//! - [`HandlerArtifact::Callable`] – a bare function with an identity name
//! - [`HandlerArtifact::Record`] – a key/value object whose fields are plain
//!   values or functions
//! - [`HandlerArtifact::Value`] – anything else
//!
//! Functions are type-erased behind [`Code`], similar to how handler functions
//! are erased into boxed handlers: every call receives the firing payload
//! followed by the extra parameters and returns a boxed future.
//!
//! ```rust,ignore
//! use spindle_core::artifact::{into_code, HandlerArtifact, NamedCode, Record};
//!
//! let greet = into_code(|args| async move {
//!     println!("greeting {:?}", args);
//!     Ok(())
//! });
//!
//! let record = Record::new()
//!     .with_code("code", greet.clone())
//!     .with_value("name", "greeter");
//! let artifact = HandlerArtifact::Record(record);
//! ```

use std::fmt;
use std::future::{self, Future};
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;

/// Result returned by handler code.
pub type HandlerResult = anyhow::Result<()>;

// ============================================================================
// Code
// ============================================================================

/// Type-erased handler code.
pub trait Code: Send + Sync {
    /// Invokes the code with `payload ++ extra_params`.
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

/// Shared handle to handler code.
pub type BoxedCode = Arc<dyn Code>;

/// Wraps an async closure so it can be stored as [`Code`].
pub struct CodeFn<F> {
    f: F,
}

impl<F, Fut> Code for CodeFn<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(args))
    }
}

/// Converts an async closure into [`BoxedCode`].
pub fn into_code<F, Fut>(f: F) -> BoxedCode
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(CodeFn { f })
}

/// Converts a synchronous closure into [`BoxedCode`].
pub fn sync_code<F>(f: F) -> BoxedCode
where
    F: Fn(Vec<Value>) -> HandlerResult + Send + Sync + 'static,
{
    into_code(move |args| future::ready(f(args)))
}

/// A function together with its identity name.
#[derive(Clone)]
pub struct NamedCode {
    name: String,
    code: BoxedCode,
}

impl NamedCode {
    /// Creates a named function.
    pub fn new(name: impl Into<String>, code: BoxedCode) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }

    /// The function's identity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The callable.
    pub fn code(&self) -> &BoxedCode {
        &self.code
    }
}

impl fmt::Debug for NamedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCode").field("name", &self.name).finish()
    }
}

// ============================================================================
// Record
// ============================================================================

/// A single record field.
#[derive(Clone)]
pub enum Field {
    /// Plain data.
    Value(Value),
    /// A callable.
    Code(BoxedCode),
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Code(_) => f.write_str("Code(..)"),
        }
    }
}

/// A key/value artifact. Field order follows insertion.
#[derive(Clone, Default, Debug)]
pub struct Record {
    fields: IndexMap<String, Field>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data field (builder pattern).
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, Field::Value(value.into()));
        self
    }

    /// Adds a code field (builder pattern).
    pub fn with_code(mut self, key: impl Into<String>, code: BoxedCode) -> Self {
        self.insert(key, Field::Code(code));
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) {
        self.fields.insert(key.into(), field);
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Looks up a data field.
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            Some(Field::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Looks up a code field.
    pub fn code(&self, key: &str) -> Option<&BoxedCode> {
        match self.fields.get(key) {
            Some(Field::Code(code)) => Some(code),
            _ => None,
        }
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// HandlerArtifact
// ============================================================================

/// The loaded contents of one handler file.
#[derive(Clone, Debug)]
pub enum HandlerArtifact {
    /// A bare function.
    Callable(NamedCode),
    /// A key/value object.
    Record(Record),
    /// Any other value (arrays, scalars, null, plain objects).
    Value(Value),
}

impl HandlerArtifact {
    /// Shorthand for a named callable artifact.
    pub fn callable(name: impl Into<String>, code: BoxedCode) -> Self {
        Self::Callable(NamedCode::new(name, code))
    }

    /// Short description used in logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Callable(_) => "callable",
            Self::Record(_) => "record",
            Self::Value(_) => "value",
        }
    }
}

impl From<Record> for HandlerArtifact {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<NamedCode> for HandlerArtifact {
    fn from(code: NamedCode) -> Self {
        Self::Callable(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_into_code_receives_args() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let code = into_code(move |args| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().extend(args);
                Ok(())
            }
        });

        code.call(vec![json!(1), json!("x")]).await.unwrap();
        assert_eq!(*seen.lock(), vec![json!(1), json!("x")]);
    }

    #[tokio::test]
    async fn test_sync_code_propagates_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let code = sync_code(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("nope")
        });

        assert!(code.call(Vec::new()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_record_field_lookup() {
        let record = Record::new()
            .with_code("code", sync_code(|_| Ok(())))
            .with_value("name", "beta")
            .with_value("data", json!({"x": 1}));

        assert!(record.code("code").is_some());
        assert!(record.code("name").is_none());
        assert_eq!(record.value("name"), Some(&json!("beta")));
        assert!(record.value("code").is_none());
        assert_eq!(record.keys().collect::<Vec<_>>(), ["code", "name", "data"]);
    }
}

//! Error types for the Spindle core.
//!
//! Every public fallible operation on the registration path returns
//! [`UnexpectedError`], which wraps one [`ErrorKind`] and exposes it as its
//! `source()`. Lower-level failures ([`ScanError`], [`LoadError`]) are carried
//! inside the kinds that produced them.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::emitter::Mode;

// =============================================================================
// Scan Errors
// =============================================================================

/// Errors produced while walking a handler directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root path does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The root path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Any other I/O failure during the walk.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// The entry being read when the failure happened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors raised by a [`Loader`](crate::loader::Loader).
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read handler file: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest is not valid TOML.
    #[error("failed to parse handler manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// A manifest referenced a function the registry does not know.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A static loader has nothing registered for the path.
    #[error("no artifact registered for '{}'", .0.display())]
    NotRegistered(PathBuf),

    /// Loader-specific failure.
    #[error("{0}")]
    Custom(String),
}

impl LoadError {
    /// Creates a loader-specific error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

// =============================================================================
// Registration / Dispatch Errors
// =============================================================================

/// The concrete failure wrapped by an [`UnexpectedError`].
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The application was built without an event client.
    #[error("missing client")]
    MissingClient,

    /// The application was built without a handler loader.
    #[error("missing loader")]
    MissingLoader,

    /// The client cannot serve the requested subscription mode.
    #[error("client does not support '{mode}' subscriptions")]
    InvalidClientProvided {
        /// The mode that was requested.
        mode: Mode,
    },

    /// Options were explicitly `null`.
    #[error("missing options")]
    MissingOptions,

    /// Options were not a JSON object.
    #[error("invalid options: expected an object, got {found}")]
    InvalidOptionsProvided {
        /// JSON type name of the rejected value.
        found: &'static str,
    },

    /// A user option does not match the type of its default.
    #[error("invalid option '{key}': expected {expected}, got {found}")]
    InvalidOptionProvided {
        /// Dotted path of the offending key.
        key: String,
        /// JSON type name of the default.
        expected: &'static str,
        /// JSON type name of the user value.
        found: &'static str,
    },

    /// Merged options could not be decoded.
    #[error("failed to decode options: {0}")]
    Options(#[source] serde_json::Error),

    /// The event name was empty.
    #[error("missing event")]
    MissingEvent,

    /// The event name is not usable.
    #[error("invalid event '{event}': {reason}")]
    InvalidEventProvided {
        /// The rejected event name.
        event: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Neither a path nor a callback was given.
    #[error("missing path")]
    MissingPath,

    /// The path could not be scanned.
    #[error("invalid path '{}'", path.display())]
    InvalidPathProvided {
        /// The path given by the caller.
        path: PathBuf,
        /// Scanner failure.
        #[source]
        source: ScanError,
    },

    /// A handler file could not be loaded.
    #[error("failed to load '{}'", path.display())]
    Load {
        /// The file that failed.
        path: PathBuf,
        /// Loader failure.
        #[source]
        source: LoadError,
    },

    /// A handler failed while an event was being dispatched.
    #[error("handler '{}' failed on event '{event}'", path.display())]
    Reading {
        /// The event being dispatched.
        event: String,
        /// The handler file whose code failed.
        path: PathBuf,
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },
}

/// Outer error returned by every public registration and dispatch operation.
///
/// The wrapped [`ErrorKind`] is preserved as the error's source.
#[derive(Debug, Error)]
#[error("unexpected error: {kind}")]
pub struct UnexpectedError {
    #[from]
    kind: ErrorKind,
}

impl UnexpectedError {
    /// Returns the wrapped failure.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consumes the error and returns the wrapped failure.
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }
}

/// Result type for registration and dispatch.
pub type SpindleResult<T> = Result<T, UnexpectedError>;

/// Returns the JSON type name used in option errors.
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_unexpected_preserves_cause() {
        let err = UnexpectedError::from(ErrorKind::MissingEvent);
        assert!(matches!(err.kind(), ErrorKind::MissingEvent));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("missing event"));
    }

    #[test]
    fn test_reading_error_chains_handler_error() {
        let err = UnexpectedError::from(ErrorKind::Reading {
            event: "ping".into(),
            path: PathBuf::from("h/a.toml"),
            source: anyhow::anyhow!("boom"),
        });
        let kind = err.source().expect("kind");
        let handler = kind.source().expect("handler error");
        assert_eq!(handler.to_string(), "boom");
    }
}

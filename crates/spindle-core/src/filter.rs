//! The structural handler contract.
//!
//! An artifact qualifies as a handler when it is
//!
//! - a [`Callable`](HandlerArtifact::Callable) whose identity name equals the
//!   configured `code` key, or
//! - a [`Record`](HandlerArtifact::Record) whose `code` field is callable.
//!
//! Everything here is pure except [`discover`], which drives the scanner and
//! the loader.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::artifact::{BoxedCode, HandlerArtifact, Record};
use crate::cache::HandlerDescriptor;
use crate::emitter::Mode;
use crate::error::ErrorKind;
use crate::loader::Loader;
use crate::options::Nomenclature;
use crate::scanner;

/// Whether `artifact` satisfies the handler contract.
pub fn qualifies(artifact: &HandlerArtifact, nomenclature: &Nomenclature) -> bool {
    code_of(artifact, nomenclature).is_some()
}

/// Returns the callable of a qualifying artifact.
pub fn code_of<'a>(artifact: &'a HandlerArtifact, nomenclature: &Nomenclature) -> Option<&'a BoxedCode> {
    match artifact {
        HandlerArtifact::Callable(named) if named.name() == nomenclature.code => Some(named.code()),
        HandlerArtifact::Record(record) => record.code(&nomenclature.code),
        _ => None,
    }
}

/// Builds the descriptor for a qualifying artifact.
///
/// The display name is the record's `name` field when it is a string, and the
/// path otherwise. Returns `None` for artifacts that do not qualify.
pub fn extract(
    path: &Path,
    artifact: &HandlerArtifact,
    nomenclature: &Nomenclature,
    event: &str,
    mode: Mode,
) -> Option<HandlerDescriptor> {
    let code = code_of(artifact, nomenclature)?.clone();
    let fallback = || path.display().to_string();

    let (name, data) = match artifact {
        HandlerArtifact::Record(record) => (
            record
                .value(&nomenclature.name)
                .and_then(Value::as_str)
                .map_or_else(fallback, str::to_string),
            record.value(&nomenclature.data).cloned(),
        ),
        _ => (fallback(), None),
    };

    Some(HandlerDescriptor {
        path: path.to_path_buf(),
        name,
        data,
        code,
        event: event.to_string(),
        mode,
    })
}

/// Resolves the `(event, mode)` a handler targets.
///
/// Explicit arguments win. Otherwise a record may declare them itself, first
/// inside its `data` object and then at top level. The first value found is
/// used as-is: the event must be a string and the once flag a boolean, or the
/// handler has no target.
pub fn resolve_target(
    event: Option<&str>,
    mode: Option<Mode>,
    artifact: &HandlerArtifact,
    nomenclature: &Nomenclature,
) -> Option<(String, Mode)> {
    let record = match artifact {
        HandlerArtifact::Record(record) => Some(record),
        _ => None,
    };

    let event = match event {
        Some(event) => event.to_string(),
        None => declared(record?, nomenclature, &nomenclature.event)?
            .as_str()?
            .to_string(),
    };

    let mode = match mode {
        Some(mode) => mode,
        None => Mode::from_once(declared(record?, nomenclature, &nomenclature.once)?.as_bool()?),
    };

    Some((event, mode))
}

fn declared<'a>(record: &'a Record, nomenclature: &Nomenclature, key: &str) -> Option<&'a Value> {
    record
        .value(&nomenclature.data)
        .and_then(|data| data.get(key))
        .filter(|value| !value.is_null())
        .or_else(|| record.value(key))
}

/// Scans `root` and loads every file once, keeping the qualifying handlers in
/// scan order.
///
/// # Errors
///
/// - [`ErrorKind::InvalidPathProvided`] if the scan fails
/// - [`ErrorKind::Load`] on the first file the loader rejects
pub fn discover(
    root: &Path,
    suffix: &str,
    loader: &dyn Loader,
    nomenclature: &Nomenclature,
) -> Result<Vec<(PathBuf, HandlerArtifact)>, ErrorKind> {
    let paths = scanner::scan(root, suffix).map_err(|source| ErrorKind::InvalidPathProvided {
        path: root.to_path_buf(),
        source,
    })?;

    let mut handlers = Vec::with_capacity(paths.len());
    for path in paths {
        let artifact = loader.load(&path).map_err(|source| ErrorKind::Load {
            path: path.clone(),
            source,
        })?;

        if qualifies(&artifact, nomenclature) {
            debug!(path = %path.display(), shape = artifact.shape(), "Found handler");
            handlers.push((path, artifact));
        }
    }

    Ok(handlers)
}

//! Recursive handler-directory scanning.
//!
//! [`scan`] walks a directory depth-first and returns every regular file whose
//! name ends with the requested suffix. Directory entries are sorted by file
//! name before they are visited, so repeated scans of an unchanged tree always
//! yield the same order. That order becomes the dispatch order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::ScanError;

/// Lists every file under `root` whose name ends with `suffix`.
///
/// Directories are always descended into regardless of `suffix`. An empty
/// suffix disables filtering. Symbolic links are resolved but never walked: a
/// link to a file is listed like the file itself, while links to directories
/// and dangling links are skipped.
///
/// # Errors
///
/// - [`ScanError::NotFound`] if `root` does not exist
/// - [`ScanError::NotADirectory`] if `root` is not a directory
/// - [`ScanError::Io`] if any directory below `root` cannot be listed
pub fn scan(root: &Path, suffix: &str) -> Result<Vec<PathBuf>, ScanError> {
    let metadata = match fs::metadata(root) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::NotFound(root.to_path_buf()));
        }
        Err(err) => return Err(ScanError::io(root, err)),
    };

    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(root, suffix, &mut files)?;

    debug!(root = %root.display(), suffix, files = files.len(), "Scanned handler directory");
    Ok(files)
}

fn walk(dir: &Path, suffix: &str, out: &mut Vec<PathBuf>) -> Result<(), ScanError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|err| ScanError::io(dir, err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ScanError::io(dir, err))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|err| ScanError::io(&path, err))?;

        if file_type.is_dir() {
            trace!(dir = %path.display(), "Descending");
            walk(&path, suffix, out)?;
        } else if file_type.is_symlink() && !links_to_file(&path) {
            trace!(link = %path.display(), "Skipping symlink");
        } else if suffix.is_empty() || entry.file_name().to_string_lossy().ends_with(suffix) {
            out.push(path);
        }
    }

    Ok(())
}

fn links_to_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|target| !target.is_dir())
}

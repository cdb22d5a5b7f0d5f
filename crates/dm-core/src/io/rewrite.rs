//! Atomic rewrite of a text file via temp-file-then-rename
//!
//! Callers are expected to hold the file's lock (see [`super::lock`]) for the
//! duration of a read-modify-write cycle; this module only guarantees that the
//! rename step itself is atomic, not the read-modify-write cycle around it.

use crate::io::error::InboxError;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Replace the contents of `path` with `contents`, atomically.
///
/// Writes to a sibling temp file first, then renames it over `path`. On Unix
/// and Windows `rename` over an existing file is atomic, so readers never
/// observe a partially written inbox.
pub fn rewrite(path: &Path, contents: &str) -> Result<(), InboxError> {
    let dir = path.parent().ok_or_else(|| InboxError::InvalidPath {
        path: path.to_path_buf(),
    })?;

    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("inbox"),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);

    let write_result = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(contents.as_bytes())?;
        f.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(InboxError::Io {
            path: tmp_path,
            source: e,
        });
    }

    // On Windows, rename fails if the destination exists; remove it first.
    #[cfg(windows)]
    let _ = fs::remove_file(path);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        InboxError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Append `contents` to the file at `path`, creating it if it doesn't exist.
///
/// This is not rename-atomic (it's a direct append), but it is safe under the
/// caller's held lock since no rewrite of existing bytes takes place.
pub fn append(path: &Path, contents: &str) -> Result<(), InboxError> {
    use std::fs::OpenOptions;

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| InboxError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    f.write_all(contents.as_bytes())
        .map_err(|e| InboxError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

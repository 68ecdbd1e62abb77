//! Loading file snapshots from disk.
//!
//! A snapshot maps `/`-separated repository-relative paths to file content.
//! The pipeline only ever reads it; patched content lives in a
//! [`CandidateSet`](crate::fix::CandidateSet).

use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::{default_ignore_dirs, default_ignore_files};
use crate::error::{FixgateError, Result};

/// Repository-relative path to file content.
pub type Snapshot = BTreeMap<String, String>;

/// Files larger than this are not loaded.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Walk `root` and load every text file into a snapshot.
///
/// Ignored directories, lock files, non-UTF-8 files and files larger than
/// [`MAX_FILE_BYTES`] are skipped.
///
/// # Errors
///
/// Returns [`FixgateError::Snapshot`] if `root` is not a directory.
pub fn load_dir(root: &Path) -> Result<Snapshot> {
    if !root.is_dir() {
        return Err(FixgateError::snapshot(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let ignore_dirs = default_ignore_dirs();
    let ignore_files = default_ignore_files();
    let mut snapshot = Snapshot::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && e.file_name()
                        .to_str()
                        .is_some_and(|name| ignore_dirs.contains(name)))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| ignore_files.contains(name))
        {
            continue;
        }
        if entry.metadata().map_or(true, |m| m.len() > MAX_FILE_BYTES) {
            skipped += 1;
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(key) = relative_key(relative) else {
            skipped += 1;
            continue;
        };

        match std::fs::read_to_string(entry.path()) {
            Ok(content) => {
                snapshot.insert(key, content);
            }
            Err(_) => skipped += 1,
        }
    }

    debug!(
        root = %root.display(),
        files = snapshot.len(),
        skipped,
        "Loaded snapshot"
    );
    Ok(snapshot)
}

fn relative_key(path: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = path.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|p| p.join("/"))
}

/// Write files under `root`, creating parent directories.
///
/// Paths must already be validated as relative.
pub fn write_dir<'a, I>(root: &Path, files: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut written = 0;
    for (path, content) in files {
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        written += 1;
    }
    Ok(written)
}

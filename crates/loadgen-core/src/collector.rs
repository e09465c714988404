//! Tree collector: walks a directory tree into flat, keyed file records.
//!
//! Every reachable file becomes one `FileRecord` whose key is its path
//! relative to the walk root with separators flattened to `:`, so the key can
//! be used directly as a document field name.

use crate::classify::Content;
use crate::fs::{FileSystem, FsError};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Delimiter that replaces path separators in record keys.
pub const KEY_DELIMITER: char = ':';

/// Entries whose name starts with this character are skipped.
pub const RESERVED_PREFIX: char = '.';

/// Directory names that are never descended into.
pub const RESERVED_DIRS: [&str; 2] = ["target", "node_modules"];

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Key {key} is produced by more than one path (second: {path})")]
    DuplicateKey { key: String, path: String },
}

pub type Result<T> = std::result::Result<T, CollectError>;

/// One collected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Flattened key, e.g. `src:main.rs`
    pub path: String,
    /// Text content; `None` for binary files
    pub content: Option<String>,
}

impl FileRecord {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.content.is_some()
    }
}

/// Only the records that carry text content.
pub fn text_records(records: &[FileRecord]) -> Vec<&FileRecord> {
    records.iter().filter(|r| r.is_text()).collect()
}

/// Flatten a relative path into a document key.
pub fn normalize_key(path: &str) -> String {
    path.replace(['/', '\\'], &KEY_DELIMITER.to_string())
}

/// Whether a directory entry is excluded from the walk.
pub fn is_ignored(name: &str, is_dir: bool) -> bool {
    name.starts_with(RESERVED_PREFIX) || (is_dir && RESERVED_DIRS.contains(&name))
}

/// Collect every file under `root` (relative to the filesystem's base).
///
/// Siblings are visited in name order and a directory's files are appended
/// after everything collected before it, so the output order depends only on
/// the tree's contents. Any filesystem error aborts the whole walk.
pub async fn collect<F: FileSystem + ?Sized>(fs: &F, root: &str) -> Result<Vec<FileRecord>> {
    let root = root.trim_matches('/');
    let stat = fs.stat(root).await?;
    if !stat.is_dir {
        return Err(FsError::NotDirectory(root.to_string()).into());
    }

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    walk(fs, root, root, &mut records, &mut seen).await?;
    debug!("Collected {} file(s) under {:?}", records.len(), root);
    Ok(records)
}

async fn walk<F: FileSystem + ?Sized>(
    fs: &F,
    root: &str,
    dir: &str,
    records: &mut Vec<FileRecord>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let mut entries = fs.list(dir).await?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    for entry in entries {
        if is_ignored(&entry.name, entry.is_dir) {
            continue;
        }

        let full_path = if dir.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", dir, entry.name)
        };

        if entry.is_dir {
            Box::pin(walk(fs, root, &full_path, records, seen)).await?;
            continue;
        }

        let relative = relative_to(root, &full_path);
        let key = normalize_key(relative);
        if !seen.insert(key.clone()) {
            return Err(CollectError::DuplicateKey {
                key,
                path: full_path,
            });
        }

        let record = match Content::classify(fs.read(&full_path).await?) {
            Content::Text(text) => FileRecord::text(key, text),
            Content::Binary => FileRecord::binary(key),
        };
        records.push(record);
    }

    Ok(())
}

fn relative_to<'a>(root: &str, path: &'a str) -> &'a str {
    if root.is_empty() {
        return path;
    }
    path.strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path)
}

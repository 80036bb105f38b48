//! Directory metadata documents.
//!
//! A directory event or reconciliation pass turns an archive path into the
//! document the directory index stores: structural fields derived from the
//! path and the filesystem, plus catalogue fields when the path resolves to
//! a record with a usable title.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arcindex_core::error::{IndexerError, IndexerResult};
use arcindex_core::message::README_SENTINEL;
use arcindex_core::paths;

use crate::catalogue::PathResolver;
use crate::doc_id::drop_invalid_utf8;

/// Index document for one archive directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirMetadata {
    /// Segment depth of the directory within the archive.
    pub depth: usize,
    /// Directory name (final path segment).
    pub dir: String,
    /// Parent directory path.
    pub path: String,
    /// Physical location: the symlink target for linked directories,
    /// otherwise the directory path itself.
    pub archive_path: String,
    /// Whether the directory is a symlink.
    pub link: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

impl DirMetadata {
    /// Render as the JSON document handed to the directory index.
    ///
    /// # Errors
    ///
    /// Serialization of these fields does not fail in practice; an error is
    /// surfaced rather than swallowed to keep the write path honest.
    pub fn to_document(&self) -> IndexerResult<Value> {
        serde_json::to_value(self).map_err(|error| IndexerError::subsystem("resolve", error))
    }
}

/// Build the metadata document for a directory path.
///
/// The filesystem is consulted only for the symlink check; a path that does
/// not exist (yet, or any more) is treated as a plain directory. Catalogue
/// fields are attached only when the resolver finds a record with a
/// non-empty title.
///
/// # Errors
///
/// Propagates catalogue point-lookup failures.
pub fn generate_path_metadata(
    path: &str,
    resolver: &PathResolver,
) -> IndexerResult<DirMetadata> {
    let path = paths::normalize(path);
    let link = fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    let archive_path = if link {
        fs::canonicalize(path)
            .map(|real| real.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_owned())
    } else {
        path.to_owned()
    };

    let mut metadata = DirMetadata {
        depth: paths::depth(path),
        dir: paths::file_name(path).unwrap_or_default().to_owned(),
        path: paths::parent(path).unwrap_or("/").to_owned(),
        archive_path,
        link,
        kind: "dir".to_owned(),
        title: None,
        url: None,
        record_type: None,
    };

    if let Some((_prefix, record)) = resolver.resolve(path)? {
        if !record.title.trim().is_empty() {
            metadata.title = Some(record.title);
            metadata.url = Some(record.url);
            metadata.record_type = Some(record.record_type);
        }
    }

    Ok(metadata)
}

/// Read the `00README` file in a directory, dropping invalid UTF-8 bytes.
///
/// Returns `None` when the directory has no readable sentinel file.
#[must_use]
pub fn read_readme(dir: &str) -> Option<String> {
    let readme = Path::new(paths::normalize(dir)).join(README_SENTINEL);
    fs::read(readme).ok().map(|raw| drop_invalid_utf8(&raw))
}

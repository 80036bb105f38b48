//! Boundary traits for external collaborators.
//!
//! The pipeline's outer surfaces (the search index, per-file metadata
//! extraction, corrective-event publication) are collaborators, not
//! internals. Each seam is a small object-safe trait; production adapters
//! live outside this workspace, and in-memory implementations ship with the
//! tests.

use std::path::Path;

use serde_json::Value;

use crate::error::IndexerResult;
use crate::message::IngestMessage;

/// Write access to the directory index.
pub trait DirectoryIndexWriter: Send + Sync {
    /// Upsert with merge semantics: fields present in `document` overwrite,
    /// fields absent from it are left untouched on an existing document.
    /// Re-applying the same call is a no-op.
    fn upsert_merge(&self, doc_id: &str, document: &Value) -> IndexerResult<()>;

    /// Delete a directory document. Deleting an absent id is a no-op.
    fn delete(&self, doc_id: &str) -> IndexerResult<()>;
}

/// Write access to the file index.
pub trait FileIndexWriter: Send + Sync {
    /// Upsert a file document, replacing any previous content.
    fn upsert(&self, doc_id: &str, document: &Value) -> IndexerResult<()>;

    /// Delete a file document. Deleting an absent id is a no-op.
    fn delete(&self, doc_id: &str) -> IndexerResult<()>;
}

/// Per-file-type metadata extraction.
pub trait FileMetadataExtractor: Send + Sync {
    /// Extract an index document for `path`, or `None` when the file type
    /// is not indexable.
    fn extract(&self, path: &Path) -> IndexerResult<Option<Value>>;
}

/// The two index queries the reconciliation crawler issues.
pub trait ReconciliationIndex: Send + Sync {
    /// Paths of all file documents whose parent directory is exactly `dir`.
    fn files_in_directory(&self, dir: &str) -> IndexerResult<Vec<String>>;

    /// Paths of all directory documents under `prefix` at the given depth.
    fn directories_at_depth(&self, prefix: &str, depth: usize) -> IndexerResult<Vec<String>>;
}

/// Corrective-event publication seam.
///
/// Implemented by broker connections in the dispatch crate; the crawler only
/// sees this trait.
pub trait EventPublisher {
    /// Publish one event. Must not return before the broker (or test double)
    /// has taken ownership of the message.
    fn publish(&mut self, message: &IngestMessage) -> IndexerResult<()>;
}

/// The handler boundary: one decoded message in, success or failure out.
///
/// Handlers must be idempotent; at-least-once delivery means any message may
/// be processed more than once.
pub trait UpdateHandler: Send + Sync {
    /// Process one decoded message.
    ///
    /// # Errors
    ///
    /// A returned error is fatal to the worker's current connection; broker
    /// redelivery is the retry mechanism.
    fn process(&self, message: &IngestMessage) -> IndexerResult<()>;
}

/// Handler that accepts and discards everything.
///
/// Useful as a registry placeholder for actions a role deliberately ignores
/// without dropping them as unmapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUpdateHandler;

impl UpdateHandler for NoopUpdateHandler {
    fn process(&self, _message: &IngestMessage) -> IndexerResult<()> {
        Ok(())
    }
}

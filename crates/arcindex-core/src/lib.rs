//! Core types for the arcindex archive index synchroniser.
//!
//! This crate defines the shared ingest message model ([`IngestMessage`],
//! [`ActionKind`]), the error taxonomy ([`IndexerError`]), configuration
//! types, archive path conventions, and the boundary traits the dispatch and
//! reconciliation crates plug their collaborators into.
//!
//! It has minimal external dependencies and is intended to be depended on by
//! every other crate in the workspace.

pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod tracing_config;
pub mod traits;

pub use config::{BrokerConfig, CheckerConfig, ConsumerConfig, ResolveConfig};
pub use error::{IndexerError, IndexerResult};
pub use message::{ActionKind, IngestMessage, README_SENTINEL, legacy_stamp};
pub use traits::{
    DirectoryIndexWriter, EventPublisher, FileIndexWriter, FileMetadataExtractor,
    NoopUpdateHandler, ReconciliationIndex, UpdateHandler,
};

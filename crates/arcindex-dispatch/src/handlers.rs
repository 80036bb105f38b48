//! Update handlers and the action dispatch table.
//!
//! A [`HandlerRegistry`] binds each [`ActionKind`] to at most one handler at
//! startup; the consumer loop consults it per delivery and drops messages
//! whose action has no binding. The two concrete handlers translate change
//! events into index writes through the boundary traits.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use arcindex_core::config::ConsumerConfig;
use arcindex_core::error::{IndexerError, IndexerResult};
use arcindex_core::message::{ActionKind, IngestMessage, README_SENTINEL};
use arcindex_core::paths;
use arcindex_core::traits::{
    DirectoryIndexWriter, FileIndexWriter, FileMetadataExtractor, UpdateHandler,
};
use arcindex_resolve::catalogue::{PathResolver, RefreshTimer};
use arcindex_resolve::doc_id::generate_id;
use arcindex_resolve::filter::PathFilter;
use arcindex_resolve::metadata::{generate_path_metadata, read_readme};

/// Startup-time dispatch table from action to handler.
///
/// One slot per [`ActionKind`] variant; registering twice for the same
/// action replaces the earlier binding.
pub struct HandlerRegistry {
    slots: [Option<Arc<dyn UpdateHandler>>; ActionKind::ALL.len()],
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Bind one action to a handler.
    pub fn register(&mut self, action: ActionKind, handler: Arc<dyn UpdateHandler>) -> &mut Self {
        self.slots[action.index()] = Some(handler);
        self
    }

    /// Bind several actions to the same handler.
    pub fn register_many(
        &mut self,
        actions: &[ActionKind],
        handler: Arc<dyn UpdateHandler>,
    ) -> &mut Self {
        for action in actions {
            self.register(*action, Arc::clone(&handler));
        }
        self
    }

    /// Handler bound to `action`, if any.
    #[must_use]
    pub fn get(&self, action: ActionKind) -> Option<&Arc<dyn UpdateHandler>> {
        self.slots[action.index()].as_ref()
    }

    /// Actions that currently have a binding.
    pub fn registered(&self) -> impl Iterator<Item = ActionKind> + '_ {
        ActionKind::ALL
            .into_iter()
            .filter(|action| self.slots[action.index()].is_some())
    }
}

/// Bounded wait for files the filesystem has not surfaced yet.
///
/// A recent event (younger than the threshold) whose path is not visible
/// gets exactly one pause; then processing proceeds either way, trusting the
/// event over the filesystem.
#[derive(Debug, Clone)]
pub struct VisibilityWait {
    recent_threshold: Duration,
    pause: Duration,
}

impl VisibilityWait {
    #[must_use]
    pub fn new(recent_threshold: Duration, pause: Duration) -> Self {
        Self {
            recent_threshold,
            pause,
        }
    }

    #[must_use]
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.recent_event_threshold_secs),
            Duration::from_secs(config.visibility_wait_secs),
        )
    }

    /// Never waits. For reconciliation paths where the filesystem is the
    /// source of truth.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pause once if the event is recent and the path is not yet visible.
    /// Returns whether a pause happened.
    pub fn pause_if_hidden(&self, message: &IngestMessage, visible: bool) -> bool {
        if visible || self.pause.is_zero() {
            return false;
        }
        let Some(event_time) = message.event_time() else {
            // Unparseable stamps are treated as old events.
            return false;
        };
        let age = chrono::Utc::now().signed_duration_since(event_time);
        let threshold = chrono::Duration::from_std(self.recent_threshold)
            .unwrap_or_else(|_| chrono::Duration::zero());
        if age >= threshold {
            return false;
        }
        tracing::debug!(
            target: "arcindex.dispatch",
            op = "visibility.wait",
            path = %message.filepath,
            pause_secs = self.pause.as_secs(),
            "recent event path not visible yet, pausing once"
        );
        std::thread::sleep(self.pause);
        true
    }
}

fn handler_failure(message: &IngestMessage, error: IndexerError) -> IndexerError {
    IndexerError::HandlerFailure {
        path: message.filepath.clone(),
        action: message.action.as_wire(),
        source: Box::new(error),
    }
}

/// Maintains directory documents: creation, removal, readme content.
pub struct DirectoryUpdateHandler {
    writer: Arc<dyn DirectoryIndexWriter>,
    resolver: Arc<PathResolver>,
    timer: Mutex<RefreshTimer>,
    filter: PathFilter,
    wait: VisibilityWait,
}

impl DirectoryUpdateHandler {
    #[must_use]
    pub fn new(
        writer: Arc<dyn DirectoryIndexWriter>,
        resolver: Arc<PathResolver>,
        timer: RefreshTimer,
        filter: PathFilter,
        wait: VisibilityWait,
    ) -> Self {
        Self {
            writer,
            resolver,
            timer: Mutex::new(timer),
            filter,
            wait,
        }
    }

    /// Refresh the catalogue snapshot when the cadence is due. Failures are
    /// logged and retried on the next message; they never fail the current
    /// one, and the timer resets only after a refresh that succeeded.
    fn maybe_refresh(&self) {
        let Ok(mut timer) = self.timer.lock() else {
            return;
        };
        if !timer.is_due() {
            return;
        }
        match self.resolver.refresh() {
            Ok(true) => timer.reset(),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(
                    target: "arcindex.dispatch",
                    op = "catalogue.refresh",
                    error = %error,
                    "catalogue refresh failed, keeping previous snapshot"
                );
            }
        }
    }

    fn upsert_directory(&self, message: &IngestMessage) -> IndexerResult<()> {
        let path = paths::normalize(&message.filepath);
        self.wait.pause_if_hidden(message, Path::new(path).exists());
        let metadata = generate_path_metadata(path, &self.resolver)
            .map_err(|error| handler_failure(message, error))?;
        let document = metadata
            .to_document()
            .map_err(|error| handler_failure(message, error))?;
        self.writer
            .upsert_merge(&generate_id(path), &document)
            .map_err(|error| handler_failure(message, error))
    }

    fn remove_directory(&self, message: &IngestMessage) -> IndexerResult<()> {
        self.writer
            .delete(&generate_id(&message.filepath))
            .map_err(|error| handler_failure(message, error))
    }

    /// Merge readme content into the containing directory's document. The
    /// event path may name the sentinel file itself or its directory.
    fn merge_readme(&self, message: &IngestMessage) -> IndexerResult<()> {
        let path = paths::normalize(&message.filepath);
        let dir = if paths::file_name(path) == Some(README_SENTINEL) {
            paths::parent(path).unwrap_or("/")
        } else {
            path
        };
        let sentinel = Path::new(dir).join(README_SENTINEL);
        self.wait.pause_if_hidden(message, sentinel.exists());
        let Some(content) = read_readme(dir) else {
            tracing::debug!(
                target: "arcindex.dispatch",
                op = "readme.merge",
                path = dir,
                "no readable readme sentinel, skipping"
            );
            return Ok(());
        };
        self.writer
            .upsert_merge(&generate_id(dir), &json!({ "readme": content }))
            .map_err(|error| handler_failure(message, error))
    }
}

impl UpdateHandler for DirectoryUpdateHandler {
    fn process(&self, message: &IngestMessage) -> IndexerResult<()> {
        if !self.filter.allows(&message.filepath) {
            tracing::debug!(
                target: "arcindex.dispatch",
                op = "filter.skip",
                path = %message.filepath,
                "path filtered out"
            );
            return Ok(());
        }
        self.maybe_refresh();
        match message.action {
            ActionKind::Mkdir | ActionKind::Symlink => self.upsert_directory(message),
            ActionKind::Rmdir => self.remove_directory(message),
            ActionKind::ReadmeAdded => self.merge_readme(message),
            ActionKind::Deposit | ActionKind::Remove | ActionKind::JsonRefresh => Ok(()),
        }
    }
}

/// Maintains file documents: deposits, removals and re-extraction requests.
pub struct FileUpdateHandler {
    writer: Arc<dyn FileIndexWriter>,
    extractor: Arc<dyn FileMetadataExtractor>,
    filter: PathFilter,
    wait: VisibilityWait,
}

impl FileUpdateHandler {
    #[must_use]
    pub fn new(
        writer: Arc<dyn FileIndexWriter>,
        extractor: Arc<dyn FileMetadataExtractor>,
        filter: PathFilter,
        wait: VisibilityWait,
    ) -> Self {
        Self {
            writer,
            extractor,
            filter,
            wait,
        }
    }

    fn upsert_file(&self, message: &IngestMessage) -> IndexerResult<()> {
        let path = paths::normalize(&message.filepath);
        self.wait.pause_if_hidden(message, Path::new(path).exists());
        let extracted = self
            .extractor
            .extract(Path::new(path))
            .map_err(|error| handler_failure(message, error))?;
        let Some(document) = extracted else {
            tracing::debug!(
                target: "arcindex.dispatch",
                op = "file.extract",
                path,
                "file type not indexable, skipping"
            );
            return Ok(());
        };
        self.writer
            .upsert(&generate_id(path), &document)
            .map_err(|error| handler_failure(message, error))
    }

    fn remove_file(&self, message: &IngestMessage) -> IndexerResult<()> {
        self.writer
            .delete(&generate_id(&message.filepath))
            .map_err(|error| handler_failure(message, error))
    }
}

impl UpdateHandler for FileUpdateHandler {
    fn process(&self, message: &IngestMessage) -> IndexerResult<()> {
        if !self.filter.allows(&message.filepath) {
            return Ok(());
        }
        match message.action {
            ActionKind::Deposit | ActionKind::JsonRefresh => self.upsert_file(message),
            ActionKind::Remove => self.remove_file(message),
            ActionKind::Mkdir
            | ActionKind::Rmdir
            | ActionKind::Symlink
            | ActionKind::ReadmeAdded => Ok(()),
        }
    }
}

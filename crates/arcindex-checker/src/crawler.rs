//! Consistency reconciliation crawler.
//!
//! Compares directory listings on the archive filesystem against what the
//! index believes, and publishes corrective change events for every
//! discrepancy. Work arrives on two durable queues: `priority` (operator
//! submissions) is always drained first, then `sweep`; when both are empty
//! the spot cursor supplies the next archive root and its directory tree
//! refills the sweep queue.
//!
//! A queue entry is acked only after every corrective for it has been
//! published, so a crash mid-entry replays the whole diff. Replays are safe:
//! diffing is pure and the downstream handlers are idempotent.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use arcindex_core::config::CheckerConfig;
use arcindex_core::error::IndexerResult;
use arcindex_core::message::{ActionKind, IngestMessage, README_SENTINEL};
use arcindex_core::paths;
use arcindex_core::traits::{EventPublisher, ReconciliationIndex};
use arcindex_resolve::filter::PathFilter;

use crate::durable_queue::{DurableQueue, LeasedEntry};
use crate::spot::{SpotCursor, SpotListSource};

/// Which queue a processed entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Priority,
    Sweep,
}

/// Result of one reconciled queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub directory: String,
    pub source: QueueKind,
    pub published: usize,
}

/// Difference between a filesystem listing and the index's view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryDiff {
    /// Present on the filesystem, absent from the index.
    pub missing: Vec<String>,
    /// Present in the index, gone from the filesystem.
    pub stale: Vec<String>,
}

/// Pure set difference: what the index must add and what it must drop.
///
/// Inputs that already agree produce an empty diff, so re-running a
/// reconciliation after its correctives were applied publishes nothing.
#[must_use]
pub fn diff_sets(found: &BTreeSet<String>, indexed: &BTreeSet<String>) -> DirectoryDiff {
    DirectoryDiff {
        missing: found.difference(indexed).cloned().collect(),
        stale: indexed.difference(found).cloned().collect(),
    }
}

/// The crawler itself. Single-threaded by design: one crawl pass at a time.
pub struct ConsistencyCrawler {
    priority: DurableQueue,
    sweep: DurableQueue,
    spot: SpotCursor,
    index: Arc<dyn ReconciliationIndex>,
    publisher: Box<dyn EventPublisher>,
    filter: PathFilter,
    dev_mode: bool,
}

impl ConsistencyCrawler {
    #[must_use]
    pub fn new(
        priority: DurableQueue,
        sweep: DurableQueue,
        spot: SpotCursor,
        index: Arc<dyn ReconciliationIndex>,
        publisher: Box<dyn EventPublisher>,
        filter: PathFilter,
        dev_mode: bool,
    ) -> Self {
        Self {
            priority,
            sweep,
            spot,
            index,
            publisher,
            filter,
            dev_mode,
        }
    }

    /// Open the crawler's durable state under `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Propagates filesystem and queue-open failures.
    pub fn open(
        config: &CheckerConfig,
        spot_source: Box<dyn SpotListSource>,
        index: Arc<dyn ReconciliationIndex>,
        publisher: Box<dyn EventPublisher>,
        filter: PathFilter,
    ) -> IndexerResult<Self> {
        std::fs::create_dir_all(&config.state_dir)?;
        Ok(Self::new(
            DurableQueue::open(&config.state_dir.join("priority.db"), "priority")?,
            DurableQueue::open(&config.state_dir.join("sweep.db"), "sweep")?,
            SpotCursor::new(spot_source, config.state_dir.join("spot.cursor")),
            index,
            publisher,
            filter,
            config.dev_mode,
        ))
    }

    /// The priority queue, for operator submissions sharing this state dir.
    #[must_use]
    pub fn priority_queue(&self) -> &DurableQueue {
        &self.priority
    }

    /// Ready entries on the sweep queue.
    ///
    /// # Errors
    ///
    /// Wraps queue failures.
    pub fn sweep_depth(&self) -> IndexerResult<usize> {
        self.sweep.depth()
    }

    /// Reconcile the next queued directory, refilling the sweep queue from
    /// the spot cursor when everything is drained (unless in dev mode).
    /// Returns `None` when there is nothing to do.
    ///
    /// # Errors
    ///
    /// Propagates queue, publish and index-query failures. A failed entry
    /// stays leased and is replayed after the next reopen.
    pub fn process_next(&mut self) -> IndexerResult<Option<ReconcileSummary>> {
        let Some((source, entry)) = self.next_entry()? else {
            return Ok(None);
        };
        let summary = self.process_entry(source, &entry)?;
        Ok(Some(summary))
    }

    fn next_entry(&mut self) -> IndexerResult<Option<(QueueKind, LeasedEntry)>> {
        if let Some(entry) = self.priority.lease()? {
            return Ok(Some((QueueKind::Priority, entry)));
        }
        if let Some(entry) = self.sweep.lease()? {
            return Ok(Some((QueueKind::Sweep, entry)));
        }
        if self.dev_mode {
            return Ok(None);
        }
        self.refill_sweep()?;
        Ok(self
            .sweep
            .lease()?
            .map(|entry| (QueueKind::Sweep, entry)))
    }

    /// Advance the spot cursor and enqueue every directory under the spot's
    /// archive root.
    fn refill_sweep(&mut self) -> IndexerResult<usize> {
        let spot = self.spot.advance()?;
        let mut enqueued = 0;
        for entry in WalkDir::new(&spot.path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(
                        target: "arcindex.checker",
                        op = "crawl.walk",
                        spot = %spot.spot,
                        error = %error,
                        "unreadable path skipped during crawl"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(path) = entry.path().to_str() else {
                continue;
            };
            self.sweep.put(path)?;
            enqueued += 1;
        }
        tracing::info!(
            target: "arcindex.checker",
            op = "crawl.refill",
            spot = %spot.spot,
            path = %spot.path,
            enqueued,
            "sweep queue refilled from spot"
        );
        Ok(enqueued)
    }

    fn process_entry(
        &mut self,
        source: QueueKind,
        entry: &LeasedEntry,
    ) -> IndexerResult<ReconcileSummary> {
        let events = self.reconcile_directory(&entry.payload)?;
        for event in &events {
            self.publisher.publish(event)?;
        }
        // Ack strictly after the last publish: a crash in between replays
        // the entire entry.
        let queue = match source {
            QueueKind::Priority => &self.priority,
            QueueKind::Sweep => &self.sweep,
        };
        queue.ack(entry.id)?;
        tracing::debug!(
            target: "arcindex.checker",
            op = "reconcile.entry",
            path = %entry.payload,
            event_count = events.len(),
            "directory reconciled"
        );
        Ok(ReconcileSummary {
            directory: entry.payload.clone(),
            source,
            published: events.len(),
        })
    }

    /// Compute the corrective events for one directory without publishing
    /// them. Filtered paths yield nothing; a directory missing from the
    /// filesystem yields a single removal event for itself.
    ///
    /// # Errors
    ///
    /// Propagates index-query and directory-listing failures.
    pub fn reconcile_directory(&self, dir: &str) -> IndexerResult<Vec<IngestMessage>> {
        let dir = paths::normalize(dir);
        if !self.filter.allows(dir) {
            return Ok(Vec::new());
        }
        if !Path::new(dir).is_dir() {
            return Ok(vec![IngestMessage::corrective(dir, ActionKind::Rmdir)]);
        }

        let mut fs_files = BTreeSet::new();
        let mut fs_dirs = BTreeSet::new();
        for child in std::fs::read_dir(dir)? {
            let child = child?;
            let Ok(name) = child.file_name().into_string() else {
                continue;
            };
            let full = format!("{}/{name}", dir.trim_end_matches('/'));
            if child.file_type()?.is_dir() {
                fs_dirs.insert(full);
            } else {
                fs_files.insert(full);
            }
        }

        let indexed_files: BTreeSet<String> = self
            .index
            .files_in_directory(dir)?
            .into_iter()
            .map(|path| paths::normalize(&path).to_owned())
            .collect();
        let indexed_dirs: BTreeSet<String> = self
            .index
            .directories_at_depth(dir, paths::depth(dir) + 1)?
            .into_iter()
            .map(|path| paths::normalize(&path).to_owned())
            .collect();

        let file_diff = diff_sets(&fs_files, &indexed_files);
        let dir_diff = diff_sets(&fs_dirs, &indexed_dirs);

        let mut events = Vec::new();
        for path in file_diff.missing {
            events.push(IngestMessage::corrective(path, ActionKind::Deposit));
        }
        for path in file_diff.stale {
            events.push(IngestMessage::corrective(path, ActionKind::Remove));
        }
        for path in dir_diff.missing {
            events.push(IngestMessage::corrective(path, ActionKind::Mkdir));
        }
        for path in dir_diff.stale {
            events.push(IngestMessage::corrective(path, ActionKind::Rmdir));
        }

        let readme = format!("{}/{README_SENTINEL}", dir.trim_end_matches('/'));
        if fs_files.contains(&readme) {
            events.push(IngestMessage::corrective(readme, ActionKind::ReadmeAdded));
        }
        Ok(events)
    }
}

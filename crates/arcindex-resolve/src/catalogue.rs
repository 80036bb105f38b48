//! Catalogue snapshots and the path resolver.
//!
//! The data catalogue maps archive path prefixes to catalogue records. The
//! resolver holds an immutable snapshot of the whole mapping behind an atomic
//! pointer; readers never block, and a wholesale refresh builds a new
//! snapshot off to the side before swapping it in.
//!
//! Paths the snapshot cannot answer fall through to a point lookup against
//! the catalogue source, and the outcome (hit or miss) is remembered in an
//! overlay cache until the next successful refresh clears it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use arcindex_core::config::ResolveConfig;
use arcindex_core::error::{IndexerError, IndexerResult};
use arcindex_core::paths;

use crate::tree::PathTrie;

/// One catalogue record, keyed by an archive path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueRecord {
    /// Human-readable dataset title.
    pub title: String,
    /// Catalogue landing page for the record.
    pub url: String,
    /// Record kind as the catalogue reports it (e.g. "dataset").
    pub record_type: String,
}

/// Where catalogue data comes from.
///
/// Production adapters wrap the catalogue's HTTP API; [`StaticCatalogue`]
/// serves fixed data for tests and local runs.
pub trait CatalogueSource: Send + Sync {
    /// Fetch the complete prefix-to-record mapping.
    fn fetch_all(&self) -> IndexerResult<Vec<(String, CatalogueRecord)>>;

    /// Resolve a single path to its governing record, if any. Returns the
    /// matched prefix alongside the record.
    fn lookup(&self, path: &str) -> IndexerResult<Option<(String, CatalogueRecord)>>;
}

/// Fixed in-memory catalogue.
#[derive(Debug, Default)]
pub struct StaticCatalogue {
    entries: Vec<(String, CatalogueRecord)>,
}

impl StaticCatalogue {
    #[must_use]
    pub fn new(entries: Vec<(String, CatalogueRecord)>) -> Self {
        Self { entries }
    }
}

impl CatalogueSource for StaticCatalogue {
    fn fetch_all(&self) -> IndexerResult<Vec<(String, CatalogueRecord)>> {
        Ok(self.entries.clone())
    }

    fn lookup(&self, path: &str) -> IndexerResult<Option<(String, CatalogueRecord)>> {
        let mut trie = PathTrie::new();
        for (prefix, record) in &self.entries {
            trie.insert(prefix, record.clone());
        }
        Ok(trie
            .longest_prefix(path)
            .map(|(prefix, record)| (prefix, record.clone())))
    }
}

/// Immutable view of the catalogue at one refresh.
#[derive(Debug)]
struct CatalogueSnapshot {
    tree: PathTrie<CatalogueRecord>,
}

impl CatalogueSnapshot {
    fn empty() -> Self {
        Self {
            tree: PathTrie::new(),
        }
    }

    fn build(entries: Vec<(String, CatalogueRecord)>) -> Self {
        let mut tree = PathTrie::new();
        for (prefix, record) in entries {
            tree.insert(&prefix, record);
        }
        Self { tree }
    }
}

/// Resolves archive paths to catalogue records.
///
/// Shared across worker threads behind an `Arc`; all methods take `&self`.
pub struct PathResolver {
    source: Box<dyn CatalogueSource>,
    snapshot: ArcSwap<CatalogueSnapshot>,
    /// Point-lookup results since the last refresh, misses included.
    overlay: Mutex<HashMap<String, Option<(String, CatalogueRecord)>>>,
    /// Held for the duration of a refresh; contended refreshes are skipped.
    refresh_guard: Mutex<()>,
}

impl PathResolver {
    /// Create a resolver with an empty snapshot. Call [`refresh`] to load
    /// catalogue data, or rely on point lookups until the first refresh.
    ///
    /// [`refresh`]: Self::refresh
    #[must_use]
    pub fn new(source: Box<dyn CatalogueSource>) -> Self {
        Self {
            source,
            snapshot: ArcSwap::from_pointee(CatalogueSnapshot::empty()),
            overlay: Mutex::new(HashMap::new()),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Resolve a path to its governing catalogue record.
    ///
    /// The snapshot answers first; unknown paths fall through to one point
    /// lookup whose outcome is cached until the next successful refresh.
    ///
    /// # Errors
    ///
    /// Propagates point-lookup failures from the catalogue source.
    pub fn resolve(&self, path: &str) -> IndexerResult<Option<(String, CatalogueRecord)>> {
        let path = paths::normalize(path);
        let snapshot = self.snapshot.load();
        if let Some((prefix, record)) = snapshot.tree.longest_prefix(path) {
            return Ok(Some((prefix, record.clone())));
        }

        {
            let overlay = self
                .overlay
                .lock()
                .map_err(|_| poisoned("resolver overlay"))?;
            if let Some(cached) = overlay.get(path) {
                return Ok(cached.clone());
            }
        }

        let resolved = self.source.lookup(path)?;
        tracing::debug!(
            target: "arcindex.resolve",
            op = "catalogue.point_lookup",
            path,
            hit = resolved.is_some(),
            "point lookup fell through the snapshot"
        );
        let mut overlay = self
            .overlay
            .lock()
            .map_err(|_| poisoned("resolver overlay"))?;
        overlay.insert(path.to_owned(), resolved.clone());
        Ok(resolved)
    }

    /// Rebuild the snapshot from a full catalogue fetch and swap it in.
    ///
    /// Single-flight: if another thread is already refreshing, returns
    /// `Ok(false)` immediately without waiting. On success the overlay cache
    /// is cleared and `Ok(true)` returned; callers reset their
    /// [`RefreshTimer`] only in that case.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::RefreshFailure`] when the fetch fails; the
    /// previous snapshot and overlay stay in place.
    pub fn refresh(&self) -> IndexerResult<bool> {
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            tracing::debug!(
                target: "arcindex.resolve",
                op = "catalogue.refresh",
                "refresh already in flight, skipping"
            );
            return Ok(false);
        };

        let entries = self.source.fetch_all().map_err(|error| {
            IndexerError::RefreshFailure {
                source: Box::new(error),
            }
        })?;
        let record_count = entries.len();
        let snapshot = CatalogueSnapshot::build(entries);
        self.snapshot.store(Arc::new(snapshot));
        self.overlay
            .lock()
            .map_err(|_| poisoned("resolver overlay"))?
            .clear();
        tracing::info!(
            target: "arcindex.resolve",
            op = "catalogue.refresh",
            record_count,
            "catalogue snapshot rebuilt"
        );
        Ok(true)
    }

    /// Number of prefixes in the current snapshot.
    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.load().tree.len()
    }
}

fn poisoned(what: &'static str) -> IndexerError {
    IndexerError::Subsystem {
        subsystem: "resolve",
        source: format!("{what} lock poisoned").into(),
    }
}

/// Caller-owned refresh cadence.
///
/// Each handler owns its own timer and polls [`is_due`](Self::is_due) between
/// messages; [`reset`](Self::reset) is called only after a refresh that
/// actually succeeded, so a failed refresh retries on the next poll.
#[derive(Debug)]
pub struct RefreshTimer {
    interval: Duration,
    last_reset: Instant,
}

impl RefreshTimer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_reset: Instant::now(),
        }
    }

    /// Timer with the configured refresh interval (default 30 minutes).
    #[must_use]
    pub fn from_config(config: &ResolveConfig) -> Self {
        Self::new(Duration::from_secs(config.refresh_interval_secs))
    }

    /// Whether the interval has elapsed since the last reset.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.last_reset.elapsed() >= self.interval
    }

    /// Restart the interval. Call only after a successful refresh.
    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }
}

//! Consistency reconciliation for arcindex.
//!
//! Crawls archive directories from two durable work queues and a persisted
//! spot cursor, diffs filesystem listings against the index, and publishes
//! corrective change events back onto the broker so the ordinary dispatch
//! pipeline repairs the index.

pub mod crawler;
pub mod durable_queue;
pub mod spot;
pub mod submit;

pub use crawler::{ConsistencyCrawler, DirectoryDiff, QueueKind, ReconcileSummary, diff_sets};
pub use durable_queue::{DurableQueue, LeasedEntry};
pub use spot::{SpotCursor, SpotEntry, SpotListSource, StaticSpotSource};
pub use submit::DirectorySubmitter;

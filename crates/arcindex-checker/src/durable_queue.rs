//! Durable FIFO work queue with leases.
//!
//! Entries survive process crashes: a leased entry that was never acked
//! reverts to ready when the queue file is reopened, so reconciliation work
//! is repeated rather than lost. Repetition is safe because reconciliation
//! is idempotent.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use arcindex_core::error::{IndexerError, IndexerResult};

/// One leased queue entry. Must be acked by id once its work is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedEntry {
    pub id: i64,
    pub payload: String,
}

/// SQLite-backed FIFO queue with put / lease / ack.
pub struct DurableQueue {
    conn: Connection,
    name: &'static str,
}

impl DurableQueue {
    /// Open (or create) a queue file and recover abandoned leases.
    ///
    /// # Errors
    ///
    /// Wraps SQLite open and migration failures.
    pub fn open(path: &Path, name: &'static str) -> IndexerResult<Self> {
        let conn = Connection::open(path).map_err(queue_error)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS entries (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 payload TEXT NOT NULL,
                 status TEXT NOT NULL DEFAULT 'ready',
                 enqueued_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(status, id);",
        )
        .map_err(queue_error)?;

        let reclaimed = conn
            .execute("UPDATE entries SET status = 'ready' WHERE status = 'leased'", [])
            .map_err(queue_error)?;
        if reclaimed > 0 {
            tracing::info!(
                target: "arcindex.checker",
                op = "queue.reclaim",
                queue = name,
                reclaimed,
                "abandoned leases returned to ready on reopen"
            );
        }
        Ok(Self { conn, name })
    }

    /// In-memory queue for tests and dev runs. Loses everything on drop.
    ///
    /// # Errors
    ///
    /// Wraps SQLite failures.
    pub fn open_in_memory(name: &'static str) -> IndexerResult<Self> {
        let conn = Connection::open_in_memory().map_err(queue_error)?;
        conn.execute_batch(
            "CREATE TABLE entries (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 payload TEXT NOT NULL,
                 status TEXT NOT NULL DEFAULT 'ready',
                 enqueued_at INTEGER NOT NULL
             );",
        )
        .map_err(queue_error)?;
        Ok(Self { conn, name })
    }

    /// Append one payload.
    ///
    /// # Errors
    ///
    /// Wraps SQLite failures.
    pub fn put(&self, payload: &str) -> IndexerResult<i64> {
        self.conn
            .execute(
                "INSERT INTO entries (payload, status, enqueued_at)
                 VALUES (?1, 'ready', unixepoch())",
                params![payload],
            )
            .map_err(queue_error)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(
            target: "arcindex.checker",
            op = "queue.put",
            queue = self.name,
            id,
            payload,
            "entry enqueued"
        );
        Ok(id)
    }

    /// Lease the oldest ready entry, leaving it in the file until acked.
    ///
    /// # Errors
    ///
    /// Wraps SQLite failures.
    pub fn lease(&self) -> IndexerResult<Option<LeasedEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, payload FROM entries
                 WHERE status = 'ready' ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(LeasedEntry {
                        id: row.get(0)?,
                        payload: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(queue_error)?;

        let Some(entry) = entry else {
            return Ok(None);
        };
        self.conn
            .execute(
                "UPDATE entries SET status = 'leased' WHERE id = ?1",
                params![entry.id],
            )
            .map_err(queue_error)?;
        Ok(Some(entry))
    }

    /// Remove a leased entry for good.
    ///
    /// # Errors
    ///
    /// Fails when the id does not name a leased entry.
    pub fn ack(&self, id: i64) -> IndexerResult<()> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM entries WHERE id = ?1 AND status = 'leased'",
                params![id],
            )
            .map_err(queue_error)?;
        if removed == 0 {
            return Err(IndexerError::Subsystem {
                subsystem: "queue",
                source: format!("ack of unknown or unleased entry {id}").into(),
            });
        }
        Ok(())
    }

    /// Ready entries waiting for a lease.
    ///
    /// # Errors
    ///
    /// Wraps SQLite failures.
    pub fn depth(&self) -> IndexerResult<usize> {
        self.count_status("ready")
    }

    /// Leased entries not yet acked.
    ///
    /// # Errors
    ///
    /// Wraps SQLite failures.
    pub fn in_flight(&self) -> IndexerResult<usize> {
        self.count_status("leased")
    }

    fn count_status(&self, status: &str) -> IndexerResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )
            .map_err(queue_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn queue_error(error: rusqlite::Error) -> IndexerError {
    IndexerError::subsystem("queue", error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_come_out_in_fifo_order() {
        let queue = DurableQueue::open_in_memory("test").expect("queue should open");
        queue.put("/archive/a").expect("put should succeed");
        queue.put("/archive/b").expect("put should succeed");

        let first = queue.lease().expect("lease should succeed").expect("entry");
        assert_eq!(first.payload, "/archive/a");
        queue.ack(first.id).expect("ack should succeed");

        let second = queue.lease().expect("lease should succeed").expect("entry");
        assert_eq!(second.payload, "/archive/b");
    }

    #[test]
    fn leased_entries_are_invisible_until_acked() {
        let queue = DurableQueue::open_in_memory("test").expect("queue should open");
        queue.put("/archive/a").expect("put should succeed");

        let entry = queue.lease().expect("lease should succeed").expect("entry");
        assert_eq!(queue.depth().expect("depth"), 0);
        assert_eq!(queue.in_flight().expect("in_flight"), 1);
        assert!(queue.lease().expect("lease should succeed").is_none());

        queue.ack(entry.id).expect("ack should succeed");
        assert_eq!(queue.in_flight().expect("in_flight"), 0);
    }

    #[test]
    fn ack_of_unleased_entry_is_an_error() {
        let queue = DurableQueue::open_in_memory("test").expect("queue should open");
        let id = queue.put("/archive/a").expect("put should succeed");
        assert!(queue.ack(id).is_err(), "entry was never leased");
        assert!(queue.ack(999).is_err(), "entry does not exist");
    }

    #[test]
    fn reopen_reclaims_abandoned_leases() {
        let scratch = tempfile::tempdir().expect("tempdir should create");
        let path = scratch.path().join("queue.db");

        {
            let queue = DurableQueue::open(&path, "test").expect("queue should open");
            queue.put("/archive/crashy").expect("put should succeed");
            let _leased = queue.lease().expect("lease should succeed").expect("entry");
            // Simulated crash: dropped without ack.
        }

        let reopened = DurableQueue::open(&path, "test").expect("queue should reopen");
        assert_eq!(reopened.depth().expect("depth"), 1);
        let entry = reopened
            .lease()
            .expect("lease should succeed")
            .expect("reclaimed entry");
        assert_eq!(entry.payload, "/archive/crashy");
    }

    #[test]
    fn acked_entries_do_not_survive_reopen() {
        let scratch = tempfile::tempdir().expect("tempdir should create");
        let path = scratch.path().join("queue.db");

        {
            let queue = DurableQueue::open(&path, "test").expect("queue should open");
            queue.put("/archive/done").expect("put should succeed");
            let entry = queue.lease().expect("lease should succeed").expect("entry");
            queue.ack(entry.id).expect("ack should succeed");
        }

        let reopened = DurableQueue::open(&path, "test").expect("queue should reopen");
        assert_eq!(reopened.depth().expect("depth"), 0);
        assert!(reopened.lease().expect("lease should succeed").is_none());
    }
}

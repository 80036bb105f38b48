//! Operator submissions onto the priority queue.
//!
//! Lets an operator force reconciliation of specific directories ahead of
//! the background sweep, optionally covering the whole subtree.

use std::path::Path;

use walkdir::WalkDir;

use arcindex_core::config::CheckerConfig;
use arcindex_core::error::{IndexerError, IndexerResult};

use crate::durable_queue::DurableQueue;

/// Queues directories for priority reconciliation.
pub struct DirectorySubmitter {
    queue: DurableQueue,
}

impl DirectorySubmitter {
    /// Open the priority queue under the crawler's state directory.
    ///
    /// # Errors
    ///
    /// Propagates filesystem and queue-open failures.
    pub fn open(config: &CheckerConfig) -> IndexerResult<Self> {
        std::fs::create_dir_all(&config.state_dir)?;
        Ok(Self {
            queue: DurableQueue::open(&config.state_dir.join("priority.db"), "priority")?,
        })
    }

    #[must_use]
    pub fn with_queue(queue: DurableQueue) -> Self {
        Self { queue }
    }

    /// Submit one directory, or its whole subtree when `recursive`.
    /// Returns how many directories were queued.
    ///
    /// # Errors
    ///
    /// Rejects paths that are not directories.
    pub fn submit(&self, root: &str, recursive: bool) -> IndexerResult<usize> {
        if !Path::new(root).is_dir() {
            return Err(IndexerError::InvalidConfig {
                field: "submit.directory".to_owned(),
                value: root.to_owned(),
                reason: "not a directory on the archive filesystem".to_owned(),
            });
        }

        if !recursive {
            self.queue.put(root)?;
            return Ok(1);
        }

        let mut queued = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(
                        target: "arcindex.checker",
                        op = "submit.walk",
                        error = %error,
                        "unreadable path skipped during submission"
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
            self.queue.put(path)?;
            queued += 1;
        }
        tracing::info!(
            target: "arcindex.checker",
            op = "submit.queued",
            root,
            queued,
            "directories submitted for priority reconciliation"
        );
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter() -> DirectorySubmitter {
        DirectorySubmitter::with_queue(
            DurableQueue::open_in_memory("priority").expect("queue should open"),
        )
    }

    #[test]
    fn single_submission_queues_one_entry() {
        let scratch = tempfile::tempdir().expect("tempdir should create");
        let submitter = submitter();
        let queued = submitter
            .submit(scratch.path().to_str().expect("UTF-8 path"), false)
            .expect("submit should succeed");
        assert_eq!(queued, 1);
    }

    #[test]
    fn recursive_submission_queues_the_subtree() {
        let scratch = tempfile::tempdir().expect("tempdir should create");
        std::fs::create_dir_all(scratch.path().join("a/b")).expect("dirs should create");
        std::fs::write(scratch.path().join("a/file.nc"), b"x").expect("file should write");

        let submitter = submitter();
        let queued = submitter
            .submit(scratch.path().to_str().expect("UTF-8 path"), true)
            .expect("submit should succeed");
        // Root, a, a/b; the file is not queued.
        assert_eq!(queued, 3);
    }

    #[test]
    fn non_directories_are_rejected() {
        let scratch = tempfile::tempdir().expect("tempdir should create");
        let file = scratch.path().join("file.nc");
        std::fs::write(&file, b"x").expect("file should write");

        let submitter = submitter();
        let err = submitter
            .submit(file.to_str().expect("UTF-8 path"), false)
            .expect_err("files must be rejected");
        assert!(matches!(err, IndexerError::InvalidConfig { .. }));
    }
}

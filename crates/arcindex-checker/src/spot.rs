//! Spot cursor: durable round-robin over the archive's storage roots.
//!
//! The roots list ("spots") is fetched from a collaborator and walked one
//! line at a time across crawler runs. The cursor is a line offset persisted
//! after every step, so a restart resumes where the previous run stopped.
//! Reaching the end of the list re-fetches it and starts over, picking up
//! spots added since the last pass.

use std::path::PathBuf;

use arcindex_core::error::{IndexerError, IndexerResult};

/// One usable spot line: a name and the archive root it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotEntry {
    pub spot: String,
    pub path: String,
}

/// Where the roots list comes from.
pub trait SpotListSource: Send + Sync {
    /// Fetch the raw list, one `<spot-name> <path>` entry per line.
    fn fetch(&self) -> IndexerResult<Vec<String>>;
}

/// Fixed in-memory roots list.
#[derive(Debug, Default)]
pub struct StaticSpotSource {
    lines: Vec<String>,
}

impl StaticSpotSource {
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl SpotListSource for StaticSpotSource {
    fn fetch(&self) -> IndexerResult<Vec<String>> {
        Ok(self.lines.clone())
    }
}

/// Durable cursor over the fetched roots list.
pub struct SpotCursor {
    source: Box<dyn SpotListSource>,
    cursor_file: PathBuf,
    lines: Vec<String>,
    /// Offset of the next line to hand out; persisted after every advance.
    index: usize,
}

impl SpotCursor {
    /// Create a cursor persisting its offset at `cursor_file`. An existing
    /// offset file is honoured; the list itself is fetched lazily.
    #[must_use]
    pub fn new(source: Box<dyn SpotListSource>, cursor_file: PathBuf) -> Self {
        let index = std::fs::read_to_string(&cursor_file)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0);
        Self {
            source,
            cursor_file,
            lines: Vec::new(),
            index,
        }
    }

    /// Offset of the next line to hand out.
    #[must_use]
    pub fn position(&self) -> usize {
        self.index
    }

    /// Hand out the next usable spot entry, advancing and persisting the
    /// cursor. Blank and malformed lines are skipped. Running past the end
    /// of the list re-fetches it and restarts from the top.
    ///
    /// # Errors
    ///
    /// Fails when the fetched list contains no usable entry at all, or when
    /// fetching or persisting the cursor fails.
    pub fn advance(&mut self) -> IndexerResult<SpotEntry> {
        if self.lines.is_empty() {
            self.refetch()?;
        }
        let mut rolled_over = false;
        loop {
            if self.index >= self.lines.len() {
                if rolled_over {
                    return Err(IndexerError::Subsystem {
                        subsystem: "spot",
                        source: "spot list contains no usable entries".into(),
                    });
                }
                self.refetch()?;
                self.index = 0;
                rolled_over = true;
                continue;
            }

            let line = self.lines[self.index].clone();
            self.index += 1;
            self.persist()?;

            let mut fields = line.split_whitespace();
            let (Some(spot), Some(path)) = (fields.next(), fields.next()) else {
                if !line.trim().is_empty() {
                    tracing::warn!(
                        target: "arcindex.checker",
                        op = "spot.skip",
                        line = %line,
                        "malformed spot line skipped"
                    );
                }
                continue;
            };
            return Ok(SpotEntry {
                spot: spot.to_owned(),
                path: path.to_owned(),
            });
        }
    }

    fn refetch(&mut self) -> IndexerResult<()> {
        self.lines = self.source.fetch()?;
        tracing::debug!(
            target: "arcindex.checker",
            op = "spot.refetch",
            line_count = self.lines.len(),
            "roots list fetched"
        );
        Ok(())
    }

    fn persist(&self) -> IndexerResult<()> {
        std::fs::write(&self.cursor_file, self.index.to_string())?;
        Ok(())
    }
}

//! Acknowledgment marshalling.
//!
//! Broker acks must be issued from the thread that owns the connection.
//! Handlers (and anything they hand work to) complete on other threads, so
//! they schedule the ack through an [`AckHandle`] and the connection loop
//! drains the channel between deliveries.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use arcindex_core::error::{IndexerError, IndexerResult};

use crate::broker::BrokerConnection;

/// Hands completed delivery tags back to the connection loop.
#[derive(Clone)]
pub struct AckHandle {
    tx: Sender<u64>,
}

impl AckHandle {
    /// Schedule an ack for the given delivery tag.
    ///
    /// # Errors
    ///
    /// Fails only when the owning scheduler is gone, which means the
    /// connection loop has already exited.
    pub fn schedule(&self, tag: u64) -> IndexerResult<()> {
        self.tx.send(tag).map_err(|_| IndexerError::Subsystem {
            subsystem: "dispatch",
            source: "ack scheduler dropped before ack".into(),
        })
    }
}

/// Connection-loop side of the ack channel.
pub struct AckScheduler {
    tx: Sender<u64>,
    rx: Receiver<u64>,
}

impl Default for AckScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AckScheduler {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A cloneable handle for completion sites.
    #[must_use]
    pub fn handle(&self) -> AckHandle {
        AckHandle {
            tx: self.tx.clone(),
        }
    }

    /// Issue every scheduled ack on the given connection. Returns how many
    /// acks were sent.
    ///
    /// # Errors
    ///
    /// Propagates the first ack failure; remaining tags stay queued.
    pub fn drain(&self, connection: &mut dyn BrokerConnection) -> IndexerResult<usize> {
        let mut drained = 0;
        loop {
            match self.rx.try_recv() {
                Ok(tag) => {
                    connection.ack(tag)?;
                    drained += 1;
                }
                Err(TryRecvError::Empty) => return Ok(drained),
                Err(TryRecvError::Disconnected) => {
                    return Err(IndexerError::Subsystem {
                        subsystem: "dispatch",
                        source: "ack channel disconnected".into(),
                    });
                }
            }
        }
    }
}

//! Consumer workers: one thread and one connection each, all competing on
//! the role's shared queue.
//!
//! A worker cycles through connection states: connect, declare topology,
//! consume. Transient broker failures drop the connection and reconnect
//! immediately; any handler error abandons the connection so the broker
//! redelivers the in-flight message; anything else is fatal and ends the
//! worker. Malformed payloads and actions without a registered handler are
//! acknowledged and dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use arcindex_core::config::{BrokerConfig, ConsumerConfig};
use arcindex_core::error::{IndexerError, IndexerResult};
use arcindex_core::message::IngestMessage;

use crate::ack::AckScheduler;
use crate::broker::{BrokerConnection, BrokerEndpoint, TopologySpec};
use crate::handlers::HandlerRegistry;

/// How long a worker blocks waiting for a delivery before rechecking its
/// stop flag and ack backlog.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lifecycle of one consumer worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    Disconnected = 0,
    Connecting = 1,
    DeclaringTopology = 2,
    Consuming = 3,
    Stopped = 4,
}

impl ConsumerState {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::DeclaringTopology,
            3 => Self::Consuming,
            4 => Self::Stopped,
            _ => Self::Disconnected,
        }
    }
}

/// One consumer worker. Owns its broker connection for the lifetime of each
/// connect-consume cycle.
pub struct ConsumerWorker {
    worker: usize,
    endpoint: Arc<dyn BrokerEndpoint>,
    topology: TopologySpec,
    registry: Arc<HandlerRegistry>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    poll_interval: Duration,
}

impl ConsumerWorker {
    #[must_use]
    pub fn new(
        worker: usize,
        endpoint: Arc<dyn BrokerEndpoint>,
        topology: TopologySpec,
        registry: Arc<HandlerRegistry>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            worker,
            endpoint,
            topology,
            registry,
            stop,
            state: Arc::new(AtomicU8::new(ConsumerState::Disconnected as u8)),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Shared view of this worker's lifecycle state.
    #[must_use]
    pub fn state_handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run until stopped or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::FatalWorker`] for unanticipated failures; all
    /// transient conditions are handled by reconnecting.
    pub fn run(&self) -> IndexerResult<()> {
        while !self.stopping() {
            self.set_state(ConsumerState::Connecting);
            let mut connection = match self.endpoint.connect() {
                Ok(connection) => connection,
                Err(error) if error.is_transient() => {
                    tracing::warn!(
                        target: "arcindex.dispatch",
                        op = "consumer.connect",
                        worker = self.worker,
                        error = %error,
                        "connect failed, retrying"
                    );
                    self.set_state(ConsumerState::Disconnected);
                    continue;
                }
                Err(error) => return Err(self.fatal(error)),
            };

            self.set_state(ConsumerState::DeclaringTopology);
            match connection.declare(&self.topology) {
                Ok(()) => {}
                Err(error) if error.is_transient() => {
                    self.set_state(ConsumerState::Disconnected);
                    continue;
                }
                Err(error) => return Err(self.fatal(error)),
            }

            self.set_state(ConsumerState::Consuming);
            let scheduler = AckScheduler::new();
            match self.consume(connection.as_mut(), &scheduler) {
                Ok(()) => break,
                Err(error) if error.is_transient() => {
                    tracing::warn!(
                        target: "arcindex.dispatch",
                        op = "consumer.reconnect",
                        worker = self.worker,
                        error = %error,
                        "connection lost, reconnecting"
                    );
                    self.set_state(ConsumerState::Disconnected);
                }
                Err(error @ IndexerError::HandlerFailure { .. }) => {
                    // Dropping the connection returns the in-flight message
                    // to the queue; the broker redelivers it.
                    tracing::error!(
                        target: "arcindex.dispatch",
                        op = "consumer.handler_failure",
                        worker = self.worker,
                        error = %error,
                        "handler failed, abandoning connection for redelivery"
                    );
                    self.set_state(ConsumerState::Disconnected);
                }
                Err(error) => return Err(self.fatal(error)),
            }
        }
        self.set_state(ConsumerState::Stopped);
        Ok(())
    }

    fn consume(
        &self,
        connection: &mut dyn BrokerConnection,
        scheduler: &AckScheduler,
    ) -> IndexerResult<()> {
        loop {
            scheduler.drain(connection)?;
            if self.stopping() {
                return Ok(());
            }
            let Some(delivery) = connection.next_delivery(self.poll_interval)? else {
                continue;
            };

            let message = match IngestMessage::decode(&delivery.body) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(
                        target: "arcindex.dispatch",
                        op = "consumer.malformed",
                        worker = self.worker,
                        error = %error,
                        "malformed payload acknowledged and dropped"
                    );
                    connection.ack(delivery.tag)?;
                    continue;
                }
            };

            let Some(handler) = self.registry.get(message.action) else {
                tracing::debug!(
                    target: "arcindex.dispatch",
                    op = "consumer.unmapped",
                    worker = self.worker,
                    action = message.action.as_wire(),
                    path = %message.filepath,
                    "no handler registered, acknowledged and dropped"
                );
                connection.ack(delivery.tag)?;
                continue;
            };

            tracing::debug!(
                target: "arcindex.dispatch",
                op = "consumer.handle",
                worker = self.worker,
                action = message.action.as_wire(),
                path = %message.filepath,
                "processing delivery"
            );
            if let Err(error) = handler.process(&message) {
                // Every handler error rides the redelivery path; only
                // transient broker errors keep their own variant so the
                // reconnect loop still recognises them.
                return Err(match error {
                    failure @ IndexerError::HandlerFailure { .. } => failure,
                    transient if transient.is_transient() => transient,
                    other => IndexerError::HandlerFailure {
                        path: message.filepath.clone(),
                        action: message.action.as_wire(),
                        source: Box::new(other),
                    },
                });
            }
            scheduler.handle().schedule(delivery.tag)?;
            scheduler.drain(connection)?;
        }
    }

    fn fatal(&self, error: IndexerError) -> IndexerError {
        // The worker thread is about to exit; its state must say so.
        self.set_state(ConsumerState::Stopped);
        tracing::error!(
            target: "arcindex.dispatch",
            op = "consumer.fatal",
            worker = self.worker,
            error = %error,
            "unexpected error, worker exiting"
        );
        IndexerError::FatalWorker {
            worker: format!("arcindex-worker-{}", self.worker),
            source: Box::new(error),
        }
    }
}

/// Spawns and supervises one [`ConsumerWorker`] thread per configured slot.
/// All workers consume the same shared queue, so a published event reaches
/// exactly one of them.
#[derive(Debug)]
pub struct ConsumerPool {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    states: Vec<Arc<AtomicU8>>,
}

impl ConsumerPool {
    /// Validate configuration and start every worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidConfig`] for bad settings and wraps
    /// thread-spawn failures.
    pub fn start(
        endpoint: Arc<dyn BrokerEndpoint>,
        broker_config: &BrokerConfig,
        consumer_config: &ConsumerConfig,
        registry: Arc<HandlerRegistry>,
    ) -> IndexerResult<Self> {
        broker_config.validate()?;
        consumer_config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let topology = TopologySpec::from_config(broker_config);
        let mut handles = Vec::with_capacity(consumer_config.workers);
        let mut states = Vec::with_capacity(consumer_config.workers);

        for slot in 0..consumer_config.workers {
            let worker = ConsumerWorker::new(
                slot,
                Arc::clone(&endpoint),
                topology.clone(),
                Arc::clone(&registry),
                Arc::clone(&stop),
            );
            states.push(worker.state_handle());
            let handle = std::thread::Builder::new()
                .name(format!("arcindex-worker-{slot}"))
                .spawn(move || {
                    if let Err(error) = worker.run() {
                        tracing::error!(
                            target: "arcindex.dispatch",
                            op = "pool.worker_exit",
                            worker = slot,
                            error = %error,
                            "worker thread exited fatally"
                        );
                    }
                })
                .map_err(|error| IndexerError::subsystem("dispatch", error))?;
            handles.push(handle);
        }

        Ok(Self {
            stop,
            handles,
            states,
        })
    }

    /// Lifecycle state of one worker slot.
    #[must_use]
    pub fn worker_state(&self, slot: usize) -> ConsumerState {
        self.states
            .get(slot)
            .map_or(ConsumerState::Stopped, |state| {
                ConsumerState::from_u8(state.load(Ordering::SeqCst))
            })
    }

    /// Signal every worker to stop and wait for their threads to finish.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles {
            if handle.join().is_err() {
                tracing::error!(
                    target: "arcindex.dispatch",
                    op = "pool.join",
                    "worker thread panicked"
                );
            }
        }
    }
}

//! Broker abstraction and the in-memory broker.
//!
//! The wire protocol lives behind [`BrokerEndpoint`] and [`BrokerConnection`];
//! the dispatch engine only knows topology declaration, deliveries, acks and
//! publishes. [`InMemoryBroker`] implements the same at-least-once contract a
//! real broker gives us: a delivery stays owned by its connection until acked,
//! and goes back on the queue when the connection dies first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arcindex_core::config::BrokerConfig;
use arcindex_core::error::{IndexerError, IndexerResult};
use arcindex_core::message::IngestMessage;
use arcindex_core::traits::EventPublisher;

/// Topology every worker declares at connection time: the upstream fanout
/// exchange, a derived fanout exchange bound to it, and the role's shared
/// queue bound to the derived exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySpec {
    pub source_exchange: String,
    pub dest_exchange: String,
    pub queue: String,
    pub prefetch: u16,
}

impl TopologySpec {
    /// Topology for a configured consumer role. Every worker of the role
    /// declares the same queue and competes for its deliveries; declaration
    /// is idempotent, so racing workers are harmless.
    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            source_exchange: config.source_exchange.clone(),
            dest_exchange: config.dest_exchange.clone(),
            queue: config.queue_name.clone(),
            prefetch: config.prefetch,
        }
    }
}

/// One message handed to a consumer, with the tag its ack must quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
}

/// A live connection to the broker. Not `Sync`: each worker thread owns one.
pub trait BrokerConnection: Send {
    /// Declare exchanges, queue and bindings, and start consuming.
    fn declare(&mut self, topology: &TopologySpec) -> IndexerResult<()>;

    /// Wait up to `timeout` for the next delivery. `Ok(None)` means the
    /// timeout elapsed with nothing to consume, which is not an error.
    fn next_delivery(&mut self, timeout: Duration) -> IndexerResult<Option<Delivery>>;

    /// Acknowledge one delivery. Must only be called from the thread driving
    /// this connection.
    fn ack(&mut self, tag: u64) -> IndexerResult<()>;

    /// Publish a message body. An empty exchange routes directly to the
    /// queue named by `routing_key`; otherwise the exchange fans out.
    fn publish(&mut self, exchange: &str, routing_key: &str, body: &[u8]) -> IndexerResult<()>;
}

/// Factory for broker connections; shared across worker threads.
pub trait BrokerEndpoint: Send + Sync {
    fn connect(&self) -> IndexerResult<Box<dyn BrokerConnection>>;
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    /// exchange name -> queues bound to it
    queue_bindings: HashMap<String, HashSet<String>>,
    /// exchange name -> downstream exchanges bound to it
    exchange_bindings: HashMap<String, HashSet<String>>,
    /// Bumped by [`InMemoryBroker::sever_connections`]; connections born
    /// before the current generation fail their next operation.
    generation: u64,
}

impl BrokerState {
    /// Queues reachable from `exchange` through fanout bindings.
    fn fanout_targets(&self, exchange: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut pending = vec![exchange.to_owned()];
        let mut queues = Vec::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(bound) = self.queue_bindings.get(&current) {
                for queue in bound {
                    queues.push(queue.clone());
                }
            }
            if let Some(downstream) = self.exchange_bindings.get(&current) {
                pending.extend(downstream.iter().cloned());
            }
        }
        queues.sort();
        queues
    }
}

/// Process-local broker with real redelivery semantics.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<(Mutex<BrokerState>, Condvar)>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently ready (not in flight) on a queue.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> usize {
        let (lock, _) = &*self.shared;
        lock.lock()
            .map(|state| state.queues.get(queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Simulate losing every open connection. In-flight deliveries return to
    /// their queues the next time each connection is touched or dropped.
    pub fn sever_connections(&self) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut state) = lock.lock() {
            state.generation += 1;
        }
        cvar.notify_all();
    }
}

impl BrokerEndpoint for InMemoryBroker {
    fn connect(&self) -> IndexerResult<Box<dyn BrokerConnection>> {
        let generation = {
            let (lock, _) = &*self.shared;
            lock_state(lock)?.generation
        };
        Ok(Box::new(InMemoryConnection {
            shared: Arc::clone(&self.shared),
            consuming: None,
            prefetch: 1,
            unacked: HashMap::new(),
            next_tag: 1,
            generation,
        }))
    }
}

struct InMemoryConnection {
    shared: Arc<(Mutex<BrokerState>, Condvar)>,
    consuming: Option<String>,
    prefetch: usize,
    unacked: HashMap<u64, (String, Vec<u8>)>,
    next_tag: u64,
    generation: u64,
}

impl InMemoryConnection {
    /// Fail with a transient error when the broker has severed us, returning
    /// every in-flight delivery to its queue first.
    fn ensure_live(&mut self, state: &mut BrokerState, cvar: &Condvar) -> IndexerResult<()> {
        if self.generation == state.generation {
            return Ok(());
        }
        requeue(state, std::mem::take(&mut self.unacked));
        cvar.notify_all();
        Err(IndexerError::TransientBroker {
            detail: "connection severed by broker".to_owned(),
        })
    }
}

fn requeue(state: &mut BrokerState, unacked: HashMap<u64, (String, Vec<u8>)>) {
    for (_tag, (queue, body)) in unacked {
        state.queues.entry(queue).or_default().push_front(body);
    }
}

fn lock_state<'a>(
    lock: &'a Mutex<BrokerState>,
) -> IndexerResult<MutexGuard<'a, BrokerState>> {
    lock.lock().map_err(|_| IndexerError::Subsystem {
        subsystem: "broker",
        source: "broker state lock poisoned".into(),
    })
}

impl BrokerConnection for InMemoryConnection {
    fn declare(&mut self, topology: &TopologySpec) -> IndexerResult<()> {
        let shared = Arc::clone(&self.shared);
        let (lock, cvar) = &*shared;
        let mut state = lock_state(lock)?;
        self.ensure_live(&mut state, cvar)?;

        state
            .exchange_bindings
            .entry(topology.source_exchange.clone())
            .or_default()
            .insert(topology.dest_exchange.clone());
        state.queues.entry(topology.queue.clone()).or_default();
        state
            .queue_bindings
            .entry(topology.dest_exchange.clone())
            .or_default()
            .insert(topology.queue.clone());

        self.consuming = Some(topology.queue.clone());
        self.prefetch = usize::from(topology.prefetch.max(1));
        tracing::debug!(
            target: "arcindex.dispatch",
            op = "broker.declare",
            queue = %topology.queue,
            dest_exchange = %topology.dest_exchange,
            prefetch = topology.prefetch,
            "topology declared"
        );
        Ok(())
    }

    fn next_delivery(&mut self, timeout: Duration) -> IndexerResult<Option<Delivery>> {
        let shared = Arc::clone(&self.shared);
        let (lock, cvar) = &*shared;
        let mut state = lock_state(lock)?;
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_live(&mut state, cvar)?;
            let queue = self.consuming.as_ref().ok_or(IndexerError::Subsystem {
                subsystem: "broker",
                source: "next_delivery before declare".into(),
            })?;

            if self.unacked.len() < self.prefetch {
                if let Some(body) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    let tag = self.next_tag;
                    self.next_tag += 1;
                    self.unacked.insert(tag, (queue.clone(), body.clone()));
                    return Ok(Some(Delivery { tag, body }));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = cvar
                .wait_timeout(state, deadline - now)
                .map_err(|_| IndexerError::Subsystem {
                    subsystem: "broker",
                    source: "broker state lock poisoned".into(),
                })?;
            state = guard;
        }
    }

    fn ack(&mut self, tag: u64) -> IndexerResult<()> {
        let shared = Arc::clone(&self.shared);
        let (lock, cvar) = &*shared;
        let mut state = lock_state(lock)?;
        self.ensure_live(&mut state, cvar)?;
        if self.unacked.remove(&tag).is_none() {
            return Err(IndexerError::Subsystem {
                subsystem: "broker",
                source: format!("ack of unknown delivery tag {tag}").into(),
            });
        }
        cvar.notify_all();
        Ok(())
    }

    fn publish(&mut self, exchange: &str, routing_key: &str, body: &[u8]) -> IndexerResult<()> {
        let shared = Arc::clone(&self.shared);
        let (lock, cvar) = &*shared;
        let mut state = lock_state(lock)?;
        self.ensure_live(&mut state, cvar)?;

        if exchange.is_empty() {
            state
                .queues
                .entry(routing_key.to_owned())
                .or_default()
                .push_back(body.to_vec());
        } else {
            for queue in state.fanout_targets(exchange) {
                state
                    .queues
                    .entry(queue)
                    .or_default()
                    .push_back(body.to_vec());
            }
        }
        cvar.notify_all();
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut state) = lock.lock() {
            requeue(&mut state, std::mem::take(&mut self.unacked));
            cvar.notify_all();
        }
    }
}

/// Publishes corrective events over a broker connection.
pub struct CorrectivePublisher {
    connection: Box<dyn BrokerConnection>,
    exchange: String,
}

impl CorrectivePublisher {
    /// Publish to a fanout exchange so every bound consumer role sees the
    /// corrective. Pass an empty exchange name to target a single queue via
    /// [`EventPublisher::publish`]'s routing.
    #[must_use]
    pub fn new(connection: Box<dyn BrokerConnection>, exchange: impl Into<String>) -> Self {
        Self {
            connection,
            exchange: exchange.into(),
        }
    }
}

impl EventPublisher for CorrectivePublisher {
    fn publish(&mut self, message: &IngestMessage) -> IndexerResult<()> {
        let line = message.to_legacy_line();
        tracing::debug!(
            target: "arcindex.dispatch",
            op = "corrective.publish",
            path = %message.filepath,
            action = message.action.as_wire(),
            "corrective event published"
        );
        self.connection
            .publish(&self.exchange, &message.filepath, line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcindex_core::message::ActionKind;

    const POLL: Duration = Duration::from_millis(50);

    fn topology(queue: &str) -> TopologySpec {
        TopologySpec {
            source_exchange: "deposit_logs".to_owned(),
            dest_exchange: "arcindex_updates".to_owned(),
            queue: queue.to_owned(),
            prefetch: 1,
        }
    }

    #[test]
    fn topology_uses_the_shared_role_queue() {
        let spec = TopologySpec::from_config(&BrokerConfig::default());
        assert_eq!(spec.queue, "arcindex_queue");
        assert_eq!(spec.prefetch, 1);
    }

    #[test]
    fn competing_consumers_split_a_queue_without_duplication() {
        let broker = InMemoryBroker::new();
        let mut first = broker.connect().expect("connect should succeed");
        first.declare(&topology("q0")).expect("declare should succeed");
        let mut second = broker.connect().expect("connect should succeed");
        second.declare(&topology("q0")).expect("declare should succeed");

        let mut producer = broker.connect().expect("connect should succeed");
        producer.publish("", "q0", b"single").expect("should publish");

        let to_first = first
            .next_delivery(POLL)
            .expect("receive should succeed");
        let to_second = second
            .next_delivery(POLL)
            .expect("receive should succeed");
        assert!(
            to_first.is_some() != to_second.is_some(),
            "exactly one consumer must receive the body"
        );
    }

    #[test]
    fn fanout_reaches_queues_through_derived_exchanges() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");

        let mut producer = broker.connect().expect("connect should succeed");
        producer
            .publish("deposit_logs", "", b"event body")
            .expect("publish should succeed");

        let delivery = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("delivery should arrive");
        assert_eq!(delivery.body, b"event body");
    }

    #[test]
    fn empty_exchange_routes_directly_to_queue() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");

        let mut producer = broker.connect().expect("connect should succeed");
        producer
            .publish("", "q0", b"direct")
            .expect("publish should succeed");

        let delivery = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("delivery should arrive");
        assert_eq!(delivery.body, b"direct");
    }

    #[test]
    fn prefetch_window_holds_one_in_flight_delivery() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");

        let mut producer = broker.connect().expect("connect should succeed");
        producer.publish("", "q0", b"first").expect("should publish");
        producer.publish("", "q0", b"second").expect("should publish");

        let first = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("first delivery");
        // The window is full until the ack lands.
        assert!(consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .is_none());

        consumer.ack(first.tag).expect("ack should succeed");
        let second = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("second delivery");
        assert_eq!(second.body, b"second");
    }

    #[test]
    fn dropping_a_connection_requeues_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        {
            let mut consumer = broker.connect().expect("connect should succeed");
            consumer
                .declare(&topology("q0"))
                .expect("declare should succeed");
            let mut producer = broker.connect().expect("connect should succeed");
            producer.publish("", "q0", b"orphan").expect("should publish");
            let _unacked = consumer
                .next_delivery(POLL)
                .expect("receive should succeed")
                .expect("delivery");
            assert_eq!(broker.queue_depth("q0"), 0);
        }
        assert_eq!(broker.queue_depth("q0"), 1, "unacked body must return");

        let mut replacement = broker.connect().expect("connect should succeed");
        replacement
            .declare(&topology("q0"))
            .expect("declare should succeed");
        let redelivered = replacement
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("redelivery");
        assert_eq!(redelivered.body, b"orphan");
    }

    #[test]
    fn severed_connection_fails_transient_and_redelivers() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");
        let mut producer = broker.connect().expect("connect should succeed");
        producer.publish("", "q0", b"in flight").expect("should publish");
        let delivery = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("delivery");

        broker.sever_connections();

        let err = consumer.ack(delivery.tag).expect_err("ack must fail");
        assert!(err.is_transient());
        assert_eq!(broker.queue_depth("q0"), 1, "delivery must be requeued");

        let mut fresh = broker.connect().expect("connect should succeed");
        fresh
            .declare(&topology("q0"))
            .expect("declare should succeed");
        let redelivered = fresh
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("redelivery");
        assert_eq!(redelivered.body, b"in flight");
    }

    #[test]
    fn ack_of_unknown_tag_is_an_error() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");
        assert!(consumer.ack(99).is_err());
    }

    #[test]
    fn corrective_publisher_emits_decodable_legacy_lines() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.connect().expect("connect should succeed");
        consumer
            .declare(&topology("q0"))
            .expect("declare should succeed");

        let connection = broker.connect().expect("connect should succeed");
        let mut publisher = CorrectivePublisher::new(connection, "deposit_logs");
        let corrective = IngestMessage::corrective("/neodc/obs/dir", ActionKind::Mkdir);
        publisher.publish(&corrective).expect("publish should succeed");

        let delivery = consumer
            .next_delivery(POLL)
            .expect("receive should succeed")
            .expect("delivery should arrive");
        let decoded = IngestMessage::decode(&delivery.body).expect("line should decode");
        assert_eq!(decoded, corrective);
    }
}

//! Configuration types for the archive index synchroniser.
//!
//! Each component owns one config struct with sensible defaults. Loading and
//! merging config files is a deployment concern; these types only define the
//! knobs, their defaults, and environment-variable overrides.

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, IndexerResult};

/// Broker topology declared by every consumer at connection time.
///
/// The upstream deposit log publishes to a fanout exchange; each consumer
/// role declares its own derived fanout exchange bound to it, plus one
/// durable queue bound to the derived exchange that all of the role's
/// workers consume from.
///
/// # Environment Variable Overrides
///
/// | Variable                  | Field              | Default              |
/// |---------------------------|--------------------|----------------------|
/// | `ARCINDEX_BROKER_HOST`    | `host`             | `localhost`          |
/// | `ARCINDEX_SOURCE_EXCHANGE`| `source_exchange`  | `deposit_logs`       |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,
    /// Virtual host on the broker.
    pub vhost: String,
    /// Upstream fanout exchange the deposit log publishes to.
    pub source_exchange: String,
    /// Derived fanout exchange owned by this consumer role, bound to
    /// `source_exchange`.
    pub dest_exchange: String,
    /// Durable queue shared by every worker of this role; workers compete
    /// for its deliveries.
    pub queue_name: String,
    /// Unacknowledged-delivery window per consumer. Default 1: a worker holds
    /// at most one in-flight message, so redelivery order stays predictable.
    pub prefetch: u16,
    /// Heartbeat interval in seconds advertised to the broker.
    pub heartbeat_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            vhost: "/".to_owned(),
            source_exchange: "deposit_logs".to_owned(),
            dest_exchange: "arcindex_updates".to_owned(),
            queue_name: "arcindex_queue".to_owned(),
            prefetch: 1,
            heartbeat_secs: 300,
        }
    }
}

impl BrokerConfig {
    /// Load overrides from environment variables.
    ///
    /// Only overrides fields for which environment variables are set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("ARCINDEX_BROKER_HOST") {
            if !val.is_empty() {
                self.host = val;
            }
        }
        if let Ok(val) = std::env::var("ARCINDEX_SOURCE_EXCHANGE") {
            if !val.is_empty() {
                self.source_exchange = val;
            }
        }
        self
    }

    /// Reject values the dispatch engine cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> IndexerResult<()> {
        if self.prefetch == 0 {
            return Err(IndexerError::InvalidConfig {
                field: "broker.prefetch".to_owned(),
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        for (field, value) in [
            ("broker.source_exchange", &self.source_exchange),
            ("broker.dest_exchange", &self.dest_exchange),
            ("broker.queue_name", &self.queue_name),
        ] {
            if value.trim().is_empty() {
                return Err(IndexerError::InvalidConfig {
                    field: field.to_owned(),
                    value: value.clone(),
                    reason: "must be non-empty".to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Per-role consumer pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Number of worker threads, each with its own connection to the role's
    /// shared queue.
    pub workers: usize,
    /// Events younger than this (seconds) may describe files the filesystem
    /// has not surfaced yet; they get one bounded visibility wait.
    /// Default: 300.
    pub recent_event_threshold_secs: u64,
    /// Length of the single visibility sleep, in seconds. Default: 60.
    pub visibility_wait_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            recent_event_threshold_secs: 300,
            visibility_wait_secs: 60,
        }
    }
}

impl ConsumerConfig {
    /// Reject values the consumer pool cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> IndexerResult<()> {
        if self.workers == 0 {
            return Err(IndexerError::InvalidConfig {
                field: "consumer.workers".to_owned(),
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Path resolution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Wholesale catalogue re-fetch cadence, in seconds. Default: 1800
    /// (30 minutes). Timers are caller-owned; this is the interval they
    /// are constructed with.
    pub refresh_interval_secs: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30 * 60,
        }
    }
}

impl ResolveConfig {
    /// Reject values the resolver cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> IndexerResult<()> {
        if self.refresh_interval_secs == 0 {
            return Err(IndexerError::InvalidConfig {
                field: "resolve.refresh_interval_secs".to_owned(),
                value: "0".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

/// Consistency crawler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Directory holding the two durable queue databases and the spot cursor
    /// file.
    pub state_dir: std::path::PathBuf,
    /// Restricted mode: sweep-queue exhaustion does not trigger a crawl
    /// refill from the spot cursor. Default: false.
    pub dev_mode: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            state_dir: std::path::PathBuf::from("/var/lib/arcindex"),
            dev_mode: false,
        }
    }
}

//! Unified error type covering all failure modes across the arcindex pipeline.

/// Unified error type for the event ingestion, path resolution and
/// reconciliation components.
///
/// Every variant carries an actionable message. The dispatch engine handles
/// `MalformedMessage` locally (acknowledge and drop), reconnects on
/// `TransientBroker` and `HandlerFailure`, and treats anything unexpected as
/// `FatalWorker`, leaving the restart to process supervision.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// The wire payload could not be decoded by either the structured or the
    /// legacy text form. Never retried: the broker copy is acknowledged and
    /// the payload dropped.
    #[error("Malformed message: {detail}. Payload is dropped after acknowledgment.")]
    MalformedMessage {
        /// What failed during decoding.
        detail: String,
    },

    /// An update handler raised while processing a decoded message.
    ///
    /// The dispatch engine re-raises this as fatal to the current connection;
    /// broker redelivery is the retry mechanism.
    #[error("Handler failed for {path} ({action}): {source}. Message will be redelivered.")]
    HandlerFailure {
        /// Archive path of the failing message.
        path: String,
        /// Wire action of the failing message.
        action: &'static str,
        /// The underlying handler error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The broker connection or stream was lost. Caught by the consume loop
    /// and retried with an immediate reconnect.
    #[error("Broker connection lost: {detail}. Reconnecting.")]
    TransientBroker {
        /// Why the connection is considered gone.
        detail: String,
    },

    /// A catalogue re-fetch failed. The previous snapshot stays in place and
    /// the caller must not reset its refresh timer.
    #[error("Catalogue refresh failed: {source}. Previous snapshot retained.")]
    RefreshFailure {
        /// The underlying fetch or parse error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Anything unanticipated at the top of a worker loop. The worker exits
    /// and is not restarted automatically.
    #[error("Fatal worker error in {worker}: {source}")]
    FatalWorker {
        /// Name of the worker that died.
        worker: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Wraps `std::io::Error` for filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps errors from subsystem internals (durable queue, broker, spot
    /// cursor), so call sites stay stable across subsystems.
    #[error("{subsystem} error: {source}")]
    Subsystem {
        /// Which subsystem produced the error (e.g. "queue", "broker").
        subsystem: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl IndexerError {
    /// Wrap an arbitrary error as a subsystem failure.
    pub fn subsystem<E>(subsystem: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Subsystem {
            subsystem,
            source: Box::new(source),
        }
    }

    /// True when the dispatch engine should reconnect rather than die.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBroker { .. })
    }
}

/// Convenience alias used throughout the arcindex crate hierarchy.
pub type IndexerResult<T> = Result<T, IndexerError>;

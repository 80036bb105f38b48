//! Tracing target and span-name conventions for arcindex.
//!
//! Every component logs under `target: "arcindex.<area>"` with an `op` field
//! naming the operation. Subscriber installation is the host application's
//! job; this module only fixes the names so filters and dashboards can rely
//! on them:
//!
//! ```text
//! RUST_LOG=arcindex=debug
//! ```

use tracing::Level;

/// Target prefix used by all arcindex tracing spans and events.
pub const TARGET_PREFIX: &str = "arcindex";

/// Standard tracing span names used across the pipeline.
pub mod span_names {
    /// One consumer worker's connect-consume lifecycle.
    pub const CONSUME: &str = "arcindex::consume";
    /// Processing of one delivered message.
    pub const HANDLE_MESSAGE: &str = "arcindex::handle_message";
    /// Wholesale catalogue snapshot rebuild.
    pub const CATALOGUE_REFRESH: &str = "arcindex::catalogue_refresh";
    /// Reconciliation of one queued directory entry.
    pub const RECONCILE_ENTRY: &str = "arcindex::reconcile_entry";
    /// Spot-cursor crawl refill of the sweep queue.
    pub const CRAWL_REFILL: &str = "arcindex::crawl_refill";
}

/// Standard structured field names used in tracing events.
pub mod field_names {
    pub const OP: &str = "op";
    pub const WORKER: &str = "worker";
    pub const QUEUE: &str = "queue";
    pub const PATH: &str = "path";
    pub const ACTION: &str = "action";
    pub const DOC_ID: &str = "doc_id";
    pub const RECORD_COUNT: &str = "record_count";
    pub const EVENT_COUNT: &str = "event_count";
    pub const DEPTH: &str = "depth";
}

/// Parse a log level string (case-insensitive).
///
/// Recognized values: `trace`, `debug`, `info`, `warn`, `error`.
/// Returns `None` for unrecognized strings.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Returns the recommended `tracing::Level` for the given environment.
///
/// Checks `ARCINDEX_LOG_LEVEL` first, then falls back to the provided
/// default.
#[must_use]
pub fn level_from_env(default: Level) -> Level {
    std::env::var("ARCINDEX_LOG_LEVEL")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_prefix_is_arcindex() {
        assert_eq!(TARGET_PREFIX, "arcindex");
    }

    #[test]
    fn all_span_names_start_with_target_prefix() {
        let all_spans = [
            span_names::CONSUME,
            span_names::HANDLE_MESSAGE,
            span_names::CATALOGUE_REFRESH,
            span_names::RECONCILE_ENTRY,
            span_names::CRAWL_REFILL,
        ];
        for span in all_spans {
            assert!(
                span.starts_with(&format!("{TARGET_PREFIX}::")),
                "span {span:?} must start with \"{TARGET_PREFIX}::\"",
            );
        }
    }

    #[test]
    fn parse_level_recognizes_valid_levels() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("Debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("error"), Some(Level::ERROR));
    }

    #[test]
    fn parse_level_returns_none_for_invalid() {
        assert_eq!(parse_level("nonsense"), None);
        assert_eq!(parse_level(""), None);
        assert_eq!(parse_level(" info"), None);
    }

    #[test]
    fn level_from_env_uses_default_when_var_unset() {
        fn level_from_custom_key(key: &str, default: Level) -> Level {
            std::env::var(key)
                .ok()
                .and_then(|s| parse_level(&s))
                .unwrap_or(default)
        }
        let level = level_from_custom_key("ARCINDEX_NEVER_SET_12345", Level::WARN);
        assert_eq!(level, Level::WARN);
    }
}

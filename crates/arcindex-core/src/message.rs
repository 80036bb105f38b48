//! Ingest message model: one typed event per wire message.
//!
//! Two wire forms decode to the same typed value:
//! - structured: a JSON object with `datetime`, `filepath`, `action`,
//!   `filesize`, `message` fields;
//! - legacy text: six colon-delimited fields where the first three jointly
//!   form the timestamp
//!   (`TIMESTAMP:TIMESTAMP:TIMESTAMP:PATH:ACTION:SIZE:FREEFORM`).
//!
//! The reconciliation crawler publishes corrective events in the legacy form
//! (`now():PATH:ACTION::`), so [`IngestMessage::corrective`] and
//! [`decode`](IngestMessage::decode) form a strict round-trip contract.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, IndexerResult};

/// File name that marks directory-level documentation in the archive.
pub const README_SENTINEL: &str = "00README";

/// Timestamp layout used by legacy deposit-log lines and corrective events.
/// Contains exactly two colons, so a rendered stamp occupies the first three
/// colon-delimited fields of a legacy line.
const LEGACY_STAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S%.6f";

/// Closed set of change-event kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Deposit,
    Remove,
    Mkdir,
    Rmdir,
    Symlink,
    ReadmeAdded,
    JsonRefresh,
}

impl ActionKind {
    /// Every variant, in dispatch-table order.
    pub const ALL: [Self; 7] = [
        Self::Deposit,
        Self::Remove,
        Self::Mkdir,
        Self::Rmdir,
        Self::Symlink,
        Self::ReadmeAdded,
        Self::JsonRefresh,
    ];

    /// Wire representation used by both message forms.
    #[must_use]
    pub const fn as_wire(self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Remove => "REMOVE",
            Self::Mkdir => "MKDIR",
            Self::Rmdir => "RMDIR",
            Self::Symlink => "SYMLINK",
            Self::ReadmeAdded => "00README",
            Self::JsonRefresh => "JSON_REFRESH",
        }
    }

    /// Parse the wire representation, tolerating lowercase producers.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DEPOSIT" => Some(Self::Deposit),
            "REMOVE" => Some(Self::Remove),
            "MKDIR" => Some(Self::Mkdir),
            "RMDIR" => Some(Self::Rmdir),
            "SYMLINK" => Some(Self::Symlink),
            "00README" => Some(Self::ReadmeAdded),
            "JSON_REFRESH" => Some(Self::JsonRefresh),
            _ => None,
        }
    }

    /// Stable slot index for dispatch tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Deposit => 0,
            Self::Remove => 1,
            Self::Mkdir => 2,
            Self::Rmdir => 3,
            Self::Symlink => 4,
            Self::ReadmeAdded => 5,
            Self::JsonRefresh => 6,
        }
    }
}

/// Shape of the structured JSON wire form.
#[derive(Debug, Serialize, Deserialize)]
struct StructuredMessage {
    datetime: String,
    filepath: String,
    action: String,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    message: String,
}

/// One decoded filesystem-change event.
///
/// `filepath` and `action` are always present: absence of either in a wire
/// payload is a decode failure, never a partially-populated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestMessage {
    /// Event timestamp as rendered by the producer.
    pub datetime: String,
    /// Absolute archive path the event refers to.
    pub filepath: String,
    /// What happened to the path.
    pub action: ActionKind,
    /// File size in bytes, when the producer knew it.
    pub filesize: Option<u64>,
    /// Freeform producer note; may contain colons.
    pub message: String,
}

impl IngestMessage {
    /// Decode one raw wire payload.
    ///
    /// Attempts the structured JSON form first; on structural failure, falls
    /// back to the legacy colon-delimited form. Both forms must yield a
    /// non-empty path and a known action.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::MalformedMessage`] when neither form decodes.
    pub fn decode(raw: &[u8]) -> IndexerResult<Self> {
        let body = std::str::from_utf8(raw).map_err(|error| IndexerError::MalformedMessage {
            detail: format!("payload is not valid UTF-8: {error}"),
        })?;

        if let Ok(structured) = serde_json::from_str::<StructuredMessage>(body) {
            return Self::from_structured(structured);
        }
        Self::from_legacy(body)
    }

    fn from_structured(raw: StructuredMessage) -> IndexerResult<Self> {
        let action = require_action(&raw.action)?;
        require_path(&raw.filepath)?;
        Ok(Self {
            datetime: raw.datetime,
            filepath: raw.filepath,
            action,
            filesize: raw.filesize,
            message: raw.message,
        })
    }

    fn from_legacy(body: &str) -> IndexerResult<Self> {
        let fields: Vec<&str> = body.trim().split(':').collect();
        if fields.len() < 6 {
            return Err(IndexerError::MalformedMessage {
                detail: format!("expected 6 colon-delimited fields, found {}", fields.len()),
            });
        }

        let action = require_action(fields[4])?;
        require_path(fields[3])?;
        Ok(Self {
            datetime: fields[..3].join(":"),
            filepath: fields[3].to_owned(),
            action,
            // The size field may legitimately be empty (corrective events).
            filesize: fields[5].trim().parse().ok(),
            message: fields[6..].join(":"),
        })
    }

    /// Build a corrective event in the shape the crawler publishes:
    /// `now():PATH:ACTION::`.
    #[must_use]
    pub fn corrective(filepath: impl Into<String>, action: ActionKind) -> Self {
        Self {
            datetime: legacy_stamp(Utc::now()),
            filepath: filepath.into(),
            action,
            filesize: None,
            message: String::new(),
        }
    }

    /// Render the legacy text wire form.
    #[must_use]
    pub fn to_legacy_line(&self) -> String {
        let size = self
            .filesize
            .map_or_else(String::new, |bytes| bytes.to_string());
        format!(
            "{}:{}:{}:{}:{}",
            self.datetime,
            self.filepath,
            self.action.as_wire(),
            size,
            self.message
        )
    }

    /// Render the structured JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a malformed-message error if serialization fails, which only
    /// happens for non-serializable field contents.
    pub fn to_structured_json(&self) -> IndexerResult<String> {
        let raw = StructuredMessage {
            datetime: self.datetime.clone(),
            filepath: self.filepath.clone(),
            action: self.action.as_wire().to_owned(),
            filesize: self.filesize,
            message: self.message.clone(),
        };
        serde_json::to_string(&raw).map_err(|error| IndexerError::MalformedMessage {
            detail: format!("could not encode structured form: {error}"),
        })
    }

    /// Parse the event timestamp, if it is in a recognized layout.
    ///
    /// Used by the bounded file-visibility wait: an unparseable timestamp is
    /// treated as an old event (no wait), never as an error.
    #[must_use]
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        const FORMATS: [&str; 4] = [
            LEGACY_STAMP_FORMAT,
            "%Y-%m-%d-%H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
        ];
        FORMATS.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(&self.datetime, format)
                .ok()
                .map(|naive| naive.and_utc())
        })
    }
}

fn require_action(value: &str) -> IndexerResult<ActionKind> {
    ActionKind::from_wire(value).ok_or_else(|| IndexerError::MalformedMessage {
        detail: format!("unknown action {value:?}"),
    })
}

fn require_path(value: &str) -> IndexerResult<()> {
    if value.trim().is_empty() {
        return Err(IndexerError::MalformedMessage {
            detail: "filepath field is empty".to_owned(),
        });
    }
    Ok(())
}

/// Render a timestamp in the legacy two-colon layout.
#[must_use]
pub fn legacy_stamp(at: DateTime<Utc>) -> String {
    at.format(LEGACY_STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IngestMessage {
        IngestMessage {
            datetime: "2026-08-29-10:15:30.000000".to_owned(),
            filepath: "/neodc/esacci/biomass/data.nc".to_owned(),
            action: ActionKind::Deposit,
            filesize: Some(1024),
            message: "deposited by ingest".to_owned(),
        }
    }

    #[test]
    fn legacy_and_structured_forms_decode_identically() {
        let message = sample();
        let legacy = IngestMessage::decode(message.to_legacy_line().as_bytes())
            .expect("legacy form should decode");
        let structured = IngestMessage::decode(
            message
                .to_structured_json()
                .expect("structured form should encode")
                .as_bytes(),
        )
        .expect("structured form should decode");

        assert_eq!(legacy, message);
        assert_eq!(structured, message);
        assert_eq!(legacy, structured);
    }

    #[test]
    fn legacy_decode_joins_timestamp_triplet() {
        let decoded = IngestMessage::decode(
            b"2026-08-29-10:15:30.000000:/neodc/obs/file.txt:DEPOSIT:42:note",
        )
        .expect("line should decode");
        assert_eq!(decoded.datetime, "2026-08-29-10:15:30.000000");
        assert_eq!(decoded.filepath, "/neodc/obs/file.txt");
        assert_eq!(decoded.action, ActionKind::Deposit);
        assert_eq!(decoded.filesize, Some(42));
        assert_eq!(decoded.message, "note");
    }

    #[test]
    fn legacy_decode_rejoins_freeform_colons() {
        let decoded =
            IngestMessage::decode(b"a:b:c:/neodc/obs/file.txt:REMOVE::reason: disk swap")
                .expect("line should decode");
        assert_eq!(decoded.message, "reason: disk swap");
        assert_eq!(decoded.filesize, None);
    }

    #[test]
    fn corrective_event_round_trips() {
        let corrective = IngestMessage::corrective("/neodc/obs/new_file.nc", ActionKind::Mkdir);
        let line = corrective.to_legacy_line();
        assert!(line.ends_with("::"), "corrective line was {line:?}");

        let decoded = IngestMessage::decode(line.as_bytes()).expect("corrective should decode");
        assert_eq!(decoded.filepath, corrective.filepath);
        assert_eq!(decoded.action, corrective.action);
        assert_eq!(decoded, corrective);
    }

    #[test]
    fn corrective_round_trips_for_every_action() {
        for action in ActionKind::ALL {
            let corrective = IngestMessage::corrective("/archive/spot/dir", action);
            let decoded = IngestMessage::decode(corrective.to_legacy_line().as_bytes())
                .expect("corrective should decode");
            assert_eq!(decoded.action, action);
            assert_eq!(decoded.filepath, "/archive/spot/dir");
        }
    }

    #[test]
    fn too_few_fields_is_malformed() {
        let err = IngestMessage::decode(b"just:three:fields").expect_err("should fail");
        assert!(matches!(err, IndexerError::MalformedMessage { .. }));
    }

    #[test]
    fn unknown_action_is_malformed_in_both_forms() {
        let err = IngestMessage::decode(b"a:b:c:/path:SHRED:0:").expect_err("should fail");
        assert!(err.to_string().contains("SHRED"));

        let err = IngestMessage::decode(
            br#"{"datetime":"t","filepath":"/path","action":"SHRED","filesize":null,"message":""}"#,
        )
        .expect_err("should fail");
        assert!(matches!(err, IndexerError::MalformedMessage { .. }));
    }

    #[test]
    fn empty_path_is_malformed_not_partial() {
        let err = IngestMessage::decode(b"a:b:c::DEPOSIT:0:").expect_err("should fail");
        assert!(matches!(err, IndexerError::MalformedMessage { .. }));

        let err = IngestMessage::decode(
            br#"{"datetime":"t","filepath":"","action":"DEPOSIT","message":""}"#,
        )
        .expect_err("should fail");
        assert!(err.to_string().contains("filepath"));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = IngestMessage::decode(b"a:b:c:/p\xff:DEPOSIT:0:").expect_err("should fail");
        assert!(matches!(err, IndexerError::MalformedMessage { .. }));
    }

    #[test]
    fn wire_action_names_round_trip() {
        for action in ActionKind::ALL {
            assert_eq!(ActionKind::from_wire(action.as_wire()), Some(action));
        }
        assert_eq!(ActionKind::from_wire("mkdir"), Some(ActionKind::Mkdir));
        assert_eq!(ActionKind::from_wire("TRUNCATE"), None);
    }

    #[test]
    fn action_indices_are_dense_and_unique() {
        for (expected, action) in ActionKind::ALL.iter().enumerate() {
            assert_eq!(action.index(), expected);
        }
    }

    #[test]
    fn event_time_parses_legacy_stamp() {
        let corrective = IngestMessage::corrective("/p", ActionKind::Deposit);
        assert!(corrective.event_time().is_some());

        let mut stale = sample();
        stale.datetime = "not a timestamp".to_owned();
        assert!(stale.event_time().is_none());
    }

    #[test]
    fn legacy_stamp_has_exactly_two_colons() {
        let stamp = legacy_stamp(Utc::now());
        assert_eq!(stamp.matches(':').count(), 2, "stamp was {stamp:?}");
    }
}

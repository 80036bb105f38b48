//! Stable document identity: hash of the normalised archive path.
//!
//! Every component that touches the index derives document ids through this
//! module, so an event consumer and the reconciliation crawler always agree
//! on which document a path maps to.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use arcindex_core::paths;

/// Derive the index document id for an archive path.
///
/// The path is normalised (trailing slash stripped) before hashing, so
/// `/neodc/esacci` and `/neodc/esacci/` identify the same document.
#[must_use]
pub fn generate_id(path: &str) -> String {
    hash_hex(paths::normalize(path).as_bytes())
}

/// Derive a document id from raw path bytes.
///
/// Byte sequences that are not valid UTF-8 are dropped, not replaced, before
/// hashing. Two raw paths that differ only in invalid bytes therefore map to
/// the same document id; that collision is accepted, since such paths are
/// unrepresentable in the index anyway.
#[must_use]
pub fn generate_id_bytes(raw: &[u8]) -> String {
    generate_id(&drop_invalid_utf8(raw))
}

/// Decode raw bytes as UTF-8, skipping over invalid sequences entirely.
#[must_use]
pub fn drop_invalid_utf8(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                if let Ok(text) = std::str::from_utf8(valid) {
                    out.push_str(text);
                }
                // None means the input ended mid-sequence; discard the tail.
                let skip = match err.error_len() {
                    Some(len) => len,
                    None => after.len(),
                };
                rest = &after[skip..];
                if rest.is_empty() {
                    break;
                }
            }
        }
    }
    out
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_always_hashes_the_same() {
        let a = generate_id("/neodc/esacci/biomass");
        let b = generate_id("/neodc/esacci/biomass");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn trailing_slash_is_identity_preserving() {
        assert_eq!(
            generate_id("/neodc/esacci/"),
            generate_id("/neodc/esacci")
        );
    }

    #[test]
    fn distinct_paths_get_distinct_ids() {
        assert_ne!(generate_id("/neodc/a"), generate_id("/neodc/b"));
    }

    #[test]
    fn invalid_bytes_are_dropped_not_replaced() {
        assert_eq!(drop_invalid_utf8(b"/neodc/caf\xff\xfee"), "/neodc/cafe");
        assert_eq!(drop_invalid_utf8(b"/clean/path"), "/clean/path");
        assert_eq!(drop_invalid_utf8(b"\xff\xfe"), "");
    }

    #[test]
    fn truncated_multibyte_tail_is_discarded() {
        // 0xc3 starts a two-byte sequence that never completes.
        assert_eq!(drop_invalid_utf8(b"/neodc/x\xc3"), "/neodc/x");
    }

    // Dropping invalid bytes means raw paths differing only in those bytes
    // collide. Accepted behaviour, pinned here so a change is deliberate.
    #[test]
    fn byte_dropping_collision_is_stable() {
        assert_eq!(
            generate_id_bytes(b"/neodc/data\xff"),
            generate_id_bytes(b"/neodc/data")
        );
    }
}

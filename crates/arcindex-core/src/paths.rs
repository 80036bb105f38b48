//! Archive path conventions shared across the pipeline.
//!
//! Archive paths are absolute, `/`-separated strings. A trailing slash is
//! producer noise, not meaning: every component normalises it away before
//! comparing, hashing or storing a path.

/// Strip a trailing slash, keeping the root path intact.
#[must_use]
pub fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Depth of an absolute archive path: the number of segments, so
/// `/neodc/esacci/biomass` has depth 3 and the root has depth 0.
///
/// Both the directory metadata documents and the crawler's depth query use
/// this single definition.
#[must_use]
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Non-empty path segments, trailing slash ignored.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    normalize(path).split('/').filter(|segment| !segment.is_empty())
}

/// Parent directory of an absolute path, or `None` at the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    let path = normalize(path);
    let cut = path.rfind('/')?;
    if path.len() == 1 {
        return None;
    }
    if cut == 0 {
        Some("/")
    } else {
        Some(&path[..cut])
    }
}

/// Final path segment, or `None` at the root.
#[must_use]
pub fn file_name(path: &str) -> Option<&str> {
    let path = normalize(path);
    let cut = path.rfind('/')?;
    let name = &path[cut + 1..];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

//! Path-segment prefix tree.
//!
//! Keys are absolute archive paths; lookups walk one tree level per path
//! segment. The catalogue snapshot builds one of these wholesale and never
//! mutates it afterwards, so the structure favours read paths.

use std::collections::HashMap;

use arcindex_core::paths;

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    children: HashMap<String, Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

/// Prefix tree keyed by `/`-separated archive paths.
#[derive(Debug)]
pub struct PathTrie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathTrie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    /// Number of paths carrying a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value at `path`, returning the previous value if the path
    /// was already present. Trailing slashes are ignored.
    pub fn insert(&mut self, path: &str, value: T) -> Option<T> {
        let mut node = &mut self.root;
        for segment in paths::segments(path) {
            node = node.children.entry(segment.to_owned()).or_default();
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&T> {
        let mut node = &self.root;
        for segment in paths::segments(path) {
            node = node.children.get(segment)?;
        }
        node.value.as_ref()
    }

    /// Deepest ancestor of `path` (the path itself included) that carries a
    /// value. Returns the matching prefix and its value.
    #[must_use]
    pub fn longest_prefix(&self, path: &str) -> Option<(String, &T)> {
        let mut node = &self.root;
        let mut best: Option<(usize, &T)> = node.value.as_ref().map(|value| (0, value));
        let segments: Vec<&str> = paths::segments(path).collect();
        for (index, segment) in segments.iter().enumerate() {
            match node.children.get(*segment) {
                Some(child) => {
                    node = child;
                    if let Some(value) = node.value.as_ref() {
                        best = Some((index + 1, value));
                    }
                }
                None => break,
            }
        }
        best.map(|(depth, value)| {
            if depth == 0 {
                ("/".to_owned(), value)
            } else {
                (format!("/{}", segments[..depth].join("/")), value)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathTrie<u32> {
        let mut trie = PathTrie::new();
        trie.insert("/neodc", 1);
        trie.insert("/neodc/esacci", 2);
        trie.insert("/badc/cmip5", 3);
        trie
    }

    #[test]
    fn exact_lookup() {
        let trie = sample();
        assert_eq!(trie.get("/neodc/esacci"), Some(&2));
        assert_eq!(trie.get("/neodc/esacci/"), Some(&2));
        assert_eq!(trie.get("/neodc/esacci/biomass"), None);
        assert_eq!(trie.get("/missing"), None);
    }

    #[test]
    fn longest_prefix_picks_deepest_ancestor() {
        let trie = sample();
        let (prefix, value) = trie
            .longest_prefix("/neodc/esacci/biomass/v4/data.nc")
            .expect("ancestor should match");
        assert_eq!(prefix, "/neodc/esacci");
        assert_eq!(*value, 2);
    }

    #[test]
    fn longest_prefix_matches_path_itself() {
        let trie = sample();
        let (prefix, value) = trie.longest_prefix("/badc/cmip5").expect("should match");
        assert_eq!(prefix, "/badc/cmip5");
        assert_eq!(*value, 3);
    }

    #[test]
    fn longest_prefix_stops_at_divergence() {
        let trie = sample();
        let (prefix, _) = trie
            .longest_prefix("/neodc/other/deep/path")
            .expect("first segment should match");
        assert_eq!(prefix, "/neodc");
        assert!(trie.longest_prefix("/unrelated/path").is_none());
    }

    #[test]
    fn segment_boundaries_are_respected() {
        let mut trie = PathTrie::new();
        trie.insert("/neodc/esa", 1);
        // "/neodc/esacci" shares a string prefix but not a segment prefix.
        assert!(trie.longest_prefix("/neodc/esacci").is_none());
    }

    #[test]
    fn insert_replaces_and_counts() {
        let mut trie = sample();
        assert_eq!(trie.len(), 3);
        assert_eq!(trie.insert("/neodc", 9), Some(1));
        assert_eq!(trie.len(), 3);
        assert_eq!(trie.get("/neodc"), Some(&9));
    }

    #[test]
    fn root_value_is_a_universal_fallback() {
        let mut trie = PathTrie::new();
        trie.insert("/", 0);
        let (prefix, value) = trie.longest_prefix("/anything/at/all").expect("root matches");
        assert_eq!(prefix, "/");
        assert_eq!(*value, 0);
    }

    #[test]
    fn empty_trie_matches_nothing() {
        let trie: PathTrie<()> = PathTrie::new();
        assert!(trie.is_empty());
        assert!(trie.longest_prefix("/neodc").is_none());
    }
}

//! Inclusion/exclusion filtering of archive paths.
//!
//! A filter is a default policy plus a list of path prefixes that invert it.
//! Prefixes match on segment boundaries: `/neodc/esacci` covers
//! `/neodc/esacci/biomass` but not `/neodc/esacci_v2`.

use serde::{Deserialize, Serialize};

use crate::tree::PathTrie;

/// What a path filter does with paths that match no listed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPolicy {
    /// Everything passes except paths under a listed prefix.
    AllowUnlessListed,
    /// Nothing passes except paths under a listed prefix.
    DenyUnlessListed,
}

/// Prefix-based path filter.
#[derive(Debug)]
pub struct PathFilter {
    policy: FilterPolicy,
    listed: PathTrie<()>,
}

impl PathFilter {
    /// Build a filter from a policy and its inverting prefixes.
    #[must_use]
    pub fn new<I, S>(policy: FilterPolicy, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut listed = PathTrie::new();
        for prefix in prefixes {
            listed.insert(prefix.as_ref(), ());
        }
        Self { policy, listed }
    }

    /// Filter that passes every path.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new(FilterPolicy::AllowUnlessListed, std::iter::empty::<&str>())
    }

    /// Whether `path` passes the filter.
    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        let listed = self.listed.longest_prefix(path).is_some();
        match self.policy {
            FilterPolicy::AllowUnlessListed => !listed,
            FilterPolicy::DenyUnlessListed => listed,
        }
    }
}

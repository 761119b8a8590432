//! URI and host route tables

use crate::url::matches_wildcard;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Where a route applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKey {
    /// One exact URI, compared as a string
    Uri(String),
    /// A host pattern, exact or `*.`-prefixed
    Host(String),
}

/// Values keyed by exact URI or host pattern
///
/// Lookup tries the exact URI first, then host patterns in insertion
/// order. The first matching host pattern wins.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    exact: HashMap<String, T>,
    hosts: Vec<(String, T)>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            hosts: Vec::new(),
        }
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route; a later exact URI replaces an earlier one
    pub fn insert(&mut self, key: RouteKey, value: T) {
        match key {
            RouteKey::Uri(uri) => {
                self.exact.insert(uri, value);
            }
            RouteKey::Host(pattern) => self.hosts.push((pattern, value)),
        }
    }

    /// Finds the value routed to `uri`, if any
    pub fn resolve(&self, uri: &Url) -> Option<&T> {
        if let Some(value) = self.exact.get(uri.as_str()) {
            return Some(value);
        }

        let host = uri.host_str()?;
        self.hosts
            .iter()
            .find(|(pattern, _)| matches_wildcard(pattern, host))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Endpoint identity and the address set maintained by a resolver.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One network-reachable instance of the watched service.
///
/// Holds the address (IP or host) as reported by the orchestrator;
/// identity is the address itself, so the set below deduplicates by it.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
pub struct Endpoint(pub Arc<str>);

impl Endpoint {
    pub fn new(host: impl ToString) -> Self {
        Self(host.to_string().into())
    }

    pub fn host(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&'_ str> for Endpoint {
    fn from(s: &'_ str) -> Self {
        Self(s.into())
    }
}

impl std::borrow::Borrow<str> for Endpoint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved address handed to the consuming channel.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HostPort {
    pub host: Endpoint,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bracket IPv6 literals so the output stays parseable.
        if self.host.host().contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The working set of endpoints for one watched resource.
///
/// Mutated only through the `apply_*` operations; every one of them
/// reports whether membership actually changed, and an unchanged result
/// is what lets the caller suppress spurious downstream notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: BTreeSet<Endpoint>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an endpoint; adding one already present is a no-op.
    pub fn apply_add(&mut self, endpoint: Endpoint) -> bool {
        self.endpoints.insert(endpoint)
    }

    /// Removes an endpoint; removing one never present is a no-op.
    pub fn apply_remove(&mut self, endpoint: &Endpoint) -> bool {
        self.endpoints.remove(endpoint)
    }

    /// Replaces the whole set with a freshly-fetched baseline.
    ///
    /// Membership is compared before replacing (size first, then a
    /// full scan) so an identical resync or reconnect baseline is
    /// absorbed silently.
    pub fn apply_replace(&mut self, full_set: BTreeSet<Endpoint>) -> bool {
        let changed = self.endpoints != full_set;
        if changed {
            self.endpoints = full_set;
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// The current membership as an ordered address list, each entry
    /// paired with the target's port.
    pub fn to_host_ports(&self, port: u16) -> Vec<HostPort> {
        self.endpoints
            .iter()
            .map(|endpoint| HostPort {
                host: endpoint.clone(),
                port,
            })
            .collect()
    }
}

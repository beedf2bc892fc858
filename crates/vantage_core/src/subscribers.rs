//! # Subscriber Registry
//!
//! Views that receive virtual world updates. Endpoints are kept in
//! registration order and are never evicted.

use std::collections::HashSet;
use std::fmt;

/// Where a view listens for updates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberEndpoint {
    /// Host name or IP address as announced by the view.
    pub host: String,
    /// UDP port.
    pub port: u16,
}

impl SubscriberEndpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for SubscriberEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Deduplicated, ordered set of subscribers.
#[derive(Clone, Debug, Default)]
pub struct SubscriberRegistry {
    ordered: Vec<SubscriberEndpoint>,
    seen: HashSet<SubscriberEndpoint>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `endpoint` unless already present.
    ///
    /// Returns true if the endpoint was new.
    pub fn register(&mut self, endpoint: SubscriberEndpoint) -> bool {
        if !self.seen.insert(endpoint.clone()) {
            return false;
        }
        self.ordered.push(endpoint);
        true
    }

    /// All subscribers in registration order.
    #[must_use]
    pub fn all(&self) -> &[SubscriberEndpoint] {
        &self.ordered
    }

    /// Returns true if `endpoint` is registered.
    #[must_use]
    pub fn contains(&self, endpoint: &SubscriberEndpoint) -> bool {
        self.seen.contains(endpoint)
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

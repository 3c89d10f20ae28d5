//! Identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a DOM container a remote is mounted into.
///
/// The registry keys its records by this value; two containers never
/// share an id even when they render the same remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(Uuid);

impl ContainerId {
    /// Generate a fresh random container id
    pub fn random() -> Self {
        ContainerId(Uuid::new_v4())
    }

    /// Get the underlying uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let s = self.0.simple().to_string();
        write!(f, "ct-{}", &s[..8])
    }
}

/// Handle of a listener registered on a snapshot container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Key of a streaming resource (at most one live connection per key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        ResourceKey(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        ResourceKey::new(s)
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        ResourceKey(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_ids_are_unique() {
        let a = ContainerId::random();
        let b = ContainerId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn container_id_display_is_short() {
        let id = ContainerId::random();
        let s = id.to_string();
        assert!(s.starts_with("ct-"));
        assert_eq!(s.len(), 11);
    }

    #[test]
    fn resource_key_conversions() {
        let a: ResourceKey = "queue/timedeal/7".into();
        let b = ResourceKey::new(String::from("queue/timedeal/7"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "queue/timedeal/7");
    }
}

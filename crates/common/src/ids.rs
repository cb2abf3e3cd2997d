//! Type-safe identifier newtypes for stored resources.
//!
//! These types keep resource keys, store-assigned UIDs and per-invocation
//! sync IDs apart at compile time (e.g., passing a `ResourceUid` where a
//! `ResourceKey` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Namespace-qualified resource name.
///
/// Cluster-scoped resources use an empty namespace. The string form is
/// `namespace/name`, or just `name` for cluster-scoped resources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    namespace: String,
    name: String,
}

impl ResourceKey {
    /// Create a key for a namespaced resource
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a key for a cluster-scoped resource
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this key has no namespace
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Error returned when a string is not a valid resource key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource key {0:?}: expected \"name\" or \"namespace/name\"")]
pub struct ParseResourceKeyError(String);

impl FromStr for ResourceKey {
    type Err = ParseResourceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok(Self::cluster(name)),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Ok(Self::new(ns, name))
            }
            _ => Err(ParseResourceKeyError(s.to_string())),
        }
    }
}

/// Store-assigned unique identifier of a resource instance.
///
/// Unlike [`ResourceKey`], a UID changes when a resource is deleted and
/// recreated under the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUid(String);

impl ResourceUid {
    /// Create a new random UID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the UID has not been assigned by a store yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceUid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique ID for one reconciliation invocation.
///
/// Attached to the tracing span of every sync so that log lines from a
/// single pass can be correlated across collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncId(String);

impl SyncId {
    /// Create a new random sync ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

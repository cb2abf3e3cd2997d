//! Resource store contract and in-memory implementation
//!
//! The store is a key-addressed object store with optimistic concurrency:
//! every write bumps `resource_version`, and an update carrying a stale
//! version is rejected with [`StoreError::Conflict`] so the caller can
//! re-queue and recompute against fresh state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};

use sentinel_common::{ResourceKey, ResourceUid};

use crate::resources::Resource;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The object was modified since it was read
    #[error("conflict updating {kind} {key}: expected version {expected}, found {actual}")]
    Conflict {
        kind: &'static str,
        key: ResourceKey,
        expected: u64,
        actual: u64,
    },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ResourceKey },

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ResourceKey },

    /// Backend failure (connection, serialization, ...)
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether re-queueing the work item can resolve the error
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Equality-based label selector
///
/// An empty selector matches every object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality requirement
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Generic resource store collaborator
#[async_trait]
pub trait ObjectStore<T: Resource>: Send + Sync {
    /// Fetch a single object
    async fn get(&self, key: &ResourceKey) -> Result<Option<T>, StoreError>;

    /// List objects in a namespace matching the selector, ordered by name
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<T>, StoreError>;

    /// Create an object; assigns a UID and the first resource version
    async fn create(&self, object: T) -> Result<T, StoreError>;

    /// Replace an object if its resource version is current
    async fn update(&self, object: T) -> Result<T, StoreError>;
}

/// In-memory object store
///
/// Suitable for tests and for embedding the engine without an external
/// API server. Objects are kept behind a `DashMap` keyed by
/// namespace/name, so concurrent workers never block each other on
/// distinct keys.
pub struct MemoryStore<T> {
    objects: DashMap<ResourceKey, T>,
}

impl<T: Resource> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    /// Insert or replace an object without version checks
    ///
    /// Plays the role of a writer outside the engine (the user-facing layer
    /// or another reconciler). Still bumps the resource version so that
    /// engine updates based on an older read conflict.
    pub fn put(&self, mut object: T) -> T {
        let key = object.key();
        let current = self
            .objects
            .get(&key)
            .map(|o| (o.meta().resource_version, o.meta().uid.clone()));
        let meta = object.meta_mut();
        match current {
            Some((version, uid)) => {
                meta.resource_version = version + 1;
                if meta.uid.is_empty() {
                    meta.uid = uid;
                }
            }
            None => {
                meta.resource_version = 1;
                if meta.uid.is_empty() {
                    meta.uid = ResourceUid::generate();
                }
            }
        }
        self.objects.insert(key, object.clone());
        object
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T: Resource> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Resource> ObjectStore<T> for MemoryStore<T> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<T>, StoreError> {
        Ok(self.objects.get(key).map(|o| o.value().clone()))
    }

    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<T>, StoreError> {
        let mut matched: Vec<T> = self
            .objects
            .iter()
            .filter(|o| o.meta().namespace == namespace && selector.matches(&o.meta().labels))
            .map(|o| o.value().clone())
            .collect();
        matched.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));

        trace!(kind = T::KIND, namespace = %namespace, count = matched.len(), "Listed objects");
        Ok(matched)
    }

    async fn create(&self, mut object: T) -> Result<T, StoreError> {
        let key = object.key();
        match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists { kind: T::KIND, key }),
            Entry::Vacant(slot) => {
                let meta = object.meta_mut();
                meta.uid = ResourceUid::generate();
                meta.resource_version = 1;
                slot.insert(object.clone());
                debug!(kind = T::KIND, key = %key, "Created object");
                Ok(object)
            }
        }
    }

    async fn update(&self, mut object: T) -> Result<T, StoreError> {
        let key = object.key();
        let mut stored = self
            .objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound { kind: T::KIND, key: key.clone() })?;

        let actual = stored.meta().resource_version;
        let expected = object.meta().resource_version;
        if expected != actual {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                key,
                expected,
                actual,
            });
        }

        object.meta_mut().resource_version = actual + 1;
        *stored = object.clone();
        debug!(kind = T::KIND, key = %key, version = actual + 1, "Updated object");
        Ok(object)
    }
}

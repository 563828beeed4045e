//! In-memory resource store
//!
//! Stores the current view of each resource, its view as first stored and
//! snapshots recorded as versions, using `Arc<RwLock>` for interior mutability
//! so clones share state. Implements `TripleReader` and `VersionLister`; it is
//! not transactional and answers every transaction from the same state.

use crate::error::{Error, Result};
use crate::id::ResourceId;
use crate::resource::{ResourceView, TripleReader, VersionLister};
use crate::txn::Transaction;
use crate::Instant;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct StoredResource {
    /// View as first stored
    initial: ResourceView,
    current: ResourceView,
    versions: BTreeMap<Instant, ResourceView>,
}

/// In-memory resource store for tests and embedders
#[derive(Clone, Default)]
pub struct MemoryResourceStore {
    /// Resources keyed by base IRI
    resources: Arc<RwLock<HashMap<String, StoredResource>>>,
}

impl Debug for MemoryResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources = self.resources.read();
        f.debug_struct("MemoryResourceStore")
            .field("resource_count", &resources.len())
            .field(
                "version_count",
                &resources.values().map(|r| r.versions.len()).sum::<usize>(),
            )
            .finish()
    }
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the current view of a resource
    pub fn put(&self, view: ResourceView) {
        let key = view.headers.id.base_iri().to_string();
        let mut resources = self.resources.write();
        match resources.get_mut(&key) {
            Some(stored) => stored.current = view,
            None => {
                resources.insert(
                    key,
                    StoredResource {
                        initial: view.clone(),
                        current: view,
                        versions: BTreeMap::new(),
                    },
                );
            }
        }
    }

    /// Current view, tombstones included
    pub fn get(&self, id: &ResourceId) -> Option<ResourceView> {
        self.resources
            .read()
            .get(id.base_iri())
            .map(|r| r.current.clone())
    }

    /// Apply `f` to the current view and bump its last-modified instant to `at`
    pub fn update(
        &self,
        id: &ResourceId,
        at: Instant,
        f: impl FnOnce(&mut ResourceView),
    ) -> Result<()> {
        let mut resources = self.resources.write();
        let stored = resources
            .get_mut(id.base_iri())
            .ok_or_else(|| Error::not_found(id.full_id()))?;
        f(&mut stored.current);
        stored.current.headers.last_modified = at;
        Ok(())
    }

    /// Mark a resource deleted at `at`, keeping its history
    pub fn tombstone(&self, id: &ResourceId, at: Instant) -> Result<()> {
        self.update(id, at, |view| view.headers.deleted = true)
    }

    /// Remove a resource and every version of it
    pub fn purge(&self, id: &ResourceId) -> bool {
        self.resources.write().remove(id.base_iri()).is_some()
    }

    /// Snapshot the current view as a version recorded at `at`
    pub fn create_version(&self, id: &ResourceId, at: Instant) -> Result<()> {
        let mut resources = self.resources.write();
        let stored = resources
            .get_mut(id.base_iri())
            .ok_or_else(|| Error::not_found(id.full_id()))?;
        let snapshot = stored.current.clone();
        stored.versions.insert(at, snapshot);
        Ok(())
    }
}

impl TripleReader for MemoryResourceStore {
    fn read(
        &self,
        _tx: &Transaction,
        id: &ResourceId,
        at: Option<Instant>,
    ) -> Result<Option<ResourceView>> {
        let resources = self.resources.read();
        let Some(stored) = resources.get(id.base_iri()) else {
            return Ok(None);
        };
        let Some(at) = at.or_else(|| id.memento_instant()) else {
            return Ok(Some(stored.current.clone()));
        };

        // Unchanged since `at`: the current state. Otherwise the latest version
        // at or before `at`, else the state the resource was created with.
        if stored.current.headers.last_modified <= at {
            return Ok(Some(stored.current.clone()));
        }
        if let Some((_, view)) = stored.versions.range(..=at).next_back() {
            return Ok(Some(view.clone()));
        }
        if stored.initial.headers.created <= at {
            return Ok(Some(stored.initial.clone()));
        }
        Ok(None)
    }
}

impl VersionLister for MemoryResourceStore {
    fn list_versions(&self, _tx: &Transaction, id: &ResourceId) -> Result<Vec<Instant>> {
        Ok(self
            .resources
            .read()
            .get(id.base_iri())
            .map(|r| r.versions.keys().copied().collect())
            .unwrap_or_default())
    }
}

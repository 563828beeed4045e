//! Shared harness for ldpx-membership integration tests.
//!
//! Plays the part of the repository layer: it writes resources to a
//! `MemoryResourceStore`, records containment, creates versions when
//! auto versioning is on, and notifies the `MembershipService` the way a
//! request pipeline would.

// Not every test crate uses every helper.
#![allow(dead_code)]

pub mod span_capture;

use chrono::{TimeZone, Utc};
use ldpx_core::{
    Instant, ManualClock, MemoryResourceStore, ResourceId, ResourceKind, ResourceView, Term,
    Transaction, Triple,
};
use ldpx_index::{ContainmentIndex, MembershipIndexManager};
use ldpx_membership::{MembershipConfig, MembershipService};
use ldpx_vocab::ldp;
use std::sync::Arc;

/// `secs` seconds after a fixed test epoch (whole seconds, so mementos line up)
pub fn t(secs: i64) -> Instant {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn id(path: &str) -> ResourceId {
    ResourceId::parse(path).unwrap()
}

pub fn iri(path: &str) -> String {
    id(path).full_id()
}

/// `(subject, predicate, object)` triple of repository ids / IRIs
pub fn triple(subject: &str, predicate: &str, object: &str) -> Triple {
    Triple::iri(subject, predicate, object)
}

pub struct Harness {
    pub store: MemoryResourceStore,
    pub containment: ContainmentIndex,
    pub index: MembershipIndexManager,
    pub service: MembershipService,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MembershipConfig::default())
    }

    pub fn manual_versioning() -> Self {
        Self::with_config(MembershipConfig {
            auto_versioning: false,
        })
    }

    pub fn with_config(config: MembershipConfig) -> Self {
        let store = MemoryResourceStore::new();
        let clock = ManualClock::new(t(0));
        let containment = ContainmentIndex::new(Arc::new(clock.clone()));
        let index = MembershipIndexManager::new();
        let service = MembershipService::new(
            containment.clone(),
            index.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            config,
        );
        Self {
            store,
            containment,
            index,
            service,
            clock,
        }
    }

    fn auto_versioning(&self) -> bool {
        self.service.config().auto_versioning
    }

    /// Store `view`, contain it under its path parent and notify the service
    pub fn create(&self, tx: &Transaction, view: ResourceView) -> ResourceId {
        let id = view.id().clone();
        let at = view.headers.created;
        self.clock.set(at);
        self.store.put(view);
        if self.auto_versioning() {
            self.store.create_version(&id, at).unwrap();
        }
        let parent = id.path_parent().unwrap_or_else(ResourceId::root);
        self.containment
            .add_contained_by_at(tx, &parent, &id, at, None)
            .unwrap();
        self.service.resource_created(tx, &id).unwrap();
        id
    }

    pub fn basic_container(&self, tx: &Transaction, path: &str, at: Instant) -> ResourceId {
        self.create(
            tx,
            ResourceView::new(id(path), ResourceKind::Container, at).with_type(ldp::BASIC_CONTAINER),
        )
    }

    pub fn direct_container(
        &self,
        tx: &Transaction,
        path: &str,
        at: Instant,
        props: &[(&str, Term)],
    ) -> ResourceId {
        self.container_of_type(tx, path, ldp::DIRECT_CONTAINER, at, props)
    }

    pub fn indirect_container(
        &self,
        tx: &Transaction,
        path: &str,
        at: Instant,
        props: &[(&str, Term)],
    ) -> ResourceId {
        self.container_of_type(tx, path, ldp::INDIRECT_CONTAINER, at, props)
    }

    fn container_of_type(
        &self,
        tx: &Transaction,
        path: &str,
        kind: &str,
        at: Instant,
        props: &[(&str, Term)],
    ) -> ResourceId {
        let mut view =
            ResourceView::new(id(path), ResourceKind::Container, at).with_type(kind);
        for (predicate, object) in props {
            view = view.with_triple(*predicate, object.clone());
        }
        self.create(tx, view)
    }

    /// Plain (basic) container member with optional properties
    pub fn member(
        &self,
        tx: &Transaction,
        path: &str,
        at: Instant,
        props: &[(&str, Term)],
    ) -> ResourceId {
        let mut view = ResourceView::new(id(path), ResourceKind::Container, at)
            .with_type(ldp::BASIC_CONTAINER);
        for (predicate, object) in props {
            view = view.with_triple(*predicate, object.clone());
        }
        self.create(tx, view)
    }

    pub fn binary(&self, tx: &Transaction, path: &str, at: Instant) -> ResourceId {
        self.create(
            tx,
            ResourceView::new(id(path), ResourceKind::Binary, at).with_type(ldp::NON_RDF_SOURCE),
        )
    }

    /// Replace every value of `predicate` on `target` at `at` and notify the service
    pub fn set_property(
        &self,
        tx: &Transaction,
        target: &ResourceId,
        predicate: &str,
        value: Option<Term>,
        at: Instant,
    ) {
        self.clock.set(at);
        let subject = target.as_base().full_id();
        self.store
            .update(target, at, |view| {
                view.triples.retain(|t| t.predicate != predicate);
                if let Some(value) = value {
                    view.triples.push(Triple::new(subject, predicate, value));
                }
            })
            .unwrap();
        if self.auto_versioning() {
            self.store.create_version(target, at).unwrap();
        }
        self.service.resource_modified(tx, target).unwrap();
    }

    /// Tombstone `target` at `at`
    pub fn delete(&self, tx: &Transaction, target: &ResourceId, at: Instant) {
        self.clock.set(at);
        self.store.tombstone(target, at).unwrap();
        if self.auto_versioning() {
            self.store.create_version(target, at).unwrap();
        }
        self.service.resource_deleted(tx, target).unwrap();
        self.containment.remove_resource(tx, target).unwrap();
    }

    /// Remove `target` and its history entirely
    pub fn purge(&self, tx: &Transaction, target: &ResourceId) {
        self.store.purge(target);
        self.containment.purge_resource(tx, target).unwrap();
        self.service.resource_deleted(tx, target).unwrap();
    }

    pub fn membership(&self, tx: &Transaction, subject: &ResourceId) -> Vec<Triple> {
        self.service.get_membership(tx, subject)
    }

    pub fn membership_at(&self, subject: &ResourceId, at: Instant) -> Vec<Triple> {
        self.service
            .get_membership(&Transaction::read_only(), &subject.as_memento(at))
    }
}

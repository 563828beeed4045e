//! Resource views and the persistence collaborators the indexes read through
//!
//! The indexes never load content themselves. They ask a `TripleReader` for a
//! resource's headers and triples (optionally as of an instant) and a
//! `VersionLister` for the instants at which versions were recorded.

use crate::error::Result;
use crate::id::ResourceId;
use crate::triple::{Term, Triple};
use crate::txn::Transaction;
use crate::Instant;
use ldpx_vocab::rdf;

/// Interaction model of a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Container,
    Binary,
    /// Companions and anything else that never takes part in membership
    Other,
}

/// Server-managed headers of a resource
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceHeaders {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Interaction model and other declared types (full IRIs)
    pub types: Vec<String>,
    pub created: Instant,
    pub last_modified: Instant,
    /// Tombstoned (soft deleted)
    pub deleted: bool,
}

/// Headers plus the descriptive triples of a resource
///
/// For a binary the triples are those of its description.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceView {
    pub headers: ResourceHeaders,
    pub triples: Vec<Triple>,
}

impl ResourceView {
    /// View of a live resource created and last modified at `created`
    pub fn new(id: ResourceId, kind: ResourceKind, created: Instant) -> Self {
        Self {
            headers: ResourceHeaders {
                id: id.as_base(),
                kind,
                types: Vec::new(),
                created,
                last_modified: created,
                deleted: false,
            },
            triples: Vec::new(),
        }
    }

    pub fn with_type(mut self, iri: impl Into<String>) -> Self {
        self.headers.types.push(iri.into());
        self
    }

    /// Add a triple with this resource as subject
    pub fn with_triple(mut self, predicate: impl Into<String>, object: Term) -> Self {
        let subject = self.headers.id.full_id();
        self.triples.push(Triple::new(subject, predicate, object));
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.headers.id
    }

    pub fn is_container(&self) -> bool {
        self.headers.kind == ResourceKind::Container
    }

    pub fn is_binary(&self) -> bool {
        self.headers.kind == ResourceKind::Binary
    }

    pub fn is_deleted(&self) -> bool {
        self.headers.deleted
    }

    /// Declared in the headers or through an `rdf:type` triple
    pub fn has_type(&self, iri: &str) -> bool {
        self.headers.types.iter().any(|t| t == iri)
            || self
                .values(rdf::TYPE)
                .any(|o| o.as_iri().is_some_and(|v| v == iri))
    }

    /// Objects of every triple with `predicate`
    pub fn values<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.predicate == predicate)
            .map(|t| &t.object)
    }
}

/// Reads resource headers and triples
pub trait TripleReader: Send + Sync {
    /// Read `id` as visible to `tx`, at `at` when given
    ///
    /// A memento id without `at` reads at the memento instant. Returns
    /// `Ok(None)` when the resource does not exist (never created or purged);
    /// a tombstoned resource is returned with `deleted` set.
    fn read(
        &self,
        tx: &Transaction,
        id: &ResourceId,
        at: Option<Instant>,
    ) -> Result<Option<ResourceView>>;
}

/// Lists recorded versions of a resource
pub trait VersionLister: Send + Sync {
    /// Version instants, oldest first; empty when none were recorded
    fn list_versions(&self, tx: &Transaction, id: &ResourceId) -> Result<Vec<Instant>>;
}

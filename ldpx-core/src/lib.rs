//! # ldpx core
//!
//! Shared building blocks for the containment and membership indexes.
//!
//! This crate provides:
//! - `ResourceId`: tagged repository identifiers (base, description, acl, memento)
//! - `Triple` / `Term`: the RDF statements resources carry
//! - `Transaction` and the `TransactionParticipant` seam stores register through
//! - Collaborator traits (`TripleReader`, `VersionLister`) at the persistence boundary
//! - `Clock` for injecting "now" into the indexes
//! - `MemoryResourceStore`, an in-memory implementation of the collaborators
//!
//! ## Example
//!
//! ```ignore
//! use ldpx_core::{ResourceId, Transaction};
//!
//! let id = ResourceId::parse("info:ldpx/dc1/m1/~versions/20240101120000")?;
//! assert_eq!(id.as_base().full_id(), "info:ldpx/dc1/m1");
//!
//! let tx = Transaction::new();
//! // ... hand `&tx` to the indexes, then:
//! tx.commit()?;
//! ```

pub mod clock;
pub mod error;
pub mod id;
pub mod memory;
pub mod resource;
pub mod triple;
pub mod txn;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use id::ResourceId;
pub use memory::MemoryResourceStore;
pub use resource::{ResourceHeaders, ResourceKind, ResourceView, TripleReader, VersionLister};
pub use triple::{Term, Triple};
pub use txn::{Transaction, TransactionParticipant, TransactionState, TxId};

/// Point in time used for every validity interval and memento lookup
pub type Instant = chrono::DateTime<chrono::Utc>;

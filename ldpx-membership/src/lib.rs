//! # ldpx membership
//!
//! LDP membership for direct and indirect containers, derived from container
//! configuration and kept in a time-ranged index.
//!
//! This crate provides:
//! - [`container_config`]: reads a container's membership configuration
//! - [`MembershipService`]: reacts to created / modified / deleted resources
//!   and answers live and memento membership queries
//! - [`ContainmentTriplesService`]: `ldp:contains` triples from the
//!   containment index
//! - [`MembershipConfig`] and [`telemetry`]: TOML + environment settings and
//!   logging setup
//!
//! ## Example
//!
//! ```ignore
//! let store = MemoryResourceStore::new();
//! let containment = ContainmentIndex::new(Arc::new(SystemClock));
//! let service = MembershipService::new(
//!     containment.clone(),
//!     MembershipIndexManager::new(),
//!     Arc::new(store.clone()),
//!     Arc::new(store.clone()),
//!     MembershipConfig::load(None)?,
//! );
//!
//! containment.add_contained_by(&tx, &dc, &member)?;
//! service.resource_created(&tx, &member)?;
//! tx.commit()?;
//! let triples = service.get_membership(&Transaction::read_only(), &dc);
//! ```

pub mod config;
pub mod container_config;
pub mod containment_triples;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{load_config_file, LdpxFileConfig, MembershipConfig};
pub use container_config::{ContainerConfig, ContainerType, MembershipDirection};
pub use containment_triples::ContainmentTriplesService;
pub use error::{MembershipError, Result};
pub use service::MembershipService;
pub use telemetry::{init_logging, LogFormat, TelemetryConfig};

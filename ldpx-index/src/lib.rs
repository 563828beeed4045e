//! Transactional indexes for ldpx
//!
//! Two stores share the same shape: a committed table behind a single
//! `parking_lot::RwLock`, plus one overlay per open transaction.
//!
//! - [`ContainmentIndex`]: parent/child containment with validity intervals
//! - [`MembershipIndexManager`]: time-ranged membership triples indexed by
//!   subject, object, source container and member
//!
//! # Design
//!
//! - **Two-level lookup**: reads merge the caller's overlay over committed rows;
//!   other transactions' overlays are never visible
//! - **Atomic commit**: the whole overlay is applied under one write lock, so
//!   readers observe either none or all of a transaction
//! - **Time ranges**: rows carry `[start, end)`; live reads want `end == None`,
//!   memento reads at `t` want `start <= t < end`
//! - **Self-registration**: the first write in a long-running transaction
//!   registers the store as a `TransactionParticipant`
//!
//! # Example
//!
//! ```ignore
//! use ldpx_index::ContainmentIndex;
//!
//! let index = ContainmentIndex::new(Arc::new(SystemClock));
//! index.add_contained_by(&tx, &parent, &child)?;
//! assert_eq!(index.get_contains(&tx, &parent), vec![child.clone()]);
//! tx.commit()?;
//! ```

mod containment;
mod membership;

pub use containment::{ContainmentEntry, ContainmentIndex};
pub use membership::{MembershipEntry, MembershipIndexManager, MembershipKey};

use ldpx_core::{Error, Instant, Result, Transaction};

/// True when a `[start, end)` row is in effect for the requested view
///
/// `None` asks for the live view: only open rows qualify.
pub(crate) fn in_effect(start: Instant, end: Option<Instant>, at: Option<Instant>) -> bool {
    match at {
        None => end.is_none(),
        Some(t) => start <= t && end.map_or(true, |e| t < e),
    }
}

pub(crate) fn ensure_writable(tx: &Transaction) -> Result<()> {
    if tx.is_read_only() {
        Err(Error::read_only(tx.id().as_str()))
    } else if tx.is_open() {
        Ok(())
    } else {
        Err(Error::transaction_closed(tx.id().as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn in_effect_is_half_open() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(10);
        assert!(in_effect(t0, Some(t1), Some(t0)));
        assert!(!in_effect(t0, Some(t1), Some(t1)));
        assert!(!in_effect(t0, Some(t1), None));
        assert!(in_effect(t0, None, None));
        assert!(!in_effect(t1, None, Some(t0)));
    }
}

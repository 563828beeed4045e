//! Parent/child containment index
//!
//! Each containment entry records that `parent` contained `child` during
//! `[start, end)`. At most one entry per pair is open at a time. Removing a
//! child closes its entry rather than deleting it so memento reads keep
//! seeing historical children; only a purge deletes entries.
//!
//! Writes inside a long-running transaction land in that transaction's
//! overlay:
//! - `adds`: new entries, discarded again if removed in the same transaction
//! - `ends`: close instants for committed open entries
//! - `purges`: children whose committed entries are dropped at commit
//!
//! Commit applies purges, then ends, then adds.

use crate::{ensure_writable, in_effect};
use ldpx_core::{Clock, Instant, ResourceId, Result, Transaction, TransactionParticipant, TxId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Containment of `child` by `parent` during `[start, end)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainmentEntry {
    pub parent: ResourceId,
    pub child: ResourceId,
    pub start: Instant,
    pub end: Option<Instant>,
}

impl ContainmentEntry {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

#[derive(Debug, Default)]
struct ContainmentTable {
    by_child: HashMap<ResourceId, Vec<ContainmentEntry>>,
    by_parent: HashMap<ResourceId, BTreeSet<ResourceId>>,
}

impl ContainmentTable {
    fn insert(&mut self, entry: ContainmentEntry) {
        self.by_parent
            .entry(entry.parent.clone())
            .or_default()
            .insert(entry.child.clone());
        self.by_child
            .entry(entry.child.clone())
            .or_default()
            .push(entry);
    }

    fn entries(&self, child: &ResourceId) -> &[ContainmentEntry] {
        self.by_child.get(child).map(Vec::as_slice).unwrap_or(&[])
    }

    fn children_of(&self, parent: &ResourceId) -> impl Iterator<Item = &ResourceId> {
        self.by_parent.get(parent).into_iter().flatten()
    }

    fn has_open(&self, parent: &ResourceId, child: &ResourceId) -> bool {
        self.entries(child)
            .iter()
            .any(|e| e.parent == *parent && e.is_open())
    }

    fn close(&mut self, parent: &ResourceId, child: &ResourceId, at: Instant) {
        if let Some(entries) = self.by_child.get_mut(child) {
            for e in entries
                .iter_mut()
                .filter(|e| e.parent == *parent && e.is_open())
            {
                e.end = Some(at);
            }
        }
    }

    fn remove_child(&mut self, child: &ResourceId) {
        let Some(entries) = self.by_child.remove(child) else {
            return;
        };
        for e in entries {
            if let Some(children) = self.by_parent.get_mut(&e.parent) {
                children.remove(child);
                if children.is_empty() {
                    self.by_parent.remove(&e.parent);
                }
            }
        }
    }

    fn entry_count(&self) -> usize {
        self.by_child.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
struct ContainmentOverlay {
    adds: Vec<ContainmentEntry>,
    /// Close instants keyed by (parent, child)
    ends: HashMap<(ResourceId, ResourceId), Instant>,
    purges: HashSet<ResourceId>,
}

#[derive(Debug, Default)]
struct ContainmentState {
    committed: ContainmentTable,
    overlays: HashMap<TxId, ContainmentOverlay>,
}

impl ContainmentState {
    fn overlay(&self, tx: &Transaction) -> Option<&ContainmentOverlay> {
        if tx.is_short_lived() {
            None
        } else {
            self.overlays.get(tx.id())
        }
    }

    /// Entries for `child` as `tx` sees them
    fn visible_entries(&self, tx: &Transaction, child: &ResourceId) -> Vec<ContainmentEntry> {
        let overlay = self.overlay(tx);
        let mut out = Vec::new();

        if !overlay.is_some_and(|o| o.purges.contains(child)) {
            for committed in self.committed.entries(child) {
                let mut e = committed.clone();
                if e.is_open() {
                    if let Some(end) = overlay
                        .and_then(|o| o.ends.get(&(e.parent.clone(), e.child.clone())))
                    {
                        e.end = Some(*end);
                    }
                }
                out.push(e);
            }
        }
        if let Some(o) = overlay {
            out.extend(o.adds.iter().filter(|e| e.child == *child).cloned());
        }
        out
    }

    /// Every child that ever had an entry under `parent`, as `tx` sees it
    fn candidate_children(&self, tx: &Transaction, parent: &ResourceId) -> BTreeSet<ResourceId> {
        let mut children: BTreeSet<ResourceId> =
            self.committed.children_of(parent).cloned().collect();
        if let Some(o) = self.overlay(tx) {
            children.extend(
                o.adds
                    .iter()
                    .filter(|e| e.parent == *parent)
                    .map(|e| e.child.clone()),
            );
        }
        children
    }

    /// Entries under `parent` for every candidate child
    fn entries_under(&self, tx: &Transaction, parent: &ResourceId) -> Vec<ContainmentEntry> {
        self.candidate_children(tx, parent)
            .iter()
            .flat_map(|child| self.visible_entries(tx, child))
            .filter(|e| e.parent == *parent)
            .collect()
    }

    /// Close or discard the open (parent, child) entry visible to `tx`
    fn remove_pair(&mut self, tx: &Transaction, parent: &ResourceId, child: &ResourceId, now: Instant) {
        let committed_open = self.committed.has_open(parent, child);
        let overlay = self.overlays.entry(tx.id().clone()).or_default();

        if let Some(pos) = overlay
            .adds
            .iter()
            .position(|e| e.parent == *parent && e.child == *child && e.is_open())
        {
            debug!(%parent, %child, "discarding containment added in this transaction");
            overlay.adds.remove(pos);
            return;
        }
        if committed_open && !overlay.purges.contains(child) {
            overlay
                .ends
                .entry((parent.clone(), child.clone()))
                .or_insert(now);
        }
    }
}

/// Transactional containment index
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct ContainmentIndex {
    state: Arc<RwLock<ContainmentState>>,
    clock: Arc<dyn Clock>,
}

impl Debug for ContainmentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ContainmentIndex")
            .field("entry_count", &state.committed.entry_count())
            .field("open_transactions", &state.overlays.len())
            .finish()
    }
}

impl ContainmentIndex {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ContainmentState::default())),
            clock,
        }
    }

    /// Record that `parent` contains `child` from now on
    pub fn add_contained_by(
        &self,
        tx: &Transaction,
        parent: &ResourceId,
        child: &ResourceId,
    ) -> Result<()> {
        self.add_contained_by_at(tx, parent, child, self.clock.now(), None)
    }

    /// Record containment over an explicit interval
    ///
    /// Adding an open entry for a pair that is already open is a no-op.
    pub fn add_contained_by_at(
        &self,
        tx: &Transaction,
        parent: &ResourceId,
        child: &ResourceId,
        start: Instant,
        end: Option<Instant>,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let parent = parent.as_base();
        let child = child.as_base();
        {
            let mut state = self.state.write();
            if end.is_none()
                && state
                    .visible_entries(tx, &child)
                    .iter()
                    .any(|e| e.parent == parent && e.is_open())
            {
                debug!(%parent, %child, "containment already open");
                return Ok(());
            }
            debug!(%parent, %child, tx = %tx.id(), %start, ?end, "adding containment");
            let overlay = state.overlays.entry(tx.id().clone()).or_default();
            overlay.purges.remove(&child);
            overlay.adds.push(ContainmentEntry {
                parent,
                child,
                start,
                end,
            });
        }
        self.finish_write(tx)
    }

    /// End the containment of `child` by `parent` now
    pub fn remove_contained_by(
        &self,
        tx: &Transaction,
        parent: &ResourceId,
        child: &ResourceId,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let now = self.clock.now();
        self.state
            .write()
            .remove_pair(tx, &parent.as_base(), &child.as_base(), now);
        self.finish_write(tx)
    }

    /// End every open containment of `child` now
    pub fn remove_resource(&self, tx: &Transaction, child: &ResourceId) -> Result<()> {
        ensure_writable(tx)?;
        let now = self.clock.now();
        let child = child.as_base();
        {
            let mut state = self.state.write();
            let parents: Vec<ResourceId> = state
                .visible_entries(tx, &child)
                .into_iter()
                .filter(ContainmentEntry::is_open)
                .map(|e| e.parent)
                .collect();
            for parent in parents {
                debug!(%parent, %child, "marking containment deleted");
                state.remove_pair(tx, &parent, &child, now);
            }
        }
        self.finish_write(tx)
    }

    /// Drop every containment entry of `child`, history included
    pub fn purge_resource(&self, tx: &Transaction, child: &ResourceId) -> Result<()> {
        ensure_writable(tx)?;
        let child = child.as_base();
        {
            let mut state = self.state.write();
            let overlay = state.overlays.entry(tx.id().clone()).or_default();
            overlay.ends.retain(|(_, c), _| *c != child);
            overlay.adds.retain(|e| e.child != child);
            debug!(%child, tx = %tx.id(), "purging containment");
            overlay.purges.insert(child);
        }
        self.finish_write(tx)
    }

    /// Children of `parent`; a memento parent reads at its instant
    pub fn get_contains(&self, tx: &Transaction, parent: &ResourceId) -> Vec<ResourceId> {
        self.get_contains_at(tx, parent, parent.memento_instant())
    }

    /// Children of `parent` live (`None`) or at an instant
    pub fn get_contains_at(
        &self,
        tx: &Transaction,
        parent: &ResourceId,
        at: Option<Instant>,
    ) -> Vec<ResourceId> {
        let parent = parent.as_base();
        let state = self.state.read();
        let children: BTreeSet<ResourceId> = state
            .entries_under(tx, &parent)
            .into_iter()
            .filter(|e| in_effect(e.start, e.end, at))
            .map(|e| e.child)
            .collect();
        children.into_iter().collect()
    }

    /// Children of `parent` whose containment has ended (tombstoned children)
    pub fn get_contains_deleted(&self, tx: &Transaction, parent: &ResourceId) -> Vec<ResourceId> {
        let parent = parent.as_base();
        let state = self.state.read();
        let mut by_child: HashMap<ResourceId, bool> = HashMap::new();
        for e in state.entries_under(tx, &parent) {
            *by_child.entry(e.child.clone()).or_insert(false) |= e.is_open();
        }
        let deleted: BTreeSet<ResourceId> = by_child
            .into_iter()
            .filter(|(_, open)| !open)
            .map(|(child, _)| child)
            .collect();
        deleted.into_iter().collect()
    }

    /// Parent currently containing `child`
    ///
    /// A memento child is looked up at its instant and yields the parent's
    /// memento at the same instant.
    pub fn get_contained_by(&self, tx: &Transaction, child: &ResourceId) -> Option<ResourceId> {
        let at = child.memento_instant();
        let base = child.as_base();
        let state = self.state.read();
        let parent = state
            .visible_entries(tx, &base)
            .into_iter()
            .filter(|e| in_effect(e.start, e.end, at))
            .max_by_key(|e| e.start)
            .map(|e| e.parent)?;
        Some(match at {
            Some(t) => parent.as_memento(t),
            None => parent,
        })
    }

    /// Parent of `child`, falling back to the latest ended containment when
    /// `include_deleted` is set
    pub fn find_parent(
        &self,
        tx: &Transaction,
        child: &ResourceId,
        include_deleted: bool,
    ) -> Option<ResourceId> {
        let base = child.as_base();
        let entries = self.state.read().visible_entries(tx, &base);
        if let Some(open) = entries.iter().find(|e| e.is_open()) {
            return Some(open.parent.clone());
        }
        if !include_deleted {
            return None;
        }
        entries
            .into_iter()
            .max_by_key(|e| e.end)
            .map(|e| e.parent)
    }

    /// Whether `id` (or the resource it companions) is contained anywhere
    pub fn resource_exists(&self, tx: &Transaction, id: &ResourceId, include_deleted: bool) -> bool {
        if id.is_root() {
            return true;
        }
        let entries = self.state.read().visible_entries(tx, &id.as_base());
        if include_deleted {
            !entries.is_empty()
        } else {
            entries.iter().any(ContainmentEntry::is_open)
        }
    }

    /// Closest existing container of `id`
    ///
    /// Uses the recorded parent when there is one, otherwise walks up the
    /// path until an existing resource is found, ending at the root.
    pub fn get_container_id_by_path(
        &self,
        tx: &Transaction,
        id: &ResourceId,
        include_deleted: bool,
    ) -> ResourceId {
        if id.is_root() {
            return ResourceId::root();
        }
        if let Some(parent) = self.find_parent(tx, id, include_deleted) {
            return parent;
        }
        let mut current = id.path_parent();
        while let Some(candidate) = current {
            if self.resource_exists(tx, &candidate, include_deleted) {
                return candidate;
            }
            current = candidate.path_parent();
        }
        ResourceId::root()
    }

    /// Latest instant at which a child of `parent` was added or removed
    pub fn last_updated(&self, tx: &Transaction, parent: &ResourceId) -> Option<Instant> {
        let parent = parent.as_base();
        self.state
            .read()
            .entries_under(tx, &parent)
            .into_iter()
            .flat_map(|e| [Some(e.start), e.end])
            .flatten()
            .max()
    }

    pub fn commit_transaction(&self, tx: &Transaction) -> Result<()> {
        self.commit_overlay(tx.id())
    }

    pub fn rollback_transaction(&self, tx: &Transaction) -> Result<()> {
        self.rollback_overlay(tx.id())
    }

    /// Drop every uncommitted overlay
    pub fn clear_all_transactions(&self) {
        self.state.write().overlays.clear();
    }

    /// Drop all committed entries and every overlay
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.committed = ContainmentTable::default();
        state.overlays.clear();
    }

    fn commit_overlay(&self, tx_id: &TxId) -> Result<()> {
        let _span = tracing::debug_span!("containment_commit", tx = %tx_id).entered();
        let mut state = self.state.write();
        let Some(overlay) = state.overlays.remove(tx_id) else {
            return Ok(());
        };
        debug!(
            adds = overlay.adds.len(),
            ends = overlay.ends.len(),
            purges = overlay.purges.len(),
            "applying containment overlay"
        );
        for child in &overlay.purges {
            state.committed.remove_child(child);
        }
        for ((parent, child), at) in &overlay.ends {
            state.committed.close(parent, child, *at);
        }
        for entry in overlay.adds {
            state.committed.insert(entry);
        }
        Ok(())
    }

    fn rollback_overlay(&self, tx_id: &TxId) -> Result<()> {
        if self.state.write().overlays.remove(tx_id).is_some() {
            debug!(tx = %tx_id, "discarded containment overlay");
        }
        Ok(())
    }

    fn finish_write(&self, tx: &Transaction) -> Result<()> {
        if tx.is_short_lived() {
            self.commit_overlay(tx.id())
        } else {
            tx.register(Arc::new(self.clone()));
            Ok(())
        }
    }
}

impl TransactionParticipant for ContainmentIndex {
    fn participant_id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    fn commit(&self, tx: &TxId) -> Result<()> {
        self.commit_overlay(tx)
    }

    fn rollback(&self, tx: &TxId) -> Result<()> {
        self.rollback_overlay(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ldpx_core::ManualClock;

    fn t(secs: i64) -> Instant {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn id(path: &str) -> ResourceId {
        ResourceId::parse(path).unwrap()
    }

    fn setup() -> (ContainmentIndex, ManualClock) {
        let clock = ManualClock::new(t(0));
        (ContainmentIndex::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn uncommitted_adds_are_private() {
        let (index, _) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();

        assert_eq!(index.get_contains(&tx, &id("p")), vec![id("p/c")]);
        assert!(index.get_contains(&Transaction::read_only(), &id("p")).is_empty());
        assert!(index.get_contains(&Transaction::new(), &id("p")).is_empty());

        tx.commit().unwrap();
        assert_eq!(
            index.get_contains(&Transaction::read_only(), &id("p")),
            vec![id("p/c")]
        );
    }

    #[test]
    fn removing_an_uncommitted_add_discards_it() {
        let (index, _) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        index.remove_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        tx.commit().unwrap();

        let ro = Transaction::read_only();
        assert!(index.get_contains(&ro, &id("p")).is_empty());
        assert!(index.get_contains_deleted(&ro, &id("p")).is_empty());
        assert!(!index.resource_exists(&ro, &id("p/c"), true));
    }

    #[test]
    fn removed_children_stay_visible_to_mementos() {
        let (index, clock) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        tx.commit().unwrap();

        clock.set(t(10));
        let tx = Transaction::new();
        index.remove_resource(&tx, &id("p/c")).unwrap();
        // still open for everyone else until commit
        assert_eq!(
            index.get_contains(&Transaction::read_only(), &id("p")),
            vec![id("p/c")]
        );
        tx.commit().unwrap();

        let ro = Transaction::read_only();
        assert!(index.get_contains(&ro, &id("p")).is_empty());
        assert_eq!(
            index.get_contains(&ro, &id("p").as_memento(t(5))),
            vec![id("p/c")]
        );
        assert!(index.get_contains(&ro, &id("p").as_memento(t(10))).is_empty());
        assert_eq!(index.get_contains_deleted(&ro, &id("p")), vec![id("p/c")]);
        assert!(index.resource_exists(&ro, &id("p/c"), true));
        assert!(!index.resource_exists(&ro, &id("p/c"), false));
        assert_eq!(index.last_updated(&ro, &id("p")), Some(t(10)));
    }

    #[test]
    fn purge_removes_history() {
        let (index, clock) = setup();
        let tx = Transaction::short_lived();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        clock.set(t(10));
        index.remove_resource(&tx, &id("p/c")).unwrap();

        let tx = Transaction::new();
        index.purge_resource(&tx, &id("p/c")).unwrap();
        assert!(!index.resource_exists(&tx, &id("p/c"), true));
        assert!(index.resource_exists(&Transaction::read_only(), &id("p/c"), true));
        tx.commit().unwrap();

        let ro = Transaction::read_only();
        assert!(index.get_contains(&ro, &id("p").as_memento(t(5))).is_empty());
        assert!(index.get_contains_deleted(&ro, &id("p")).is_empty());
        assert_eq!(index.last_updated(&ro, &id("p")), None);
    }

    #[test]
    fn readding_an_open_pair_is_a_noop() {
        let (index, clock) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        clock.set(t(3));
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        tx.commit().unwrap();

        let ro = Transaction::read_only();
        assert_eq!(index.get_contains(&ro, &id("p").as_memento(t(1))), vec![id("p/c")]);
        assert_eq!(index.last_updated(&ro, &id("p")), Some(t(0)));
    }

    #[test]
    fn contained_by_normalizes_ids() {
        let (index, clock) = setup();
        let tx = Transaction::short_lived();
        index.add_contained_by(&tx, &id("p"), &id("p/bin")).unwrap();
        clock.set(t(20));

        let ro = Transaction::read_only();
        assert_eq!(
            index.get_contained_by(&ro, &id("p/bin/~desc")),
            Some(id("p"))
        );
        let memento = id("p/bin").as_memento(t(5));
        assert_eq!(
            index.get_contained_by(&ro, &memento),
            Some(id("p").as_memento(t(5)))
        );
        assert_eq!(index.get_contained_by(&ro, &id("other")), None);
    }

    #[test]
    fn find_parent_includes_deleted_on_request() {
        let (index, clock) = setup();
        let tx = Transaction::short_lived();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        clock.set(t(4));
        index.remove_resource(&tx, &id("p/c")).unwrap();

        let ro = Transaction::read_only();
        assert_eq!(index.find_parent(&ro, &id("p/c"), false), None);
        assert_eq!(index.find_parent(&ro, &id("p/c"), true), Some(id("p")));
    }

    #[test]
    fn container_by_path_walks_up() {
        let (index, _) = setup();
        let tx = Transaction::short_lived();
        index.add_contained_by(&tx, &ResourceId::root(), &id("a")).unwrap();

        let ro = Transaction::read_only();
        assert_eq!(index.get_container_id_by_path(&ro, &id("a/b/c"), false), id("a"));
        assert_eq!(
            index.get_container_id_by_path(&ro, &id("a"), false),
            ResourceId::root()
        );
        assert_eq!(
            index.get_container_id_by_path(&ro, &id("x/y"), false),
            ResourceId::root()
        );
    }

    #[test]
    fn rollback_discards_overlay() {
        let (index, _) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("p"), &id("p/c")).unwrap();
        tx.rollback().unwrap();
        assert!(index.get_contains(&Transaction::read_only(), &id("p")).is_empty());
        assert!(index.add_contained_by(&tx, &id("p"), &id("p/d")).is_err());
    }

    #[test]
    fn reset_and_clear() {
        let (index, _) = setup();
        let committed = Transaction::short_lived();
        index.add_contained_by(&committed, &id("p"), &id("p/a")).unwrap();
        let pending = Transaction::new();
        index.add_contained_by(&pending, &id("p"), &id("p/b")).unwrap();

        index.clear_all_transactions();
        assert_eq!(index.get_contains(&pending, &id("p")), vec![id("p/a")]);

        index.reset();
        assert!(index.get_contains(&pending, &id("p")).is_empty());
    }
}

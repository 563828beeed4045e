//! Time-ranged membership triple index
//!
//! Every row is a membership triple valid during `[start, end)`, tagged with
//! the container whose configuration produced it (`source`) and the contained
//! resource whose existence produced it (`member`). Rows are keyed by
//! (subject, predicate, object, start); writing a key twice keeps the last
//! write.
//!
//! Per-transaction overlays hold pending adds, close instants for committed
//! rows and committed keys to purge. Commit applies purges, then closes, then
//! adds, under a single write lock.

use crate::{ensure_writable, in_effect};
use ldpx_core::{Instant, ResourceId, Result, Transaction, TransactionParticipant, Triple, TxId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Unique key of a membership row
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MembershipKey {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub start: Instant,
}

/// A membership triple with its validity interval and provenance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipEntry {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub start: Instant,
    pub end: Option<Instant>,
    /// Container whose configuration produced the row
    pub source: ResourceId,
    /// Contained resource whose existence produced the row
    pub member: ResourceId,
}

impl MembershipEntry {
    /// Open row starting at `start`
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        source: ResourceId,
        member: ResourceId,
        start: Instant,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            start,
            end: None,
            source: source.as_base(),
            member: member.as_base(),
        }
    }

    pub fn ending(mut self, end: Option<Instant>) -> Self {
        self.end = end;
        self
    }

    pub fn key(&self) -> MembershipKey {
        MembershipKey {
            subject: self.subject.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
            start: self.start,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Whether the row is in effect live (`None`) or at an instant
    pub fn in_effect(&self, at: Option<Instant>) -> bool {
        in_effect(self.start, self.end, at)
    }

    pub fn to_triple(&self) -> Triple {
        Triple::iri(&self.subject, &self.predicate, &self.object)
    }

    fn same_statement(&self, other: &MembershipEntry) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
            && self.source == other.source
    }
}

#[derive(Clone, Copy)]
enum Lookup<'a> {
    Subject(&'a str),
    Object(&'a str),
    Source(&'a ResourceId),
    Member(&'a ResourceId),
}

#[derive(Debug, Default)]
struct MembershipTable {
    rows: HashMap<MembershipKey, MembershipEntry>,
    by_subject: HashMap<String, HashSet<MembershipKey>>,
    by_object: HashMap<String, HashSet<MembershipKey>>,
    by_source: HashMap<ResourceId, HashSet<MembershipKey>>,
    by_member: HashMap<ResourceId, HashSet<MembershipKey>>,
}

fn index_add<K: Hash + Eq>(index: &mut HashMap<K, HashSet<MembershipKey>>, k: K, key: &MembershipKey) {
    index.entry(k).or_default().insert(key.clone());
}

fn index_remove<K: Hash + Eq>(index: &mut HashMap<K, HashSet<MembershipKey>>, k: &K, key: &MembershipKey) {
    if let Some(keys) = index.get_mut(k) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(k);
        }
    }
}

impl MembershipTable {
    /// Insert or replace the row with the same key
    fn insert(&mut self, entry: MembershipEntry) {
        let key = entry.key();
        self.remove(&key);
        index_add(&mut self.by_subject, entry.subject.clone(), &key);
        index_add(&mut self.by_object, entry.object.clone(), &key);
        index_add(&mut self.by_source, entry.source.clone(), &key);
        index_add(&mut self.by_member, entry.member.clone(), &key);
        self.rows.insert(key, entry);
    }

    fn remove(&mut self, key: &MembershipKey) -> Option<MembershipEntry> {
        let entry = self.rows.remove(key)?;
        index_remove(&mut self.by_subject, &entry.subject, key);
        index_remove(&mut self.by_object, &entry.object, key);
        index_remove(&mut self.by_source, &entry.source, key);
        index_remove(&mut self.by_member, &entry.member, key);
        Some(entry)
    }

    fn get(&self, key: &MembershipKey) -> Option<&MembershipEntry> {
        self.rows.get(key)
    }

    fn keys(&self, lookup: Lookup<'_>) -> Vec<MembershipKey> {
        let keys = match lookup {
            Lookup::Subject(s) => self.by_subject.get(s),
            Lookup::Object(o) => self.by_object.get(o),
            Lookup::Source(id) => self.by_source.get(id),
            Lookup::Member(id) => self.by_member.get(id),
        };
        keys.map(|k| k.iter().cloned().collect()).unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Default)]
struct MembershipOverlay {
    adds: MembershipTable,
    ends: HashMap<MembershipKey, Instant>,
    purges: HashSet<MembershipKey>,
}

#[derive(Debug, Default)]
struct MembershipState {
    committed: MembershipTable,
    overlays: HashMap<TxId, MembershipOverlay>,
}

impl MembershipState {
    fn overlay(&self, tx: &Transaction) -> Option<&MembershipOverlay> {
        if tx.is_short_lived() {
            None
        } else {
            self.overlays.get(tx.id())
        }
    }

    fn overlay_mut(&mut self, tx: &Transaction) -> &mut MembershipOverlay {
        self.overlays.entry(tx.id().clone()).or_default()
    }

    /// Rows matching `lookup` as `tx` sees them, ordered by key
    fn visible(&self, tx: &Transaction, lookup: Lookup<'_>) -> Vec<MembershipEntry> {
        let overlay = self.overlay(tx);
        let mut rows: BTreeMap<MembershipKey, MembershipEntry> = BTreeMap::new();

        for key in self.committed.keys(lookup) {
            if overlay.is_some_and(|o| o.purges.contains(&key)) {
                continue;
            }
            if let Some(row) = self.committed.get(&key) {
                let mut row = row.clone();
                if row.is_open() {
                    if let Some(end) = overlay.and_then(|o| o.ends.get(&key)) {
                        row.end = Some(*end);
                    }
                }
                rows.insert(key, row);
            }
        }
        if let Some(o) = overlay {
            for key in o.adds.keys(lookup) {
                if let Some(row) = o.adds.get(&key) {
                    rows.insert(key, row.clone());
                }
            }
        }
        rows.into_values().collect()
    }

    fn committed_open(&self, key: &MembershipKey) -> bool {
        self.committed.get(key).is_some_and(MembershipEntry::is_open)
    }

    /// Close every given row that is open
    ///
    /// An open row added by `tx` itself is bounded at `at`, or dropped when it
    /// would not cover any instant.
    fn end_rows(&mut self, tx: &Transaction, rows: Vec<MembershipEntry>, at: Instant) {
        for row in rows.into_iter().filter(MembershipEntry::is_open) {
            let key = row.key();
            let committed_open = self.committed_open(&key);
            let overlay = self.overlay_mut(tx);
            if let Some(added) = overlay.adds.remove(&key) {
                if added.start < at {
                    overlay.adds.insert(added.ending(Some(at)));
                }
            }
            if committed_open && !overlay.purges.contains(&key) {
                overlay.ends.entry(key).or_insert(at);
            }
        }
    }

    /// Remove the given rows from the transaction and the committed table
    fn purge_rows(&mut self, tx: &Transaction, rows: Vec<MembershipEntry>) {
        for row in rows {
            let key = row.key();
            let committed = self.committed.get(&key).is_some();
            let overlay = self.overlay_mut(tx);
            overlay.adds.remove(&key);
            overlay.ends.remove(&key);
            if committed {
                overlay.purges.insert(key);
            }
        }
    }
}

/// Transactional membership index
///
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct MembershipIndexManager {
    state: Arc<RwLock<MembershipState>>,
}

impl Debug for MembershipIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MembershipIndexManager")
            .field("row_count", &state.committed.len())
            .field("open_transactions", &state.overlays.len())
            .finish()
    }
}

impl MembershipIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a membership row
    ///
    /// An open row first cancels any pending close of the same statement from
    /// the same source; if that leaves an open row for the statement visible,
    /// nothing new is added. A bounded row is always written.
    pub fn insert(&self, tx: &Transaction, entry: MembershipEntry) -> Result<()> {
        ensure_writable(tx)?;
        {
            let mut state = self.state.write();
            if entry.is_open() {
                let same: Vec<MembershipKey> = state
                    .visible(tx, Lookup::Subject(&entry.subject))
                    .iter()
                    .filter(|r| r.same_statement(&entry))
                    .map(MembershipEntry::key)
                    .collect();
                if !tx.is_short_lived() {
                    if let Some(o) = state.overlays.get_mut(tx.id()) {
                        for key in &same {
                            o.ends.remove(key);
                        }
                    }
                }
                let still_open = state
                    .visible(tx, Lookup::Subject(&entry.subject))
                    .iter()
                    .any(|r| r.same_statement(&entry) && r.is_open());
                if still_open {
                    debug!(subject = %entry.subject, object = %entry.object, "membership already open");
                    return Ok(());
                }
            }
            debug!(
                subject = %entry.subject,
                predicate = %entry.predicate,
                object = %entry.object,
                start = %entry.start,
                end = ?entry.end,
                "adding membership"
            );
            state.overlay_mut(tx).adds.insert(entry);
        }
        self.finish_write(tx)
    }

    /// Close the open rows for a statement at `at`; a no-op when none are open
    pub fn close(
        &self,
        tx: &Transaction,
        subject: &str,
        predicate: &str,
        object: &str,
        at: Instant,
    ) -> Result<()> {
        ensure_writable(tx)?;
        {
            let mut state = self.state.write();
            let rows: Vec<MembershipEntry> = state
                .visible(tx, Lookup::Subject(subject))
                .into_iter()
                .filter(|r| r.predicate == predicate && r.object == object)
                .collect();
            state.end_rows(tx, rows, at);
        }
        self.finish_write(tx)
    }

    /// Close every open row produced by `source` at `at`
    pub fn end_for_source(&self, tx: &Transaction, source: &ResourceId, at: Instant) -> Result<()> {
        ensure_writable(tx)?;
        let source = source.as_base();
        {
            let mut state = self.state.write();
            let rows = state.visible(tx, Lookup::Source(&source));
            debug!(%source, rows = rows.len(), %at, "ending membership for source");
            state.end_rows(tx, rows, at);
        }
        self.finish_write(tx)
    }

    /// Close every open row `member` produced under `source` at `at`
    pub fn end_for_member(
        &self,
        tx: &Transaction,
        source: &ResourceId,
        member: &ResourceId,
        at: Instant,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let source = source.as_base();
        let member = member.as_base();
        {
            let mut state = self.state.write();
            let rows: Vec<MembershipEntry> = state
                .visible(tx, Lookup::Member(&member))
                .into_iter()
                .filter(|r| r.source == source)
                .collect();
            debug!(%source, %member, rows = rows.len(), %at, "ending membership for member");
            state.end_rows(tx, rows, at);
        }
        self.finish_write(tx)
    }

    /// Close every open row `member` produced at `at`, whatever its source
    pub fn end_for_member_everywhere(
        &self,
        tx: &Transaction,
        member: &ResourceId,
        at: Instant,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let member = member.as_base();
        {
            let mut state = self.state.write();
            let rows = state.visible(tx, Lookup::Member(&member));
            debug!(%member, rows = rows.len(), %at, "ending membership of member");
            state.end_rows(tx, rows, at);
        }
        self.finish_write(tx)
    }

    /// Remove every row of a statement, history included
    pub fn purge(&self, tx: &Transaction, subject: &str, predicate: &str, object: &str) -> Result<()> {
        ensure_writable(tx)?;
        {
            let mut state = self.state.write();
            let rows: Vec<MembershipEntry> = state
                .visible(tx, Lookup::Subject(subject))
                .into_iter()
                .filter(|r| r.predicate == predicate && r.object == object)
                .collect();
            state.purge_rows(tx, rows);
        }
        self.finish_write(tx)
    }

    /// Remove every row whose subject, object, source or member is `id`
    pub fn purge_references(&self, tx: &Transaction, id: &ResourceId) -> Result<()> {
        ensure_writable(tx)?;
        let base = id.as_base();
        let iri = base.full_id();
        {
            let mut state = self.state.write();
            let mut rows = state.visible(tx, Lookup::Subject(&iri));
            rows.extend(state.visible(tx, Lookup::Object(&iri)));
            rows.extend(state.visible(tx, Lookup::Source(&base)));
            rows.extend(state.visible(tx, Lookup::Member(&base)));
            debug!(id = %base, rows = rows.len(), "purging membership references");
            state.purge_rows(tx, rows);
        }
        self.finish_write(tx)
    }

    /// Remove rows of `source` still in effect after `after` (all rows when `None`)
    pub fn delete_for_source_after(
        &self,
        tx: &Transaction,
        source: &ResourceId,
        after: Option<Instant>,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let source = source.as_base();
        {
            let mut state = self.state.write();
            let rows: Vec<MembershipEntry> = state
                .visible(tx, Lookup::Source(&source))
                .into_iter()
                .filter(|r| match (after, r.end) {
                    (None, _) | (Some(_), None) => true,
                    (Some(after), Some(end)) => end > after,
                })
                .collect();
            debug!(%source, ?after, rows = rows.len(), "deleting membership for source");
            state.purge_rows(tx, rows);
        }
        self.finish_write(tx)
    }

    /// Rows with `subject`, live (`None`) or at an instant
    pub fn query_by_subject(
        &self,
        tx: &Transaction,
        subject: &str,
        at: Option<Instant>,
    ) -> Vec<MembershipEntry> {
        self.state
            .read()
            .visible(tx, Lookup::Subject(subject))
            .into_iter()
            .filter(|r| r.in_effect(at))
            .collect()
    }

    /// Rows with `object`, live (`None`) or at an instant
    pub fn query_by_object(
        &self,
        tx: &Transaction,
        object: &str,
        at: Option<Instant>,
    ) -> Vec<MembershipEntry> {
        self.state
            .read()
            .visible(tx, Lookup::Object(object))
            .into_iter()
            .filter(|r| r.in_effect(at))
            .collect()
    }

    /// Open rows produced by `source`
    pub fn open_for_source(&self, tx: &Transaction, source: &ResourceId) -> Vec<MembershipEntry> {
        self.state
            .read()
            .visible(tx, Lookup::Source(&source.as_base()))
            .into_iter()
            .filter(MembershipEntry::is_open)
            .collect()
    }

    /// Latest start or end instant among rows with `subject`
    pub fn last_updated(&self, tx: &Transaction, subject: &str) -> Option<Instant> {
        self.state
            .read()
            .visible(tx, Lookup::Subject(subject))
            .into_iter()
            .flat_map(|r| [Some(r.start), r.end])
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

    /// Drop all committed rows and every overlay
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.committed = MembershipTable::default();
        state.overlays.clear();
    }

    fn commit_overlay(&self, tx_id: &TxId) -> Result<()> {
        let _span = tracing::debug_span!("membership_index_commit", tx = %tx_id).entered();
        let mut state = self.state.write();
        let Some(overlay) = state.overlays.remove(tx_id) else {
            return Ok(());
        };
        debug!(
            adds = overlay.adds.len(),
            ends = overlay.ends.len(),
            purges = overlay.purges.len(),
            "applying membership overlay"
        );
        for key in &overlay.purges {
            state.committed.remove(key);
        }
        for (key, at) in &overlay.ends {
            if let Some(row) = state.committed.rows.get_mut(key) {
                if row.is_open() {
                    row.end = Some(*at);
                }
            }
        }
        for (_, row) in overlay.adds.rows {
            state.committed.insert(row);
        }
        Ok(())
    }

    fn rollback_overlay(&self, tx_id: &TxId) -> Result<()> {
        if self.state.write().overlays.remove(tx_id).is_some() {
            debug!(tx = %tx_id, "discarded membership overlay");
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

impl TransactionParticipant for MembershipIndexManager {
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

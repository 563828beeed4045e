//! Membership orchestration
//!
//! `MembershipService` turns resource lifecycle notifications into membership
//! rows. It resolves container configuration through the triple reader, walks
//! children through the containment index and is the only writer of the
//! membership index.
//!
//! Row lifecycle: a row is opened when a member appears, closed (its end set)
//! on soft delete or configuration change, and purged only when the resource
//! it references is gone from persistence.

use crate::config::MembershipConfig;
use crate::container_config::{self, ContainerConfig, ContainerType};
use crate::error::Result;
use ldpx_core::{
    Instant, ResourceId, ResourceKind, ResourceView, Transaction, Triple, TripleReader,
    VersionLister,
};
use ldpx_index::{ContainmentIndex, MembershipIndexManager};
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{debug, warn};

/// One stretch of a container's configuration history
#[derive(Clone, Debug, PartialEq)]
struct TimelineEntry {
    start: Instant,
    end: Option<Instant>,
    /// `None` while the container was not (validly) configured
    config: Option<ContainerConfig>,
}

/// A member as it was over `[start, end)`
struct MemberState {
    start: Instant,
    end: Option<Instant>,
    view: ResourceView,
}

/// Pending history row for one member target
struct Run {
    target: String,
    start: Instant,
    end: Option<Instant>,
}

/// Derives, maintains and answers LDP membership
///
/// Clones share the same indexes and collaborators.
#[derive(Clone)]
pub struct MembershipService {
    containment: ContainmentIndex,
    index: MembershipIndexManager,
    reader: Arc<dyn TripleReader>,
    versions: Arc<dyn VersionLister>,
    config: MembershipConfig,
}

impl Debug for MembershipService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipService")
            .field("containment", &self.containment)
            .field("index", &self.index)
            .field("config", &self.config)
            .finish()
    }
}

impl MembershipService {
    pub fn new(
        containment: ContainmentIndex,
        index: MembershipIndexManager,
        reader: Arc<dyn TripleReader>,
        versions: Arc<dyn VersionLister>,
        config: MembershipConfig,
    ) -> Self {
        Self {
            containment,
            index,
            reader,
            versions,
            config,
        }
    }

    pub fn index(&self) -> &MembershipIndexManager {
        &self.index
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle notifications
    // ------------------------------------------------------------------

    /// A container or binary was created
    ///
    /// When its parent is a direct or indirect container, one row starting at
    /// the member's creation instant is added.
    pub fn resource_created(&self, tx: &Transaction, id: &ResourceId) -> Result<()> {
        let _span = tracing::debug_span!("membership_resource_created", id = %id).entered();
        let member = id.as_base();
        let Some(view) = self.reader.read(tx, &member, None)? else {
            debug!("created resource not found");
            return Ok(());
        };
        if !participates(&view) {
            return Ok(());
        }
        let Some(parent) = self.containment.get_contained_by(tx, &member) else {
            debug!("no containing resource");
            return Ok(());
        };
        let Some(parent_view) = self.reader.read(tx, &parent, None)? else {
            return Ok(());
        };
        let Some(config) = resolve_logged(&parent_view) else {
            return Ok(());
        };
        let Some(target) = config.member_target(&view) else {
            debug!(%parent, "member has no inserted content value");
            return Ok(());
        };
        let entry = config.entry(&parent, &member, &target, view.headers.created);
        Ok(self.index.insert(tx, entry)?)
    }

    /// A resource's triples changed
    ///
    /// Containers whose membership projection changed have their rows
    /// recomputed. A proxy of an indirect container whose inserted content
    /// value changed has its own row replaced.
    pub fn resource_modified(&self, tx: &Transaction, id: &ResourceId) -> Result<()> {
        let _span = tracing::debug_span!("membership_resource_modified", id = %id).entered();
        let container = id.as_base();
        let Some(view) = self.reader.read(tx, &container, None)? else {
            return Ok(());
        };
        if view.is_deleted() || !participates(&view) {
            return Ok(());
        }
        self.refresh_proxy(tx, &view)?;
        if !view.is_container() {
            return Ok(());
        }
        let config = resolve_logged(&view);

        let projected = match &config {
            Some(config) => self.project(tx, &container, config)?,
            None => Vec::new(),
        };
        let projected_set: BTreeSet<(String, String, String)> = match &config {
            Some(config) => projected.iter().map(|(_, t)| config.statement(t)).collect(),
            None => BTreeSet::new(),
        };
        let current: BTreeSet<(String, String, String)> = self
            .index
            .open_for_source(tx, &container)
            .into_iter()
            .map(|r| (r.subject, r.predicate, r.object))
            .collect();
        if projected_set == current {
            debug!("membership projection unchanged");
            return Ok(());
        }

        if self.config.auto_versioning {
            let at = view.headers.last_modified;
            debug!(%at, rows = projected.len(), "reopening membership under new configuration");
            self.index.end_for_source(tx, &container, at)?;
            if let Some(config) = &config {
                for (member, target) in projected {
                    self.index
                        .insert(tx, config.entry(&container, &member, &target, at))?;
                }
            }
            Ok(())
        } else {
            let after = self
                .versions
                .list_versions(tx, &container)?
                .last()
                .copied();
            debug!(?after, "rebuilding membership since last version");
            self.index.delete_for_source_after(tx, &container, after)?;
            self.populate_history(tx, &view, after)
        }
    }

    /// A resource was deleted
    ///
    /// A tombstone closes the rows it sourced as a container and the rows it
    /// produced as a member at its last-modified instant. When the reader no
    /// longer knows the resource, every row referencing it is purged.
    pub fn resource_deleted(&self, tx: &Transaction, id: &ResourceId) -> Result<()> {
        let _span = tracing::debug_span!("membership_resource_deleted", id = %id).entered();
        let base = id.as_base();
        let Some(view) = self.reader.read(tx, &base, None)? else {
            debug!("resource purged, removing membership references");
            return Ok(self.index.purge_references(tx, &base)?);
        };
        let at = view.headers.last_modified;
        if container_config::container_type(&view).is_some() {
            self.index.end_for_source(tx, &base, at)?;
        }
        // Containment may already have been ended in this transaction
        Ok(self.index.end_for_member_everywhere(tx, &base, at)?)
    }

    /// Purge and rebuild the full membership history of a container
    pub fn populate_membership_history(&self, tx: &Transaction, id: &ResourceId) -> Result<()> {
        let _span = tracing::debug_span!("membership_populate_history", id = %id).entered();
        let container = id.as_base();
        self.index.delete_for_source_after(tx, &container, None)?;
        let Some(view) = self.reader.read(tx, &container, None)? else {
            return Ok(());
        };
        if container_config::container_type(&view).is_none() {
            return Ok(());
        }
        self.populate_history(tx, &view, None)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Membership triples with `subject` as subject
    ///
    /// A memento id answers as of its instant; companions answer for their
    /// base resource.
    pub fn get_membership(&self, tx: &Transaction, subject: &ResourceId) -> Vec<Triple> {
        let iri = subject.as_base().full_id();
        let rows = self
            .index
            .query_by_subject(tx, &iri, subject.memento_instant());
        to_triples(rows.iter().map(|r| r.to_triple()))
    }

    /// Membership triples with `object` as object
    pub fn get_membership_by_object(&self, tx: &Transaction, object: &ResourceId) -> Vec<Triple> {
        let iri = object.as_base().full_id();
        let rows = self
            .index
            .query_by_object(tx, &iri, object.memento_instant());
        to_triples(rows.iter().map(|r| r.to_triple()))
    }

    /// Latest instant at which membership of `subject` changed
    pub fn get_last_updated(&self, tx: &Transaction, subject: &ResourceId) -> Option<Instant> {
        self.index.last_updated(tx, &subject.as_base().full_id())
    }

    // ------------------------------------------------------------------
    // Transaction lifecycle
    // ------------------------------------------------------------------

    pub fn commit_transaction(&self, tx: &Transaction) -> Result<()> {
        Ok(self.index.commit_transaction(tx)?)
    }

    pub fn rollback_transaction(&self, tx: &Transaction) -> Result<()> {
        Ok(self.index.rollback_transaction(tx)?)
    }

    pub fn clear_all_transactions(&self) {
        self.index.clear_all_transactions();
    }

    pub fn reset(&self) {
        self.index.reset();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Replace the row `member` produces under an indirect parent when its
    /// target changed
    fn refresh_proxy(&self, tx: &Transaction, member: &ResourceView) -> Result<()> {
        let id = member.id();
        let Some(parent) = self.containment.get_contained_by(tx, id) else {
            return Ok(());
        };
        let Some(parent_view) = self.reader.read(tx, &parent, None)? else {
            return Ok(());
        };
        if container_config::container_type(&parent_view) != Some(ContainerType::Indirect) {
            return Ok(());
        }
        let Some(config) = resolve_logged(&parent_view) else {
            return Ok(());
        };
        let target = config.member_target(member);
        let wanted: BTreeSet<(String, String, String)> =
            target.iter().map(|t| config.statement(t)).collect();
        let current: BTreeSet<(String, String, String)> = self
            .index
            .open_for_source(tx, &parent)
            .into_iter()
            .filter(|r| r.member == *id)
            .map(|r| (r.subject, r.predicate, r.object))
            .collect();
        if wanted == current {
            return Ok(());
        }
        let at = member.headers.last_modified;
        debug!(%parent, proxy = %id, ?target, "proxy target changed");
        self.index.end_for_member(tx, &parent, id, at)?;
        if let Some(target) = target {
            self.index
                .insert(tx, config.entry(&parent, id, &target, at))?;
        }
        Ok(())
    }

    /// Membership targets of the live children of `container` under `config`
    fn project(
        &self,
        tx: &Transaction,
        container: &ResourceId,
        config: &ContainerConfig,
    ) -> Result<Vec<(ResourceId, String)>> {
        let mut projected = Vec::new();
        for child in self.containment.get_contains(tx, container) {
            let Some(view) = self.reader.read(tx, &child, None)? else {
                continue;
            };
            if view.is_deleted() || !participates(&view) {
                continue;
            }
            if let Some(target) = config.member_target(&view) {
                projected.push((child, target));
            }
        }
        Ok(projected)
    }

    /// Configuration history of a container, oldest first
    fn property_timeline(&self, tx: &Transaction, view: &ResourceView) -> Result<Vec<TimelineEntry>> {
        let container = view.id();
        let versions = self.versions.list_versions(tx, container)?;

        let mut states: Vec<(Instant, Option<ContainerConfig>)> = Vec::new();
        for at in &versions {
            if let Some(version) = self.reader.read(tx, container, Some(*at))? {
                states.push((*at, resolve_logged(&version)));
            }
        }
        if !self.config.auto_versioning || states.is_empty() {
            states.push((view.headers.last_modified, resolve_logged(view)));
        }
        if let Some(first) = states.first_mut() {
            first.0 = view.headers.created;
        }

        let mut timeline: Vec<TimelineEntry> = Vec::new();
        for (start, config) in states {
            if let Some(last) = timeline.last_mut() {
                if start <= last.start {
                    last.config = config;
                    continue;
                }
                if last.config == config {
                    continue;
                }
                last.end = Some(start);
            }
            timeline.push(TimelineEntry {
                start,
                end: None,
                config,
            });
        }
        Ok(timeline)
    }

    /// Insert rows for every member of `view` over its configuration history
    ///
    /// With `after` set only the part of history after that instant is
    /// written.
    fn populate_history(
        &self,
        tx: &Transaction,
        view: &ResourceView,
        after: Option<Instant>,
    ) -> Result<()> {
        let container = view.id().clone();
        let timeline: Vec<TimelineEntry> = self
            .property_timeline(tx, view)?
            .into_iter()
            .filter(|e| e.config.is_some())
            .filter(|e| match (after, e.end) {
                (Some(after), Some(end)) => end > after,
                _ => true,
            })
            .collect();
        if timeline.is_empty() {
            return Ok(());
        }

        let mut members: BTreeSet<ResourceId> =
            self.containment.get_contains(tx, &container).into_iter().collect();
        members.extend(self.containment.get_contains_deleted(tx, &container));
        debug!(members = members.len(), entries = timeline.len(), "populating membership history");

        for member in members {
            let Some(member_view) = self.reader.read(tx, &member, None)? else {
                continue;
            };
            if !participates(&member_view) {
                continue;
            }
            let states = self.member_states(tx, &member, &member_view)?;

            for entry in &timeline {
                let Some(config) = &entry.config else {
                    continue;
                };
                // Consecutive states with the same target share one row
                let mut run: Option<Run> = None;
                for state in &states {
                    let start = state.start.max(entry.start);
                    let end = earliest(entry.end, state.end);
                    if end.is_some_and(|end| end <= start) {
                        continue;
                    }
                    let target = config.member_target(&state.view);
                    if let (Some(open), Some(target)) = (run.as_mut(), target.as_ref()) {
                        if open.target == *target && open.end == Some(start) {
                            open.end = end;
                            continue;
                        }
                    }
                    if let Some(done) = run.take() {
                        self.insert_run(tx, config, &container, &member, done, after)?;
                    }
                    run = target.map(|target| Run { target, start, end });
                }
                if let Some(done) = run {
                    self.insert_run(tx, config, &container, &member, done, after)?;
                }
            }
        }
        Ok(())
    }

    /// Stretches of a member's history, oldest first
    ///
    /// Boundaries are its creation, its versions and, while it is live, its
    /// last modification. A deleted member's history stops at its deletion.
    fn member_states(
        &self,
        tx: &Transaction,
        member: &ResourceId,
        view: &ResourceView,
    ) -> Result<Vec<MemberState>> {
        let created = view.headers.created;
        let deleted = view.is_deleted().then_some(view.headers.last_modified);

        let mut bounds: BTreeSet<Instant> = self
            .versions
            .list_versions(tx, member)?
            .into_iter()
            .filter(|at| *at > created)
            .collect();
        bounds.insert(created);
        if deleted.is_none() {
            bounds.insert(view.headers.last_modified);
        }
        let bounds: Vec<Instant> = bounds
            .into_iter()
            .filter(|at| deleted.map_or(true, |deleted| *at < deleted))
            .collect();

        let mut states = Vec::with_capacity(bounds.len());
        for (i, start) in bounds.iter().enumerate() {
            let Some(state) = self.reader.read(tx, member, Some(*start))? else {
                continue;
            };
            if state.is_deleted() {
                continue;
            }
            states.push(MemberState {
                start: *start,
                end: bounds.get(i + 1).copied().or(deleted),
                view: state,
            });
        }
        Ok(states)
    }

    fn insert_run(
        &self,
        tx: &Transaction,
        config: &ContainerConfig,
        container: &ResourceId,
        member: &ResourceId,
        run: Run,
        after: Option<Instant>,
    ) -> Result<()> {
        if let (Some(after), Some(end)) = (after, run.end) {
            if end <= after {
                return Ok(());
            }
        }
        let row = config
            .entry(container, member, &run.target, run.start)
            .ending(run.end);
        Ok(self.index.insert(tx, row)?)
    }
}

/// Only containers and binaries take part in membership
fn participates(view: &ResourceView) -> bool {
    matches!(view.headers.kind, ResourceKind::Container | ResourceKind::Binary)
}

/// Resolve a container's configuration, logging and skipping malformed ones
fn resolve_logged(view: &ResourceView) -> Option<ContainerConfig> {
    match container_config::resolve(view) {
        Ok(config) => config,
        Err(e) => {
            warn!(container = %view.id(), error = %e, "ignoring malformed membership configuration");
            None
        }
    }
}

/// Earlier of two optional ends; `None` is unbounded
fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn to_triples(triples: impl Iterator<Item = Triple>) -> Vec<Triple> {
    triples.collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ldpx_core::{ManualClock, MemoryResourceStore, Term};
    use ldpx_vocab::ldp;

    fn t(secs: i64) -> Instant {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn id(path: &str) -> ResourceId {
        ResourceId::parse(path).unwrap()
    }

    fn service(store: &MemoryResourceStore, auto_versioning: bool) -> MembershipService {
        MembershipService::new(
            ContainmentIndex::new(Arc::new(ManualClock::new(t(0)))),
            MembershipIndexManager::new(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            MembershipConfig { auto_versioning },
        )
    }

    fn set_relation(store: &MemoryResourceStore, dc: &ResourceId, relation: &str, at: Instant) {
        let subject = dc.full_id();
        store
            .update(dc, at, |view| {
                view.triples.retain(|t| t.predicate != ldp::HAS_MEMBER_RELATION);
                view.triples.push(Triple::new(
                    subject,
                    ldp::HAS_MEMBER_RELATION,
                    Term::iri(relation),
                ));
            })
            .unwrap();
    }

    #[test]
    fn timeline_collapses_equal_configurations() {
        let store = MemoryResourceStore::new();
        let dc = id("dc");
        store.put(
            ResourceView::new(dc.clone(), ResourceKind::Container, t(0))
                .with_type(ldp::DIRECT_CONTAINER),
        );
        set_relation(&store, &dc, "urn:r1", t(0));
        store.create_version(&dc, t(1)).unwrap();
        // Unrelated edit recorded as its own version
        store
            .update(&dc, t(5), |view| view.headers.types.push("urn:tagged".into()))
            .unwrap();
        store.create_version(&dc, t(5)).unwrap();
        set_relation(&store, &dc, "urn:r2", t(9));
        store.create_version(&dc, t(9)).unwrap();

        let service = service(&store, true);
        let tx = Transaction::new();
        let view = store.get(&dc).unwrap();
        let timeline = service.property_timeline(&tx, &view).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!((timeline[0].start, timeline[0].end), (t(0), Some(t(9))));
        assert_eq!(timeline[1].start, t(9));
        assert_eq!(timeline[1].end, None);
        assert_eq!(
            timeline[1].config.as_ref().map(|c| c.relation.as_str()),
            Some("urn:r2")
        );
    }

    #[test]
    fn manual_timeline_ends_with_head_state() {
        let store = MemoryResourceStore::new();
        let dc = id("dc");
        store.put(
            ResourceView::new(dc.clone(), ResourceKind::Container, t(0))
                .with_type(ldp::DIRECT_CONTAINER),
        );
        store.create_version(&dc, t(3)).unwrap();
        set_relation(&store, &dc, "urn:head", t(7));

        let service = service(&store, false);
        let view = store.get(&dc).unwrap();
        let timeline = service.property_timeline(&Transaction::new(), &view).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].start, t(0));
        assert_eq!(
            timeline[0].config.as_ref().map(|c| c.relation.as_str()),
            Some(ldp::MEMBER)
        );
        assert_eq!(timeline[1].start, t(7));
        assert_eq!(
            timeline[1].config.as_ref().map(|c| c.relation.as_str()),
            Some("urn:head")
        );
    }

    #[test]
    fn earliest_treats_none_as_unbounded() {
        assert_eq!(earliest(None, None), None);
        assert_eq!(earliest(Some(t(4)), None), Some(t(4)));
        assert_eq!(earliest(Some(t(4)), Some(t(2))), Some(t(2)));
    }
}

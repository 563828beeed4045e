//! `ldp:contains` triples for a resource

use ldpx_core::{ResourceId, Transaction, Triple};
use ldpx_index::ContainmentIndex;
use ldpx_vocab::ldp;

/// Renders containment index entries as `ldp:contains` triples
#[derive(Clone, Debug)]
pub struct ContainmentTriplesService {
    index: ContainmentIndex,
}

impl ContainmentTriplesService {
    pub fn new(index: ContainmentIndex) -> Self {
        Self { index }
    }

    /// `(resource, ldp:contains, child)` for every child of `id`
    ///
    /// A memento id lists the children at its instant and stays the subject.
    pub fn get(&self, tx: &Transaction, id: &ResourceId) -> Vec<Triple> {
        let resource = normalize(id);
        let subject = resource.full_id();
        self.index
            .get_contains(tx, &resource)
            .into_iter()
            .map(|child| Triple::iri(&subject, ldp::CONTAINS, child.full_id()))
            .collect()
    }

    /// `(parent, ldp:contains, resource)` for the parent of `id`, if any
    pub fn get_contained_by(&self, tx: &Transaction, id: &ResourceId) -> Vec<Triple> {
        let resource = normalize(id);
        self.index
            .get_contained_by(tx, &resource)
            .map(|parent| {
                Triple::iri(
                    parent.full_id(),
                    ldp::CONTAINS,
                    resource.as_base().full_id(),
                )
            })
            .into_iter()
            .collect()
    }
}

/// Companions answer for their base resource; mementos keep their instant
fn normalize(id: &ResourceId) -> ResourceId {
    if id.is_description() || id.is_acl() {
        id.as_base()
    } else {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ldpx_core::{Instant, ManualClock, Term};
    use std::sync::Arc;

    fn t(secs: i64) -> Instant {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn id(path: &str) -> ResourceId {
        ResourceId::parse(path).unwrap()
    }

    fn setup() -> (ContainmentTriplesService, ContainmentIndex, ManualClock) {
        let clock = ManualClock::new(t(0));
        let index = ContainmentIndex::new(Arc::new(clock.clone()));
        (ContainmentTriplesService::new(index.clone()), index, clock)
    }

    #[test]
    fn renders_children_of_description_as_base() {
        let (service, index, _clock) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("c"), &id("c/a")).unwrap();
        index.add_contained_by(&tx, &id("c"), &id("c/b")).unwrap();

        let triples = service.get(&tx, &id("c/~desc"));
        assert_eq!(
            triples,
            vec![
                Triple::iri(id("c").full_id(), ldp::CONTAINS, id("c/a").full_id()),
                Triple::iri(id("c").full_id(), ldp::CONTAINS, id("c/b").full_id()),
            ]
        );
        assert_eq!(triples[0].object, Term::iri(id("c/a").full_id()));
    }

    #[test]
    fn memento_lists_children_at_its_instant() {
        let (service, index, clock) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("c"), &id("c/a")).unwrap();
        tx.commit().unwrap();

        clock.set(t(10));
        let tx = Transaction::new();
        index.remove_contained_by(&tx, &id("c"), &id("c/a")).unwrap();
        tx.commit().unwrap();

        let reader = Transaction::read_only();
        assert!(service.get(&reader, &id("c")).is_empty());
        let memento = id("c").as_memento(t(5));
        assert_eq!(
            service.get(&reader, &memento),
            vec![Triple::iri(memento.full_id(), ldp::CONTAINS, id("c/a").full_id())]
        );
    }

    #[test]
    fn contained_by_renders_the_parent() {
        let (service, index, _clock) = setup();
        let tx = Transaction::new();
        index.add_contained_by(&tx, &id("c"), &id("c/a")).unwrap();

        assert_eq!(
            service.get_contained_by(&tx, &id("c/a/~desc")),
            vec![Triple::iri(id("c").full_id(), ldp::CONTAINS, id("c/a").full_id())]
        );
        assert!(service.get_contained_by(&tx, &id("c")).is_empty());
    }
}

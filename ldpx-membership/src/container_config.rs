//! Membership configuration of direct and indirect containers
//!
//! A container's configuration is read from its own triples:
//!
//! | property                       | default                          |
//! |--------------------------------|----------------------------------|
//! | `ldp:membershipResource`       | the container itself             |
//! | `ldp:hasMemberRelation`        | `ldp:member` (hasMember)         |
//! | `ldp:isMemberOfRelation`       | none; switches to isMemberOf     |
//! | `ldp:insertedContentRelation`  | `ldp:MemberSubject` (IDC only)   |
//!
//! More than one value for a property, both relation kinds at once, or a
//! literal where an IRI belongs make the configuration malformed.

use crate::error::{MembershipError, Result};
use ldpx_core::{Instant, ResourceId, ResourceView, Term};
use ldpx_index::MembershipEntry;
use ldpx_vocab::{ldp, repo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerType {
    Direct,
    Indirect,
}

/// Orientation of the generated membership triple
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipDirection {
    /// (membership resource, relation, member)
    HasMember,
    /// (member, relation, membership resource)
    IsMemberOf,
}

/// Effective membership configuration of a container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerConfig {
    pub container_type: ContainerType,
    pub membership_resource: String,
    pub relation: String,
    pub direction: MembershipDirection,
    /// Set for indirect containers only
    pub inserted_content_relation: Option<String>,
}

impl ContainerConfig {
    /// Membership target contributed by `member`
    ///
    /// For indirect containers the target is read from the member's
    /// inserted-content-relation property; a missing or literal value yields
    /// `None`.
    pub fn member_target(&self, member: &ResourceView) -> Option<String> {
        let icr = match (&self.container_type, &self.inserted_content_relation) {
            (ContainerType::Indirect, Some(icr)) if icr != ldp::MEMBER_SUBJECT => icr,
            _ => return Some(member.id().as_base().full_id()),
        };
        let mut values = member.values(icr);
        match values.next() {
            Some(Term::Iri(target)) => Some(target.clone()),
            _ => None,
        }
    }

    /// Subject, predicate and object for a membership target
    pub fn statement(&self, target: &str) -> (String, String, String) {
        match self.direction {
            MembershipDirection::HasMember => (
                self.membership_resource.clone(),
                self.relation.clone(),
                target.to_string(),
            ),
            MembershipDirection::IsMemberOf => (
                target.to_string(),
                self.relation.clone(),
                self.membership_resource.clone(),
            ),
        }
    }

    /// Open membership row produced by `member` of `source`
    pub fn entry(
        &self,
        source: &ResourceId,
        member: &ResourceId,
        target: &str,
        start: Instant,
    ) -> MembershipEntry {
        let (s, p, o) = self.statement(target);
        MembershipEntry::new(s, p, o, source.clone(), member.clone(), start)
    }
}

/// Container type declared by a resource, if any
pub fn container_type(view: &ResourceView) -> Option<ContainerType> {
    if !view.is_container() {
        return None;
    }
    if view.has_type(ldp::INDIRECT_CONTAINER) {
        Some(ContainerType::Indirect)
    } else if view.has_type(ldp::DIRECT_CONTAINER) {
        Some(ContainerType::Direct)
    } else {
        None
    }
}

/// Resolve the membership configuration of a container
///
/// Returns `Ok(None)` for resources that are not direct or indirect
/// containers and `Err(MembershipError::Config)` for malformed ones.
pub fn resolve(view: &ResourceView) -> Result<Option<ContainerConfig>> {
    let Some(container_type) = container_type(view) else {
        return Ok(None);
    };
    let container = view.id().as_base();

    let membership_resource = match single_iri(view, ldp::MEMBERSHIP_RESOURCE)? {
        Some(iri) => normalize_membership_resource(&iri),
        None => container.full_id(),
    };

    let has_member = single_iri(view, ldp::HAS_MEMBER_RELATION)?;
    let is_member_of = single_iri(view, ldp::IS_MEMBER_OF_RELATION)?;
    let (relation, direction) = match (has_member, is_member_of) {
        (Some(_), Some(_)) => {
            return Err(MembershipError::config(
                container.full_id(),
                "both hasMemberRelation and isMemberOfRelation are set",
            ))
        }
        (None, Some(rel)) => (rel, MembershipDirection::IsMemberOf),
        (Some(rel), None) => (rel, MembershipDirection::HasMember),
        (None, None) => (ldp::MEMBER.to_string(), MembershipDirection::HasMember),
    };

    let inserted_content_relation = match container_type {
        ContainerType::Indirect => Some(
            single_iri(view, ldp::INSERTED_CONTENT_RELATION)?
                .unwrap_or_else(|| ldp::MEMBER_SUBJECT.to_string()),
        ),
        ContainerType::Direct => None,
    };

    Ok(Some(ContainerConfig {
        container_type,
        membership_resource,
        relation,
        direction,
        inserted_content_relation,
    }))
}

/// At most one IRI value for `predicate`
fn single_iri(view: &ResourceView, predicate: &str) -> Result<Option<String>> {
    let mut found: Option<String> = None;
    for value in view.values(predicate) {
        let iri = value.as_iri().ok_or_else(|| {
            MembershipError::config(
                view.id().full_id(),
                format!("{predicate} must be an IRI, found {value}"),
            )
        })?;
        match &found {
            Some(existing) if existing != iri => {
                return Err(MembershipError::config(
                    view.id().full_id(),
                    format!("multiple values for {predicate}"),
                ))
            }
            _ => found = Some(iri.to_string()),
        }
    }
    Ok(found)
}

/// Repository ids are reduced to their base; other IRIs pass through
fn normalize_membership_resource(iri: &str) -> String {
    if iri.starts_with(repo::PREFIX) {
        if let Ok(id) = ResourceId::parse(iri) {
            return id.as_base().full_id();
        }
    }
    iri.to_string()
}

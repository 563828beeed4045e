//! Repository resource identifiers
//!
//! A `ResourceId` is one of four variants sharing a base IRI:
//! - `Base`: the live resource (`info:ldpx/a/b`)
//! - `Description`: RDF companion of a binary (`info:ldpx/a/b/~desc`)
//! - `Acl`: access-control companion (`info:ldpx/a/b/~acl`)
//! - `Memento`: the resource at an instant (`info:ldpx/a/b/~versions/20240101120000`)
//!
//! A description memento (`.../~desc/~versions/<label>`) addresses the same
//! point in time as the binary's memento and parses to `Memento`.
//!
//! ## Ordering
//!
//! Ids order by base IRI first, then variant, then instant, so sorted result
//! sets group companions next to their resource.

use crate::error::{Error, Result};
use crate::Instant;
use chrono::{NaiveDateTime, SubsecRound, TimeZone, Utc};
use ldpx_vocab::repo::{
    ACL_SEGMENT, DESCRIPTION_SEGMENT, MEMENTO_LABEL_FORMAT, PREFIX, VERSIONS_SEGMENT,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Repository-wide resource identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Base(Arc<str>),
    Description(Arc<str>),
    Acl(Arc<str>),
    /// Base IRI plus the memento instant (second precision)
    Memento(Arc<str>, Instant),
}

impl ResourceId {
    /// The repository root
    pub fn root() -> Self {
        ResourceId::Base(Arc::from(PREFIX))
    }

    /// Parse an identifier from its textual form
    ///
    /// Ids without the repository prefix are treated as paths below the root.
    /// Trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::invalid_id("empty identifier"));
        }

        let path = if trimmed == PREFIX {
            ""
        } else if let Some(rest) = trimmed.strip_prefix(PREFIX) {
            rest.strip_prefix('/')
                .ok_or_else(|| Error::invalid_id(format!("unknown prefix in {raw}")))?
        } else {
            trimmed.trim_start_matches('/')
        };

        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_id(format!("empty path segment in {raw}")));
        }

        let split = segments
            .iter()
            .position(|s| is_reserved(s))
            .unwrap_or(segments.len());
        let (base_segments, tail) = segments.split_at(split);
        let base: Arc<str> = if base_segments.is_empty() {
            Arc::from(PREFIX)
        } else {
            Arc::from(format!("{PREFIX}/{}", base_segments.join("/")))
        };

        if tail.is_empty() {
            return Ok(ResourceId::Base(base));
        }
        if base_segments.is_empty() {
            return Err(Error::invalid_id(format!(
                "the root has no companions or versions: {raw}"
            )));
        }

        match tail {
            [d] if *d == DESCRIPTION_SEGMENT => Ok(ResourceId::Description(base)),
            [a] if *a == ACL_SEGMENT => Ok(ResourceId::Acl(base)),
            [v, label] if *v == VERSIONS_SEGMENT => {
                Ok(ResourceId::Memento(base, parse_label(label)?))
            }
            [d, v, label] if *d == DESCRIPTION_SEGMENT && *v == VERSIONS_SEGMENT => {
                Ok(ResourceId::Memento(base, parse_label(label)?))
            }
            _ => Err(Error::invalid_id(format!("unsupported suffix in {raw}"))),
        }
    }

    /// Base IRI shared by every variant
    pub fn base_iri(&self) -> &str {
        match self {
            ResourceId::Base(b)
            | ResourceId::Description(b)
            | ResourceId::Acl(b)
            | ResourceId::Memento(b, _) => b,
        }
    }

    /// Full textual form of this id
    pub fn full_id(&self) -> String {
        match self {
            ResourceId::Base(b) => b.to_string(),
            ResourceId::Description(b) => format!("{b}/{DESCRIPTION_SEGMENT}"),
            ResourceId::Acl(b) => format!("{b}/{ACL_SEGMENT}"),
            ResourceId::Memento(b, at) => format!(
                "{b}/{VERSIONS_SEGMENT}/{}",
                at.format(MEMENTO_LABEL_FORMAT)
            ),
        }
    }

    /// The live resource this id refers to
    pub fn as_base(&self) -> ResourceId {
        match self {
            ResourceId::Base(_) => self.clone(),
            ResourceId::Description(b) | ResourceId::Acl(b) | ResourceId::Memento(b, _) => {
                ResourceId::Base(b.clone())
            }
        }
    }

    /// Memento of this resource at `at`, truncated to whole seconds
    pub fn as_memento(&self, at: Instant) -> ResourceId {
        ResourceId::Memento(self.base_arc(), at.trunc_subsecs(0))
    }

    /// Description companion of this resource
    pub fn as_description(&self) -> Result<ResourceId> {
        if self.is_root() {
            return Err(Error::invalid_id("the root has no description"));
        }
        Ok(ResourceId::Description(self.base_arc()))
    }

    /// Access-control companion of this resource
    pub fn as_acl(&self) -> Result<ResourceId> {
        if self.is_root() {
            return Err(Error::invalid_id("the root has no acl"));
        }
        Ok(ResourceId::Acl(self.base_arc()))
    }

    /// Direct child of this resource named `name`
    pub fn resolve(&self, name: &str) -> Result<ResourceId> {
        let name = name.trim_matches('/');
        if name.is_empty() || name.split('/').any(|s| s.is_empty() || is_reserved(s)) {
            return Err(Error::invalid_id(format!("invalid child name {name:?}")));
        }
        Ok(ResourceId::Base(Arc::from(format!(
            "{}/{name}",
            self.base_iri()
        ))))
    }

    /// Resource one path segment up, `None` for the root
    pub fn path_parent(&self) -> Option<ResourceId> {
        if self.is_root() {
            return None;
        }
        let base = self.base_iri();
        base.rfind('/')
            .map(|idx| ResourceId::Base(Arc::from(&base[..idx])))
    }

    /// Instant carried by a memento id
    pub fn memento_instant(&self) -> Option<Instant> {
        match self {
            ResourceId::Memento(_, at) => Some(*at),
            _ => None,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, ResourceId::Base(_))
    }

    pub fn is_description(&self) -> bool {
        matches!(self, ResourceId::Description(_))
    }

    pub fn is_acl(&self) -> bool {
        matches!(self, ResourceId::Acl(_))
    }

    pub fn is_memento(&self) -> bool {
        matches!(self, ResourceId::Memento(..))
    }

    /// True for the repository root (base form only)
    pub fn is_root(&self) -> bool {
        self.base_iri() == PREFIX
    }

    fn base_arc(&self) -> Arc<str> {
        match self {
            ResourceId::Base(b)
            | ResourceId::Description(b)
            | ResourceId::Acl(b)
            | ResourceId::Memento(b, _) => b.clone(),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            ResourceId::Base(_) => 0,
            ResourceId::Description(_) => 1,
            ResourceId::Acl(_) => 2,
            ResourceId::Memento(..) => 3,
        }
    }
}

fn is_reserved(segment: &str) -> bool {
    segment == DESCRIPTION_SEGMENT || segment == ACL_SEGMENT || segment == VERSIONS_SEGMENT
}

fn parse_label(label: &str) -> Result<Instant> {
    let naive = NaiveDateTime::parse_from_str(label, MEMENTO_LABEL_FORMAT)
        .map_err(|e| Error::invalid_id(format!("bad memento label {label:?}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base_iri()
            .cmp(other.base_iri())
            .then_with(|| self.variant_rank().cmp(&other.variant_rank()))
            .then_with(|| self.memento_instant().cmp(&other.memento_instant()))
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_id())
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full_id())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ResourceId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

//! RDF and LDP vocabulary constants for ldpx
//!
//! Constants are organized by vocabulary:
//! - `rdf` - RDF vocabulary (http://www.w3.org/1999/02/22-rdf-syntax-ns#)
//! - `ldp` - Linked Data Platform vocabulary (http://www.w3.org/ns/ldp#)
//! - `repo` - repository identifier layout (prefix and reserved path segments)

/// RDF vocabulary constants
pub mod rdf {
    /// rdf:type IRI
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// Linked Data Platform vocabulary constants
pub mod ldp {
    /// LDP namespace
    pub const NS: &str = "http://www.w3.org/ns/ldp#";

    /// ldp:Resource
    pub const RESOURCE: &str = "http://www.w3.org/ns/ldp#Resource";

    /// ldp:RDFSource
    pub const RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#RDFSource";

    /// ldp:NonRDFSource (binaries)
    pub const NON_RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#NonRDFSource";

    /// ldp:Container
    pub const CONTAINER: &str = "http://www.w3.org/ns/ldp#Container";

    /// ldp:BasicContainer
    pub const BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";

    /// ldp:DirectContainer
    pub const DIRECT_CONTAINER: &str = "http://www.w3.org/ns/ldp#DirectContainer";

    /// ldp:IndirectContainer
    pub const INDIRECT_CONTAINER: &str = "http://www.w3.org/ns/ldp#IndirectContainer";

    /// ldp:contains (containment predicate)
    pub const CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

    /// ldp:member (default membership relation)
    pub const MEMBER: &str = "http://www.w3.org/ns/ldp#member";

    /// ldp:membershipResource
    pub const MEMBERSHIP_RESOURCE: &str = "http://www.w3.org/ns/ldp#membershipResource";

    /// ldp:hasMemberRelation
    pub const HAS_MEMBER_RELATION: &str = "http://www.w3.org/ns/ldp#hasMemberRelation";

    /// ldp:isMemberOfRelation
    pub const IS_MEMBER_OF_RELATION: &str = "http://www.w3.org/ns/ldp#isMemberOfRelation";

    /// ldp:insertedContentRelation
    pub const INSERTED_CONTENT_RELATION: &str =
        "http://www.w3.org/ns/ldp#insertedContentRelation";

    /// ldp:MemberSubject, the inserted content relation meaning "the member itself"
    pub const MEMBER_SUBJECT: &str = "http://www.w3.org/ns/ldp#MemberSubject";
}

/// Repository identifier layout
///
/// Every resource id is `PREFIX` followed by a slash-separated path. Companion
/// resources and versions hang off reserved segments that never collide with
/// user path segments.
pub mod repo {
    /// Root identifier; every other id starts with `PREFIX/`
    pub const PREFIX: &str = "info:ldpx";

    /// Segment addressing the description of a binary
    pub const DESCRIPTION_SEGMENT: &str = "~desc";

    /// Segment addressing the access-control companion of a resource
    pub const ACL_SEGMENT: &str = "~acl";

    /// Segment introducing a version (memento) label
    pub const VERSIONS_SEGMENT: &str = "~versions";

    /// chrono format of a memento label, always UTC with second precision
    pub const MEMENTO_LABEL_FORMAT: &str = "%Y%m%d%H%M%S";
}

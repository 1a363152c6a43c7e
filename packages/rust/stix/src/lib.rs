//! STIX 2.1 object model and object builders for stixgraph.
//!
//! - [`StixId`]: validated `<type>--<uuid>` identifiers
//! - [`StixObject`] and its variants, [`Bundle`]
//! - Builders: indicators ([`indicator`]), generic domain objects ([`sdo`]),
//!   relationships ([`relationship`]), and the pipeline's identities ([`identity`])
//!
//! Every builder is a pure function of its inputs and a [`Stamp`].

pub mod bundle;
pub mod id;
pub mod identity;
pub mod indicator;
pub mod object;
pub mod relationship;
pub mod sdo;
pub mod text;

pub use bundle::{Bundle, DanglingRef, EnrichmentSummary};
pub use id::StixId;
pub use indicator::{IndicatorKind, IndicatorRejection, ValidatedIndicator};
pub use object::{
    CommonProperties, DomainObject, ExternalReference, Identity, IdentityClass, Indicator, Note,
    Relationship, Report, SPEC_VERSION, Stamp, StixObject,
};
pub use relationship::RelationshipKey;

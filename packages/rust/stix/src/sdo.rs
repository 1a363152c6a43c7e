//! Domain objects built from extraction candidates.

use serde_json::{Map, Value};

use stixgraph_shared::{CandidateObject, Result, StixGraphError};

use crate::id::{StixId, is_valid_type};
use crate::object::{CommonProperties, DomainObject, Identity, IdentityClass, Stamp, StixObject};
use crate::text::truncate_chars;

const MAX_NAME_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Domain object types that may be built from candidates, besides custom `x-` types.
pub const SUPPORTED_TYPES: &[&str] = &[
    "attack-pattern",
    "campaign",
    "course-of-action",
    "identity",
    "infrastructure",
    "intrusion-set",
    "malware",
    "threat-actor",
    "tool",
    "vulnerability",
];

/// Whether candidates of `stix_type` may become objects.
pub fn is_supported_type(stix_type: &str) -> bool {
    SUPPORTED_TYPES.contains(&stix_type) || (stix_type.starts_with("x-") && is_valid_type(stix_type))
}

/// Build the object for one candidate.
///
/// The caller filters out candidates with an empty or unsupported type and
/// an empty name.
pub fn build_domain_object(candidate: &CandidateObject, stamp: &Stamp) -> Result<StixObject> {
    if candidate.stix_type.is_empty() || candidate.name.is_empty() {
        return Err(StixGraphError::validation(
            "domain object candidate needs a type and a name",
        ));
    }

    let mut common = CommonProperties::new(StixId::new(&candidate.stix_type)?, stamp);
    common.confidence = candidate.confidence;
    let name = truncate_chars(&candidate.name, MAX_NAME_CHARS);
    let description = (!candidate.description.is_empty())
        .then(|| truncate_chars(&candidate.description, MAX_DESCRIPTION_CHARS));

    if candidate.stix_type == "identity" {
        let class =
            IdentityClass::parse(&candidate.identity_class).unwrap_or(IdentityClass::Organization);
        return Ok(StixObject::Identity(Identity {
            common,
            name,
            identity_class: Some(class),
            description,
            extra: Map::new(),
        }));
    }

    let mut extra = Map::new();
    if candidate.stix_type == "malware" {
        extra.insert("is_family".into(), Value::Bool(true));
    }

    Ok(StixObject::Domain(DomainObject {
        common,
        name: Some(name),
        description,
        extra,
    }))
}

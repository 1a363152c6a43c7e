//! Relationship construction and the dedup key shared by every edge producer.

use serde_json::Map;

use crate::id::StixId;
use crate::object::{CommonProperties, Relationship, Stamp};

/// Default relationship type when a candidate does not name one.
pub const RELATED_TO: &str = "related-to";
/// Report → Author attribution edge.
pub const CREATED_BY: &str = "created-by";

/// Identity of an edge for dedup: `(source, type, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipKey {
    pub source: StixId,
    pub relationship_type: String,
    pub target: StixId,
}

impl RelationshipKey {
    pub fn new(source: &StixId, relationship_type: &str, target: &StixId) -> Self {
        Self {
            source: source.clone(),
            relationship_type: relationship_type.to_string(),
            target: target.clone(),
        }
    }

    pub fn of(relationship: &Relationship) -> Self {
        Self::new(
            &relationship.source_ref,
            &relationship.relationship_type,
            &relationship.target_ref,
        )
    }
}

/// Build an edge between two already-registered objects.
///
/// An empty `relationship_type` becomes `related-to`. Dedup is the caller's job.
pub fn build_relationship(
    relationship_type: &str,
    source: &StixId,
    target: &StixId,
    confidence: Option<u8>,
    stamp: &Stamp,
) -> Relationship {
    let relationship_type = match relationship_type.trim() {
        "" => RELATED_TO,
        t => t,
    };
    let mut common = CommonProperties::new(StixId::generate("relationship"), stamp);
    common.confidence = confidence;

    Relationship {
        common,
        relationship_type: relationship_type.to_string(),
        source_ref: source.clone(),
        target_ref: target.clone(),
        description: None,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_defaults_and_key() {
        let stamp = Stamp::now();
        let src = StixId::new("malware").unwrap();
        let tgt = StixId::new("identity").unwrap();

        let rel = build_relationship("  ", &src, &tgt, Some(40), &stamp);
        assert_eq!(rel.relationship_type, "related-to");
        assert_eq!(rel.common.object_type, "relationship");
        assert_eq!(rel.common.confidence, Some(40));

        assert_eq!(RelationshipKey::of(&rel), RelationshipKey::new(&src, RELATED_TO, &tgt));
        assert_ne!(
            RelationshipKey::of(&rel),
            RelationshipKey::new(&tgt, RELATED_TO, &src)
        );
    }
}

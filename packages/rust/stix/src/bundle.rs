//! The STIX Bundle container.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stixgraph_shared::{Result, StixGraphError};

use crate::id::StixId;
use crate::object::{SPEC_VERSION, StixObject};

fn bundle_type() -> String {
    "bundle".into()
}

fn default_spec_version() -> String {
    SPEC_VERSION.into()
}

/// Counts recorded on a bundle by the last enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSummary {
    pub stage: String,
    pub changed_reports: usize,
    pub added_identities: usize,
    pub added_relationships: usize,
    pub updated_notes: usize,
}

/// A reference to an id that no object in the bundle carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    pub from: StixId,
    pub missing: StixId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "type", default = "bundle_type")]
    pub bundle_type: String,
    pub id: StixId,
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    #[serde(default)]
    pub objects: Vec<StixObject>,
    /// First enrichment time, kept verbatim once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_enriched_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_enrichment: Option<EnrichmentSummary>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    pub fn new(objects: Vec<StixObject>) -> Self {
        Self {
            bundle_type: bundle_type(),
            id: StixId::generate("bundle"),
            spec_version: default_spec_version(),
            objects,
            x_enriched_at: None,
            x_enrichment: None,
            extra: Map::new(),
        }
    }

    /// Parse a bundle document, rejecting anything that is not a bundle.
    pub fn from_json(text: &str) -> Result<Self> {
        let bundle: Self = serde_json::from_str(text)
            .map_err(|e| StixGraphError::parse(format!("invalid bundle: {e}")))?;
        if bundle.bundle_type != "bundle" || bundle.id.object_type() != "bundle" {
            return Err(StixGraphError::parse(format!(
                "invalid bundle: type '{}', id '{}'",
                bundle.bundle_type, bundle.id
            )));
        }
        Ok(bundle)
    }

    /// Position of every object by id.
    pub fn index(&self) -> HashMap<&StixId, usize> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, obj)| (obj.id(), i))
            .collect()
    }

    pub fn get(&self, id: &StixId) -> Option<&StixObject> {
        self.objects.iter().find(|obj| obj.id() == id)
    }

    /// Every reference that does not resolve to an object in the bundle.
    pub fn dangling_refs(&self) -> Vec<DanglingRef> {
        let index = self.index();
        self.objects
            .iter()
            .flat_map(|obj| {
                obj.references()
                    .into_iter()
                    .filter(|r| !index.contains_key(r))
                    .map(|r| DanglingRef {
                        from: obj.id().clone(),
                        missing: r.clone(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Note, Report, Stamp};

    #[test]
    fn dangling_refs_are_reported() {
        let stamp = Stamp::now();
        let mut report = Report::new("X", stamp.created, &stamp);
        let note = Note::new("author: Unknown", vec![report.common.id.clone()], &stamp);
        report.add_ref(&note.common.id);
        let ghost = StixId::new("malware").unwrap();
        report.add_ref(&ghost);
        let report_id = report.common.id.clone();

        let bundle = Bundle::new(vec![report.into(), note.into()]);
        assert_eq!(
            bundle.dangling_refs(),
            vec![DanglingRef {
                from: report_id,
                missing: ghost
            }]
        );
    }

    #[test]
    fn bundle_roundtrip_keeps_custom_properties() {
        let raw = r#"{
            "type": "bundle",
            "id": "bundle--0b9f8ad6-5b67-4b1e-9c43-0d4d7a3e8c11",
            "spec_version": "2.1",
            "objects": [],
            "x_enriched_at": "2025-01-06T10:00:00Z",
            "x_enrichment": {"stage": "enrich_authors", "changed_reports": 1,
                "added_identities": 2, "added_relationships": 4, "updated_notes": 1},
            "x_source_pipeline": "rss"
        }"#;
        let bundle = Bundle::from_json(raw).unwrap();
        assert_eq!(bundle.x_enrichment.as_ref().map(|s| s.added_identities), Some(2));
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["x_source_pipeline"], "rss");
        assert_eq!(json["x_enriched_at"], "2025-01-06T10:00:00Z");
    }

    #[test]
    fn non_bundle_documents_are_rejected() {
        assert!(Bundle::from_json(r#"{"items": []}"#).is_err());
        let wrong_type = r#"{"type": "report", "id": "report--0b9f8ad6-5b67-4b1e-9c43-0d4d7a3e8c11"}"#;
        assert!(Bundle::from_json(wrong_type).is_err());
        assert!(Bundle::from_json("[").is_err());
    }
}

//! Build manifest: the audit trail written next to every bundle.
//!
//! One [`ReportEntry`] per article that produced a Report, one
//! [`SkippedArticle`] per article that did not, and per-field rejections
//! (indicators, objects, relationships) kept on the report entry so review can
//! see what was dropped and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest reason for indicators that fail kind or syntax checks.
pub const REASON_INVALID_INDICATOR: &str = "invalid_or_not_allowed_for_indicator";
/// Manifest reason for candidate objects with an empty type or name.
pub const REASON_MISSING_TYPE_OR_NAME: &str = "missing_type_or_name";
/// Manifest reason for candidate objects of a type that is never built from candidates.
pub const REASON_UNSUPPORTED_TYPE: &str = "unsupported_stix_type";
/// Manifest reason for relationships missing an endpoint name or type.
pub const REASON_MISSING_ENDPOINT: &str = "missing_endpoint";
/// Manifest reason for relationships whose endpoint is not an object of the same article.
pub const REASON_UNRESOLVED_ENDPOINT: &str = "unresolved_endpoint";
/// Manifest reason for relationships already emitted in this run.
pub const REASON_DUPLICATE: &str = "duplicate";

/// Top-level manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub generated_at: DateTime<Utc>,
    pub input_extracted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cleaned: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_included: Option<String>,
    /// Article cutoff applied to this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub reports: Vec<ReportEntry>,
    pub skipped: Vec<SkippedArticle>,
}

impl BuildManifest {
    /// Empty manifest for a run started at `generated_at`.
    pub fn new(generated_at: DateTime<Utc>, input_extracted: impl Into<String>) -> Self {
        Self {
            generated_at,
            input_extracted: input_extracted.into(),
            input_cleaned: None,
            input_included: None,
            limit: None,
            reports: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// An article that produced a Report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(rename = "_row_num")]
    pub row_num: Option<u64>,
    pub title: String,
    pub url: String,
    pub report_id: String,
    pub publisher: String,
    pub authors: Vec<String>,
    pub object_refs_count: usize,
    pub has_clean_text: bool,
    pub has_raw_ref: bool,
    pub skipped_indicators: Vec<SkippedIndicator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_objects: Vec<SkippedObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_relationships: Vec<SkippedRelationship>,
}

/// An article that did not produce a Report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedArticle {
    #[serde(rename = "_row_num")]
    pub row_num: Option<u64>,
    pub title: String,
    pub url: String,
    pub retrieval_status: String,
    pub extraction_status: String,
    pub reason: String,
    /// Per-field rejections of an article that still produced nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_indicators: Vec<SkippedIndicator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_objects: Vec<SkippedObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_relationships: Vec<SkippedRelationship>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedIndicator {
    pub indicator_type: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedObject {
    pub stix_type: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRelationship {
    pub source_name: String,
    pub relationship_type: String,
    pub target_name: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_serialization_shape() {
        let mut manifest = BuildManifest::new(Utc::now(), "data/extracted_stix.json");
        manifest.reports.push(ReportEntry {
            row_num: Some(12),
            title: "X Ransomware Hits Y Corp".into(),
            url: "https://ex.com/a".into(),
            report_id: "report--0b9f8ad6-5b67-4b1e-9c43-0d4d7a3e8c11".into(),
            publisher: "Unknown Publisher".into(),
            authors: vec![],
            object_refs_count: 3,
            has_clean_text: false,
            has_raw_ref: false,
            skipped_indicators: vec![SkippedIndicator {
                indicator_type: "other".into(),
                value: "bogus".into(),
                reason: REASON_INVALID_INDICATOR.into(),
            }],
            skipped_objects: vec![],
            skipped_relationships: vec![],
        });

        let json = serde_json::to_value(&manifest).expect("serialize");
        assert_eq!(json["reports"][0]["_row_num"], 12);
        assert_eq!(
            json["reports"][0]["skipped_indicators"][0]["reason"],
            "invalid_or_not_allowed_for_indicator"
        );
        assert!(json["reports"][0].get("skipped_objects").is_none());
        assert!(json.get("input_cleaned").is_none());

        let parsed: BuildManifest = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.reports.len(), 1);
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn skipped_article_keeps_rejections() {
        let mut skipped = SkippedArticle {
            row_num: Some(4),
            title: "t".into(),
            url: "https://ex.com/d".into(),
            retrieval_status: "ok".into(),
            extraction_status: "ok".into(),
            reason: "skip: no objects/indicators/relationships".into(),
            skipped_indicators: vec![],
            skipped_objects: vec![],
            skipped_relationships: vec![],
        };
        let bare = serde_json::to_value(&skipped).expect("serialize");
        assert!(bare.get("skipped_indicators").is_none());

        skipped.skipped_indicators.push(SkippedIndicator {
            indicator_type: "ip".into(),
            value: "999.1.1.1".into(),
            reason: REASON_INVALID_INDICATOR.into(),
        });
        let json = serde_json::to_value(&skipped).expect("serialize");
        assert_eq!(json["skipped_indicators"][0]["value"], "999.1.1.1");

        let parsed: SkippedArticle = serde_json::from_value(bare).expect("deserialize");
        assert!(parsed.skipped_relationships.is_empty());
    }
}

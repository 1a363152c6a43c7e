//! Input record types for the stage documents the bundle builder consumes.
//!
//! Upstream stages are LLM-driven and loosely typed, so every field is
//! normalized here, once, at deserialization: strings are trimmed (null becomes
//! empty), type tokens are lower-cased, confidences are clamped to 0–100, and
//! candidate lists drop entries that are not JSON objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Result, StixGraphError};

// ---------------------------------------------------------------------------
// Extraction result (`extracted_stix.json`)
// ---------------------------------------------------------------------------

/// The extraction result document.
///
/// Items stay as raw JSON until [`ExtractionDoc::parse_item`] so that one
/// malformed item never rejects the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionDoc {
    #[serde(default)]
    pub items: Vec<Value>,
}

impl ExtractionDoc {
    /// Parse a single raw item into an [`ExtractedItem`].
    pub fn parse_item(value: &Value) -> Result<ExtractedItem> {
        if !value.is_object() {
            return Err(StixGraphError::parse("invalid record: item is not an object"));
        }
        ExtractedItem::deserialize(value)
            .map_err(|e| StixGraphError::parse(format!("invalid record: {e}")))
    }

    /// Best-effort row number of a raw item, for reporting items that fail to parse.
    pub fn raw_row_num(value: &Value) -> Option<u64> {
        value.get("_row_num").cloned().and_then(value_to_u64)
    }
}

/// One article's extraction result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedItem {
    #[serde(rename = "_row_num", default, deserialize_with = "lenient_u64")]
    pub row_num: Option<u64>,
    #[serde(default, deserialize_with = "trimmed")]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub url: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub retrieval_status: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub extraction_status: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub objects: Vec<CandidateObject>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub indicators: Vec<CandidateIndicator>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub relationships: Vec<CandidateRelationship>,
    #[serde(default, deserialize_with = "trimmed")]
    pub notes: String,
    /// Publisher hint carried through by the extraction stage.
    #[serde(default, deserialize_with = "trimmed")]
    pub source: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient_author")]
    pub author: Option<AuthorField>,
}

impl ExtractedItem {
    /// Both upstream stages (retrieval and extraction) reported success.
    pub fn is_ok(&self) -> bool {
        self.retrieval_status == "ok" && self.extraction_status == "ok"
    }

    /// Publisher name carried by the item (`source`, falling back to `publisher`).
    pub fn publisher_hint(&self) -> &str {
        first_non_empty(&self.source, &self.publisher)
    }
}

/// A candidate STIX Domain Object proposed by the extraction stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateObject {
    #[serde(default, deserialize_with = "lowercased")]
    pub stix_type: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<u8>,
    /// Only meaningful for `identity` candidates.
    #[serde(default, deserialize_with = "lowercased")]
    pub identity_class: String,
}

/// A candidate indicator of compromise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateIndicator {
    #[serde(default, deserialize_with = "lowercased")]
    pub indicator_type: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub value: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub context: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<u8>,
}

/// A candidate relationship, with endpoints named by `(stix_type, name)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateRelationship {
    #[serde(default, deserialize_with = "trimmed")]
    pub source_name: String,
    #[serde(default, deserialize_with = "lowercased")]
    pub source_stix_type: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub target_name: String,
    #[serde(default, deserialize_with = "lowercased")]
    pub target_stix_type: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub relationship_type: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<u8>,
}

// ---------------------------------------------------------------------------
// Cleaned-text side table (`articles_cleaned.json`)
// ---------------------------------------------------------------------------

/// The cleaned-text side table, joined to extraction items by URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanedDoc {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub items: Vec<CleanedItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanedItem {
    #[serde(default, deserialize_with = "trimmed")]
    pub url: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub focus_summary: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub clean_text: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub clean_sha256: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub raw_saved_path: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub raw_sha256: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub raw_char_len: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub raw_truncated: bool,
    #[serde(default, deserialize_with = "trimmed")]
    pub source: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient_author")]
    pub author: Option<AuthorField>,
}

impl CleanedItem {
    /// Publisher name carried by the item (`source`, falling back to `publisher`).
    pub fn publisher_hint(&self) -> &str {
        first_non_empty(&self.source, &self.publisher)
    }
}

// ---------------------------------------------------------------------------
// Included-rows side table (`input_included.json`)
// ---------------------------------------------------------------------------

/// Curated spreadsheet rows that were marked for inclusion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncludedDoc {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub rows: Vec<IncludedRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncludedRow {
    #[serde(default, deserialize_with = "trimmed")]
    pub url: String,
    #[serde(rename = "_row_num", default, deserialize_with = "lenient_u64")]
    pub row_num: Option<u64>,
    #[serde(default, deserialize_with = "trimmed")]
    pub source: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient_author")]
    pub author: Option<AuthorField>,
    #[serde(default, deserialize_with = "trimmed")]
    pub published: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub category_main: String,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Option<TagsField>,
}

impl IncludedRow {
    /// Publisher name from the curated sheet (`source`, falling back to `publisher`).
    pub fn publisher_hint(&self) -> &str {
        first_non_empty(&self.source, &self.publisher)
    }
}

fn first_non_empty<'a>(primary: &'a str, fallback: &'a str) -> &'a str {
    if primary.is_empty() { fallback } else { primary }
}

// ---------------------------------------------------------------------------
// Loosely-shaped fields
// ---------------------------------------------------------------------------

/// An author field as found upstream: one (possibly delimiter-joined) string,
/// or an already-structured list of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorField {
    Text(String),
    List(Vec<String>),
}

/// Tags as found in the curated sheet: a list, or a string that is either a
/// JSON list or comma-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagsField {
    Text(String),
    List(Vec<String>),
}

impl TagsField {
    /// Flatten into trimmed, non-empty tag strings.
    pub fn to_vec(&self) -> Vec<String> {
        let items: Vec<String> = match self {
            Self::List(items) => items.clone(),
            Self::Text(text) if text.starts_with('[') && text.ends_with(']') => {
                match serde_json::from_str::<Vec<Value>>(text) {
                    Ok(items) => items.into_iter().map(value_to_text).collect(),
                    Err(_) => text.split(',').map(str::to_string).collect(),
                }
            }
            Self::Text(text) => text.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Lenient deserializers
// ---------------------------------------------------------------------------

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string().trim().to_string(),
    }
}

fn value_to_u64(value: Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn trimmed<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?))
}

fn lowercased<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?).to_lowercase())
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    Ok(value_to_u64(Value::deserialize(d)?))
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    Ok(value_to_u64(Value::deserialize(d)?).unwrap_or(0))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        _ => false,
    })
}

/// STIX confidence is an integer in 0–100; zero or garbage means "not stated".
fn lenient_confidence<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<u8>, D::Error> {
    let raw = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|f| f.is_finite() && *f >= 1.0)
        .map(|f| f.round().min(100.0) as u8))
}

fn lenient_author<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<AuthorField>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::Array(items) => Some(AuthorField::List(
            items.into_iter().map(value_to_text).collect(),
        )),
        other => {
            let text = value_to_text(other);
            (!text.is_empty()).then_some(AuthorField::Text(text))
        }
    })
}

fn lenient_tags<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<TagsField>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::Array(items) => Some(TagsField::List(
            items.into_iter().map(value_to_text).collect(),
        )),
        other => {
            let text = value_to_text(other);
            (!text.is_empty()).then_some(TagsField::Text(text))
        }
    })
}

/// Accept a list of records, dropping entries that do not parse.
/// A non-list value is treated as an empty list.
fn lenient_vec<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(entries) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed record");
                None
            }
        })
        .collect())
}

//! STIX 2.1 objects.
//!
//! Each variant keeps unrecognised properties in an `extra` map so a bundle
//! read from disk and written back loses nothing (custom `x_` properties,
//! `labels` on foreign objects, extensions, …).

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::id::StixId;

/// The only STIX version this crate reads or writes.
pub const SPEC_VERSION: &str = "2.1";

/// Report type assigned to every article Report.
pub const THREAT_REPORT: &str = "threat-report";

fn default_spec_version() -> String {
    SPEC_VERSION.into()
}

// ---------------------------------------------------------------------------
// Stamp
// ---------------------------------------------------------------------------

/// Timestamps and attribution applied to objects built in one run.
///
/// `created`/`modified` are fixed once per run and never touched afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub created_by_ref: Option<StixId>,
}

impl Stamp {
    /// A stamp at `at`, truncated to whole seconds, with no creator.
    pub fn at(at: DateTime<Utc>) -> Self {
        let ts = at.trunc_subsecs(0);
        Self {
            created: ts,
            modified: ts,
            created_by_ref: None,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// The same timestamps, attributed to `creator`.
    pub fn by(&self, creator: &StixId) -> Self {
        Self {
            created_by_ref: Some(creator.clone()),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Common properties
// ---------------------------------------------------------------------------

/// Properties shared by every STIX object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonProperties {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    pub id: StixId,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_ref: Option<StixId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl CommonProperties {
    pub(crate) fn new(id: StixId, stamp: &Stamp) -> Self {
        Self {
            object_type: id.object_type().to_string(),
            spec_version: SPEC_VERSION.into(),
            id,
            created: stamp.created,
            modified: stamp.modified,
            created_by_ref: stamp.created_by_ref.clone(),
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Object variants
// ---------------------------------------------------------------------------

/// `identity_class` open vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityClass {
    Individual,
    Group,
    System,
    Organization,
    Class,
    Unknown,
}

impl IdentityClass {
    /// Parse a vocabulary token (already lower-cased).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "individual" => Some(Self::Individual),
            "group" => Some(Self::Group),
            "system" => Some(Self::System),
            "organization" => Some(Self::Organization),
            "class" => Some(Self::Class),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_class: Option<IdentityClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pattern_type: String,
    pub pattern: String,
    pub valid_from: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub relationship_type: String,
    pub source_ref: StixId,
    pub target_ref: StixId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub report_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_references: Vec<ExternalReference>,
    #[serde(default)]
    pub object_refs: Vec<StixId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Report {
    /// A threat report with no references yet.
    pub fn new(name: impl Into<String>, published: DateTime<Utc>, stamp: &Stamp) -> Self {
        Self {
            common: CommonProperties::new(StixId::generate("report"), stamp),
            name: name.into(),
            description: None,
            published,
            report_types: vec![THREAT_REPORT.into()],
            labels: Vec::new(),
            external_references: Vec::new(),
            object_refs: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Append `id` unless it is already referenced. Returns whether it was added.
    pub fn add_ref(&mut self, id: &StixId) -> bool {
        if self.object_refs.contains(id) {
            return false;
        }
        self.object_refs.push(id.clone());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub content: String,
    #[serde(default)]
    pub object_refs: Vec<StixId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    pub fn new(content: impl Into<String>, object_refs: Vec<StixId>, stamp: &Stamp) -> Self {
        Self {
            common: CommonProperties::new(StixId::generate("note"), stamp),
            content: content.into(),
            object_refs,
            extra: Map::new(),
        }
    }
}

/// Any other object type (malware, threat-actor, …) and any object whose
/// shape does not match its typed variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainObject {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// StixObject
// ---------------------------------------------------------------------------

/// A STIX object of any type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StixObject {
    Identity(Identity),
    Indicator(Indicator),
    Relationship(Relationship),
    Report(Report),
    Note(Note),
    Domain(DomainObject),
}

impl StixObject {
    pub fn common(&self) -> &CommonProperties {
        match self {
            Self::Identity(o) => &o.common,
            Self::Indicator(o) => &o.common,
            Self::Relationship(o) => &o.common,
            Self::Report(o) => &o.common,
            Self::Note(o) => &o.common,
            Self::Domain(o) => &o.common,
        }
    }

    pub fn id(&self) -> &StixId {
        &self.common().id
    }

    pub fn object_type(&self) -> &str {
        &self.common().object_type
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Identity(o) => Some(&o.name),
            Self::Report(o) => Some(&o.name),
            Self::Indicator(o) => o.name.as_deref(),
            Self::Domain(o) => o.name.as_deref(),
            Self::Relationship(_) | Self::Note(_) => None,
        }
    }

    pub fn as_identity(&self) -> Option<&Identity> {
        match self {
            Self::Identity(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Self::Relationship(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_report(&self) -> Option<&Report> {
        match self {
            Self::Report(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_report_mut(&mut self) -> Option<&mut Report> {
        match self {
            Self::Report(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_note(&self) -> Option<&Note> {
        match self {
            Self::Note(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_note_mut(&mut self) -> Option<&mut Note> {
        match self {
            Self::Note(o) => Some(o),
            _ => None,
        }
    }

    /// Every identifier this object points at.
    pub fn references(&self) -> Vec<&StixId> {
        let mut refs: Vec<&StixId> = self.common().created_by_ref.iter().collect();
        match self {
            Self::Relationship(o) => {
                refs.push(&o.source_ref);
                refs.push(&o.target_ref);
            }
            Self::Report(o) => refs.extend(o.object_refs.iter()),
            Self::Note(o) => refs.extend(o.object_refs.iter()),
            Self::Identity(_) | Self::Indicator(_) | Self::Domain(_) => {}
        }
        refs
    }
}

impl From<Identity> for StixObject {
    fn from(o: Identity) -> Self {
        Self::Identity(o)
    }
}

impl From<Indicator> for StixObject {
    fn from(o: Indicator) -> Self {
        Self::Indicator(o)
    }
}

impl From<Relationship> for StixObject {
    fn from(o: Relationship) -> Self {
        Self::Relationship(o)
    }
}

impl From<Report> for StixObject {
    fn from(o: Report) -> Self {
        Self::Report(o)
    }
}

impl From<Note> for StixObject {
    fn from(o: Note) -> Self {
        Self::Note(o)
    }
}

impl From<DomainObject> for StixObject {
    fn from(o: DomainObject) -> Self {
        Self::Domain(o)
    }
}

impl<'de> Deserialize<'de> for StixObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let object_type = value.get("type").and_then(Value::as_str).unwrap_or_default();

        let parsed = match object_type {
            "identity" => typed::<Identity>(&value).map(Self::Identity),
            "indicator" => typed::<Indicator>(&value).map(Self::Indicator),
            "relationship" => typed::<Relationship>(&value).map(Self::Relationship),
            "report" => typed::<Report>(&value).map(Self::Report),
            "note" => typed::<Note>(&value).map(Self::Note),
            _ => return typed::<DomainObject>(&value).map(Self::Domain).map_err(D::Error::custom),
        };

        parsed.or_else(|e| {
            tracing::debug!(object_type, error = %e, "object kept as generic domain object");
            typed::<DomainObject>(&value)
                .map(Self::Domain)
                .map_err(D::Error::custom)
        })
    }
}

fn typed<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

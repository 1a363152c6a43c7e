//! STIX identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stixgraph_shared::{Result, StixGraphError};

/// A STIX identifier, `<object-type>--<uuid>`.
///
/// Validated on construction and on deserialization, so a `StixId` held
/// anywhere in the graph is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StixId(String);

impl StixId {
    /// Generate a fresh identifier for an object of `object_type`.
    pub fn new(object_type: &str) -> Result<Self> {
        if !is_valid_type(object_type) {
            return Err(StixGraphError::InvalidId(format!(
                "'{object_type}' is not a valid STIX type"
            )));
        }
        Ok(Self::generate(object_type))
    }

    /// Generate an identifier for one of the crate's own, statically valid, types.
    pub(crate) fn generate(object_type: &str) -> Self {
        Self(format!("{object_type}--{}", Uuid::new_v4()))
    }

    /// The type prefix (e.g. `report` for `report--…`).
    pub fn object_type(&self) -> &str {
        self.0
            .rsplit_once("--")
            .map(|(object_type, _)| object_type)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// STIX type tokens: 3–250 characters of `[a-z0-9-]`, no leading, trailing or doubled hyphen.
pub fn is_valid_type(object_type: &str) -> bool {
    (3..=250).contains(&object_type.len())
        && object_type
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !object_type.starts_with('-')
        && !object_type.ends_with('-')
        && !object_type.contains("--")
}

impl TryFrom<String> for StixId {
    type Error = StixGraphError;

    fn try_from(value: String) -> Result<Self> {
        let valid = value
            .rsplit_once("--")
            .is_some_and(|(t, u)| is_valid_type(t) && Uuid::parse_str(u).is_ok());
        if valid {
            Ok(Self(value))
        } else {
            Err(StixGraphError::InvalidId(value))
        }
    }
}

impl From<StixId> for String {
    fn from(id: StixId) -> Self {
        id.0
    }
}

impl FromStr for StixId {
    type Err = StixGraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for StixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

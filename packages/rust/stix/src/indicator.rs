//! Indicator validation and construction.
//!
//! Only three indicator kinds are admitted into the graph: IP addresses,
//! domain names and file hashes. Everything else is rejected before an object
//! is built, with a typed [`IndicatorRejection`] the caller records.

use std::fmt;
use std::net::IpAddr;

use serde_json::Map;

use crate::id::StixId;
use crate::object::{CommonProperties, Indicator, Stamp};
use crate::text::truncate_chars;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_NAME_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 2048;

/// The admitted indicator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    Ip,
    Domain,
    Hash,
}

impl IndicatorKind {
    /// Parse a lower-cased `indicator_type` token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "ip" => Some(Self::Ip),
            "domain" => Some(Self::Domain),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Domain => "domain",
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a candidate indicator never became an object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndicatorRejection {
    #[error("indicator type or value is empty")]
    EmptyField,

    #[error("indicator type '{0}' is not allowed")]
    KindNotAllowed(String),

    #[error("'{value}' is not a valid {kind} value")]
    InvalidValue { kind: IndicatorKind, value: String },
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIndicator {
    pub kind: IndicatorKind,
    /// Canonical form: the exact string written into the pattern.
    pub value: String,
    pub pattern: String,
}

/// Validate `(indicator_type, value)` and produce its canonical value and pattern.
pub fn validate_indicator(
    indicator_type: &str,
    value: &str,
) -> Result<ValidatedIndicator, IndicatorRejection> {
    let indicator_type = indicator_type.trim().to_lowercase();
    let value = value.trim();
    if indicator_type.is_empty() || value.is_empty() {
        return Err(IndicatorRejection::EmptyField);
    }

    let kind = IndicatorKind::parse(&indicator_type)
        .ok_or(IndicatorRejection::KindNotAllowed(indicator_type))?;
    let invalid = || IndicatorRejection::InvalidValue {
        kind,
        value: value.to_string(),
    };

    let (value, pattern) = match kind {
        IndicatorKind::Ip => {
            let addr: IpAddr = value.parse().map_err(|_| invalid())?;
            let canonical = addr.to_string();
            let pattern = match addr {
                IpAddr::V4(_) => format!("[ipv4-addr:value = '{canonical}']"),
                IpAddr::V6(_) => format!("[ipv6-addr:value = '{canonical}']"),
            };
            (canonical, pattern)
        }
        IndicatorKind::Domain => {
            let domain = value.to_lowercase();
            if !is_domain(&domain) {
                return Err(invalid());
            }
            let pattern = format!("[domain-name:value = '{domain}']");
            (domain, pattern)
        }
        IndicatorKind::Hash => {
            let hash = value.to_lowercase();
            if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let algorithm = match hash.len() {
                32 => "MD5",
                40 => "'SHA-1'",
                64 => "'SHA-256'",
                _ => return Err(invalid()),
            };
            let pattern = format!("[file:hashes.{algorithm} = '{hash}']");
            (hash, pattern)
        }
    };

    Ok(ValidatedIndicator {
        kind,
        value,
        pattern,
    })
}

/// Hostname syntax check over an already lower-cased value.
fn is_domain(value: &str) -> bool {
    value.len() <= MAX_DOMAIN_LEN
        && value.contains('.')
        && !value.starts_with(['.', '-'])
        && !value.ends_with(['.', '-'])
        && !value.contains("..")
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
}

/// Build the Indicator object for a validated candidate.
pub fn build_indicator(
    validated: &ValidatedIndicator,
    context: &str,
    confidence: Option<u8>,
    stamp: &Stamp,
) -> Indicator {
    let mut common = CommonProperties::new(StixId::generate("indicator"), stamp);
    common.confidence = confidence;

    Indicator {
        common,
        name: Some(truncate_chars(
            &format!("{}:{}", validated.kind, validated.value),
            MAX_NAME_CHARS,
        )),
        description: (!context.is_empty())
            .then(|| truncate_chars(context, MAX_DESCRIPTION_CHARS)),
        pattern_type: "stix".into(),
        pattern: validated.pattern.clone(),
        valid_from: stamp.created,
        extra: Map::new(),
    }
}

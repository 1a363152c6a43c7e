//! The pipeline's own identities: the Creator, Publishers and Authors.

use serde_json::Map;

use crate::id::StixId;
use crate::object::{CommonProperties, Identity, IdentityClass, Stamp};
use crate::text::truncate_chars;

/// Publisher name used when no stage supplies one.
pub const UNKNOWN_PUBLISHER: &str = "Unknown Publisher";

pub const PUBLISHER_DESCRIPTION: &str = "News outlet / publisher as listed in the source article.";

pub const AUTHOR_DESCRIPTION: &str = "Author name as listed in the source article. \
May represent a pseudonym/handle/persona; not asserted as a verified real-world individual at ingestion time.";

const MAX_NAME_CHARS: usize = 256;

fn identity(
    name: &str,
    class: IdentityClass,
    description: Option<&str>,
    stamp: &Stamp,
) -> Identity {
    Identity {
        common: CommonProperties::new(StixId::generate("identity"), stamp),
        name: truncate_chars(name, MAX_NAME_CHARS),
        identity_class: Some(class),
        description: description.map(str::to_string),
        extra: Map::new(),
    }
}

/// The ingestion system itself. Never attributed to anyone.
pub fn creator_identity(name: &str, stamp: &Stamp) -> Identity {
    let mut creator = identity(name, IdentityClass::Organization, None, stamp);
    creator.common.created_by_ref = None;
    creator
}

/// A news outlet, keyed by its raw name.
pub fn publisher_identity(name: &str, stamp: &Stamp) -> Identity {
    identity(
        name,
        IdentityClass::Organization,
        Some(PUBLISHER_DESCRIPTION),
        stamp,
    )
}

/// A byline name as listed by a publisher.
pub fn author_identity(name: &str, stamp: &Stamp) -> Identity {
    identity(
        name,
        IdentityClass::Individual,
        Some(AUTHOR_DESCRIPTION),
        stamp,
    )
}

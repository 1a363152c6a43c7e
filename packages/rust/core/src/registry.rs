//! Dedup registry: key → id tables for one run.
//!
//! Nothing here is persisted. A build starts empty; an enrichment run
//! rebuilds the tables from the bundle with [`Registry::from_objects`].
//!
//! Every insert is journaled so the work of one article can be undone with
//! [`Registry::rollback`] if that article fails halfway.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use stixgraph_stix::identity::PUBLISHER_DESCRIPTION;
use stixgraph_stix::relationship::RELATED_TO;
use stixgraph_stix::{IdentityClass, IndicatorKind, RelationshipKey, StixId, StixObject};

use crate::authors::normalize_author_key;

/// Author identity is scoped by publisher: one person per outlet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorKey {
    pub publisher: String,
    pub normalized: String,
}

impl AuthorKey {
    /// `None` when the name normalizes to nothing.
    pub fn new(publisher: &str, name: &str) -> Option<Self> {
        let normalized = normalize_author_key(name);
        (!normalized.is_empty()).then(|| Self {
            publisher: publisher.to_string(),
            normalized,
        })
    }
}

#[derive(Debug)]
enum Undo {
    Sdo((String, String)),
    Indicator((IndicatorKind, String)),
    Publisher(String),
    Author(AuthorKey),
    Adopted { normalized: String, id: StixId },
    Relationship(RelationshipKey),
}

#[derive(Debug, Default)]
pub struct Registry {
    sdos: HashMap<(String, String), StixId>,
    indicators: HashMap<(IndicatorKind, String), StixId>,
    publishers: HashMap<String, StixId>,
    authors: HashMap<AuthorKey, StixId>,
    /// Individuals with no publisher edge, keyed by normalized name.
    unscoped_authors: HashMap<String, StixId>,
    relationships: HashSet<RelationshipKey>,
    journal: Vec<Undo>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild publisher, author and edge tables from existing objects.
    ///
    /// Individuals are scoped by the name of every identity they have a
    /// `related-to` edge to. Individuals without such an edge are kept
    /// unscoped, to be claimed by the first lookup of the same name.
    pub fn from_objects(objects: &[StixObject]) -> Self {
        let mut registry = Self::new();
        let identity_names: HashMap<&StixId, &str> = objects
            .iter()
            .filter_map(StixObject::as_identity)
            .map(|identity| (&identity.common.id, identity.name.as_str()))
            .collect();

        let mut scopes: HashMap<&StixId, Vec<&str>> = HashMap::new();
        for relationship in objects.iter().filter_map(StixObject::as_relationship) {
            registry.relationships.insert(RelationshipKey::of(relationship));
            if relationship.relationship_type != RELATED_TO {
                continue;
            }
            if let Some(publisher) = identity_names.get(&relationship.target_ref) {
                scopes.entry(&relationship.source_ref).or_default().push(*publisher);
            }
        }

        for identity in objects.iter().filter_map(StixObject::as_identity) {
            let id = &identity.common.id;
            match identity.identity_class {
                Some(IdentityClass::Individual) => {
                    let normalized = normalize_author_key(&identity.name);
                    if normalized.is_empty() {
                        continue;
                    }
                    match scopes.get(id) {
                        Some(publishers) => {
                            for publisher in publishers {
                                let key = AuthorKey {
                                    publisher: (*publisher).to_string(),
                                    normalized: normalized.clone(),
                                };
                                registry.authors.entry(key).or_insert_with(|| id.clone());
                            }
                        }
                        None => {
                            registry
                                .unscoped_authors
                                .entry(normalized)
                                .or_insert_with(|| id.clone());
                        }
                    }
                }
                Some(IdentityClass::Organization)
                    if identity.description.as_deref() == Some(PUBLISHER_DESCRIPTION) =>
                {
                    registry
                        .publishers
                        .entry(identity.name.clone())
                        .or_insert_with(|| id.clone());
                }
                _ => {}
            }
        }

        debug!(
            publishers = registry.publishers.len(),
            authors = registry.authors.len(),
            unscoped_authors = registry.unscoped_authors.len(),
            relationships = registry.relationships.len(),
            "registry rebuilt from bundle"
        );
        registry
    }

    // -----------------------------------------------------------------------
    // Lookups and inserts
    // -----------------------------------------------------------------------

    pub fn sdo(&self, stix_type: &str, name: &str) -> Option<&StixId> {
        self.sdos.get(&(stix_type.to_string(), name.to_string()))
    }

    pub fn insert_sdo(&mut self, stix_type: &str, name: &str, id: StixId) {
        let key = (stix_type.to_string(), name.to_string());
        self.sdos.insert(key.clone(), id);
        self.journal.push(Undo::Sdo(key));
    }

    pub fn indicator(&self, kind: IndicatorKind, value: &str) -> Option<&StixId> {
        self.indicators.get(&(kind, value.to_string()))
    }

    pub fn insert_indicator(&mut self, kind: IndicatorKind, value: &str, id: StixId) {
        let key = (kind, value.to_string());
        self.indicators.insert(key.clone(), id);
        self.journal.push(Undo::Indicator(key));
    }

    pub fn publisher(&self, name: &str) -> Option<&StixId> {
        self.publishers.get(name)
    }

    pub fn insert_publisher(&mut self, name: &str, id: StixId) {
        self.publishers.insert(name.to_string(), id);
        self.journal.push(Undo::Publisher(name.to_string()));
    }

    /// The author for `key`, claiming an unscoped individual of the same name if needed.
    pub fn author(&mut self, key: &AuthorKey) -> Option<StixId> {
        if let Some(id) = self.authors.get(key) {
            return Some(id.clone());
        }
        let id = self.unscoped_authors.remove(&key.normalized)?;
        debug!(author = %id, publisher = %key.publisher, "scoping unscoped author");
        self.journal.push(Undo::Adopted {
            normalized: key.normalized.clone(),
            id: id.clone(),
        });
        self.insert_author(key.clone(), id.clone());
        Some(id)
    }

    pub fn insert_author(&mut self, key: AuthorKey, id: StixId) {
        self.authors.insert(key.clone(), id);
        self.journal.push(Undo::Author(key));
    }

    /// Record an edge key. Returns `false` if it was already present.
    pub fn insert_relationship(&mut self, key: RelationshipKey) -> bool {
        if !self.relationships.insert(key.clone()) {
            return false;
        }
        self.journal.push(Undo::Relationship(key));
        true
    }

    pub fn contains_relationship(&self, key: &RelationshipKey) -> bool {
        self.relationships.contains(key)
    }

    // -----------------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------------

    /// Start a new unit of work; earlier inserts become permanent.
    pub fn begin(&mut self) {
        self.journal.clear();
    }

    /// Undo every insert since the last [`Registry::begin`].
    pub fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Sdo(key) => {
                    self.sdos.remove(&key);
                }
                Undo::Indicator(key) => {
                    self.indicators.remove(&key);
                }
                Undo::Publisher(key) => {
                    self.publishers.remove(&key);
                }
                Undo::Author(key) => {
                    self.authors.remove(&key);
                }
                Undo::Adopted { normalized, id } => {
                    self.unscoped_authors.insert(normalized, id);
                }
                Undo::Relationship(key) => {
                    self.relationships.remove(&key);
                }
            }
        }
    }
}

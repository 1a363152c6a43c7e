//! Append-only object graph with registry-backed lookup-or-create.

use tracing::debug;

use stixgraph_shared::{CandidateObject, Result};
use stixgraph_stix::identity::{author_identity, creator_identity, publisher_identity};
use stixgraph_stix::indicator::build_indicator;
use stixgraph_stix::relationship::build_relationship;
use stixgraph_stix::sdo::build_domain_object;
use stixgraph_stix::{RelationshipKey, Stamp, StixId, StixObject, ValidatedIndicator};

use crate::registry::{AuthorKey, Registry};

/// Outcome of a lookup-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Existing(StixId),
    Created(StixId),
}

impl Resolution {
    pub fn id(&self) -> &StixId {
        match self {
            Self::Existing(id) | Self::Created(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Marker returned by [`GraphBuilder::checkpoint`].
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    objects: usize,
}

/// The objects of one run, the registry that dedups them, and the stamp
/// applied to everything this run creates.
pub struct GraphBuilder {
    objects: Vec<StixObject>,
    registry: Registry,
    creator: StixId,
    /// Run timestamps, attributed to the creator.
    stamp: Stamp,
}

impl GraphBuilder {
    /// A fresh graph whose first object is the Creator identity.
    pub fn new(creator_name: &str, stamp: Stamp) -> Self {
        let creator = creator_identity(creator_name, &stamp);
        let creator_id = creator.common.id.clone();
        Self {
            objects: vec![creator.into()],
            registry: Registry::new(),
            stamp: stamp.by(&creator_id),
            creator: creator_id,
        }
    }

    /// Continue an existing graph, rebuilding the registry from its objects.
    pub fn resume(objects: Vec<StixObject>, creator: StixId, stamp: Stamp) -> Self {
        Self {
            registry: Registry::from_objects(&objects),
            objects,
            stamp: stamp.by(&creator),
            creator,
        }
    }

    pub fn creator(&self) -> &StixId {
        &self.creator
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn objects(&self) -> &[StixObject] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<StixObject> {
        self.objects
    }

    /// Append an object and return its position.
    pub fn push(&mut self, object: impl Into<StixObject>) -> usize {
        self.objects.push(object.into());
        self.objects.len() - 1
    }

    pub fn object_mut(&mut self, index: usize) -> Option<&mut StixObject> {
        self.objects.get_mut(index)
    }

    // -----------------------------------------------------------------------
    // Lookup-or-create
    // -----------------------------------------------------------------------

    /// Domain object keyed by `(stix_type, name)` across the whole run.
    pub fn resolve_sdo(&mut self, candidate: &CandidateObject) -> Result<Resolution> {
        if let Some(id) = self.registry.sdo(&candidate.stix_type, &candidate.name) {
            return Ok(Resolution::Existing(id.clone()));
        }
        let object = build_domain_object(candidate, &self.stamp)?;
        let id = object.id().clone();
        self.registry
            .insert_sdo(&candidate.stix_type, &candidate.name, id.clone());
        self.push(object);
        debug!(%id, stix_type = %candidate.stix_type, name = %candidate.name, "created domain object");
        Ok(Resolution::Created(id))
    }

    /// Indicator keyed by `(kind, canonical value)`.
    pub fn resolve_indicator(
        &mut self,
        validated: &ValidatedIndicator,
        context: &str,
        confidence: Option<u8>,
    ) -> Resolution {
        if let Some(id) = self.registry.indicator(validated.kind, &validated.value) {
            return Resolution::Existing(id.clone());
        }
        let indicator = build_indicator(validated, context, confidence, &self.stamp);
        let id = indicator.common.id.clone();
        self.registry
            .insert_indicator(validated.kind, &validated.value, id.clone());
        self.push(indicator);
        debug!(%id, pattern = %validated.pattern, "created indicator");
        Resolution::Created(id)
    }

    /// Publisher keyed by its raw name.
    pub fn resolve_publisher(&mut self, name: &str) -> Resolution {
        if let Some(id) = self.registry.publisher(name) {
            return Resolution::Existing(id.clone());
        }
        let publisher = publisher_identity(name, &self.stamp);
        let id = publisher.common.id.clone();
        self.registry.insert_publisher(name, id.clone());
        self.push(publisher);
        debug!(%id, publisher = name, "created publisher identity");
        Resolution::Created(id)
    }

    /// Author keyed by `(publisher, normalized name)`.
    ///
    /// `None` when the name has nothing left after normalization.
    pub fn resolve_author(&mut self, publisher: &str, name: &str) -> Option<Resolution> {
        let key = AuthorKey::new(publisher, name)?;
        if let Some(id) = self.registry.author(&key) {
            return Some(Resolution::Existing(id));
        }
        let author = author_identity(name, &self.stamp);
        let id = author.common.id.clone();
        self.registry.insert_author(key, id.clone());
        self.push(author);
        debug!(%id, author = name, publisher, "created author identity");
        Some(Resolution::Created(id))
    }

    /// Add an edge unless `(source, type, target)` already exists in this graph.
    ///
    /// Returns the new edge id, or `None` for a duplicate.
    pub fn link(
        &mut self,
        relationship_type: &str,
        source: &StixId,
        target: &StixId,
        confidence: Option<u8>,
    ) -> Option<StixId> {
        let relationship =
            build_relationship(relationship_type, source, target, confidence, &self.stamp);
        if !self
            .registry
            .insert_relationship(RelationshipKey::of(&relationship))
        {
            debug!(%source, %target, relationship_type = %relationship.relationship_type, "duplicate relationship skipped");
            return None;
        }
        let id = relationship.common.id.clone();
        self.push(relationship);
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Units of work
    // -----------------------------------------------------------------------

    /// Mark the start of one article's work.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.registry.begin();
        Checkpoint {
            objects: self.objects.len(),
        }
    }

    /// Drop every object and registry key added since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let dropped = self.objects.len().saturating_sub(checkpoint.objects);
        self.objects.truncate(checkpoint.objects);
        self.registry.rollback();
        debug!(dropped, "rolled back article objects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stixgraph_stix::indicator::validate_indicator;

    fn graph() -> GraphBuilder {
        GraphBuilder::new("Geopolitical Collector", Stamp::now())
    }

    fn candidate(stix_type: &str, name: &str) -> CandidateObject {
        CandidateObject {
            stix_type: stix_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn creator_is_first_and_unattributed() {
        let g = graph();
        assert_eq!(g.objects().len(), 1);
        assert_eq!(g.objects()[0].id(), g.creator());
        assert!(g.objects()[0].common().created_by_ref.is_none());
        assert_eq!(g.stamp().created_by_ref.as_ref(), Some(g.creator()));
    }

    #[test]
    fn same_sdo_key_reuses_id() {
        let mut g = graph();
        let first = g.resolve_sdo(&candidate("malware", "Lockbit")).unwrap();
        let second = g.resolve_sdo(&candidate("malware", "Lockbit")).unwrap();
        assert!(first.is_created());
        assert_eq!(second, Resolution::Existing(first.id().clone()));
        assert_eq!(g.objects().len(), 2);

        let other = g.resolve_sdo(&candidate("tool", "Lockbit")).unwrap();
        assert!(other.is_created());
    }

    #[test]
    fn indicators_dedup_on_canonical_value() {
        let mut g = graph();
        let upper = validate_indicator("domain", "EVIL.example.com").unwrap();
        let lower = validate_indicator("domain", "evil.example.com").unwrap();
        let a = g.resolve_indicator(&upper, "", None);
        let b = g.resolve_indicator(&lower, "", None);
        assert_eq!(a.id(), b.id());
        assert_eq!(g.objects().len(), 2);
    }

    #[test]
    fn authors_are_scoped_by_publisher() {
        let mut g = graph();
        let a = g.resolve_author("BleepingComputer", "Bill Toulas").unwrap();
        let b = g.resolve_author("BleepingComputer", "bill  toulas.").unwrap();
        let c = g.resolve_author("The Record", "Bill Toulas").unwrap();
        assert_eq!(a.id(), b.id());
        assert!(!b.is_created());
        assert_ne!(a.id(), c.id());
        assert!(g.resolve_author("BleepingComputer", "...").is_none());
    }

    #[test]
    fn link_skips_duplicates() {
        let mut g = graph();
        let src = g.resolve_sdo(&candidate("malware", "Lockbit")).unwrap();
        let tgt = g.resolve_sdo(&candidate("identity", "Acme")).unwrap();
        assert!(g.link("targets", src.id(), tgt.id(), Some(80)).is_some());
        assert!(g.link("targets", src.id(), tgt.id(), None).is_none());
        assert!(g.link("", src.id(), tgt.id(), None).is_some());
        assert!(g.link("related-to", src.id(), tgt.id(), None).is_none());
    }

    #[test]
    fn rollback_restores_objects_and_keys() {
        let mut g = graph();
        g.resolve_publisher("BleepingComputer");
        let checkpoint = g.checkpoint();
        g.resolve_sdo(&candidate("malware", "Clop")).unwrap();
        g.resolve_publisher("The Record");
        g.rollback(checkpoint);

        assert_eq!(g.objects().len(), 2);
        assert!(g.resolve_sdo(&candidate("malware", "Clop")).unwrap().is_created());
        assert!(!g.resolve_publisher("BleepingComputer").is_created());
        assert!(g.resolve_publisher("The Record").is_created());
    }
}

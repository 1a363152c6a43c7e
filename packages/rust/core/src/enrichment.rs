//! Enrichment Pass: discover bylines in raw article text and attach Author
//! identities to an existing bundle.
//!
//! The pass only appends objects and rewrites the first line of attribution
//! Notes. Registry state is rebuilt from the bundle itself, so running it
//! again over its own output changes nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use stixgraph_shared::{Result, StixGraphError};
use stixgraph_stix::identity::UNKNOWN_PUBLISHER;
use stixgraph_stix::relationship::{CREATED_BY, RELATED_TO};
use stixgraph_stix::text::is_sha256_hex;
use stixgraph_stix::{Bundle, EnrichmentSummary, Stamp, StixId, StixObject};

use crate::assembler::{AUTHOR_EDGE_CONFIDENCE, PUBLISHER_EDGE_CONFIDENCE};
use crate::authors::extract_byline_authors;
use crate::graph::GraphBuilder;
use crate::note::{is_attribution, raw_saved_path, raw_sha256, set_author_line};
use crate::pipeline::ProgressReporter;

/// Stage name recorded in `x_enrichment`.
pub const ENRICHMENT_STAGE: &str = "enrich_authors";

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Name of the Creator identity to attribute new objects to.
    pub creator_name: String,
    /// Directory relative raw text paths resolve against (default: working directory).
    pub raw_base: Option<PathBuf>,
    /// Run timestamp for new objects.
    pub now: DateTime<Utc>,
}

/// Run the pass over `bundle` in place and record the summary on it.
#[instrument(skip_all, fields(bundle = %bundle.id, objects = bundle.objects.len()))]
pub fn enrich_bundle(
    bundle: &mut Bundle,
    options: &EnrichOptions,
    progress: &dyn ProgressReporter,
) -> Result<EnrichmentSummary> {
    let creator = find_creator(&bundle.objects, &options.creator_name).ok_or_else(|| {
        StixGraphError::validation("bundle has no identity to attribute new objects to")
    })?;
    debug!(%creator, "creator identity");

    let objects = std::mem::take(&mut bundle.objects);
    let mut graph = GraphBuilder::resume(objects, creator, Stamp::at(options.now));
    let index: HashMap<StixId, usize> = graph
        .objects()
        .iter()
        .enumerate()
        .map(|(i, obj)| (obj.id().clone(), i))
        .collect();
    let reports: Vec<usize> = graph
        .objects()
        .iter()
        .enumerate()
        .filter(|(_, obj)| obj.as_report().is_some())
        .map(|(i, _)| i)
        .collect();

    let mut summary = EnrichmentSummary {
        stage: ENRICHMENT_STAGE.into(),
        ..Default::default()
    };
    let total = reports.len();
    info!(reports = total, "enriching reports");

    for (n, report_index) in reports.into_iter().enumerate() {
        let Some(report) = graph.objects()[report_index].as_report() else {
            continue;
        };
        progress.item(n + 1, total, &report.name);
        let report_id = report.common.id.clone();

        // Publisher = the identity the report is attributed to.
        let publisher = report
            .common
            .created_by_ref
            .as_ref()
            .and_then(|id| index.get(id))
            .and_then(|&i| graph.objects()[i].as_identity())
            .map(|identity| (identity.common.id.clone(), identity.name.clone()));
        let publisher_name = publisher
            .as_ref()
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| UNKNOWN_PUBLISHER.to_string());

        let Some(note_index) = find_attribution_note(graph.objects(), &report_id) else {
            debug!(report = %report_id, "no attribution note");
            continue;
        };
        let Some(content) = graph.objects()[note_index]
            .as_note()
            .map(|note| note.content.clone())
        else {
            continue;
        };

        let Some(raw_text) = read_raw_text(&content, options.raw_base.as_deref()) else {
            continue;
        };
        let authors = extract_byline_authors(&raw_text);
        if authors.is_empty() {
            debug!(report = %report_id, "no byline found");
            continue;
        }

        let mut changed = false;

        let updated = set_author_line(&content, &authors);
        if updated != content {
            if let Some(note) = graph.object_mut(note_index).and_then(StixObject::as_note_mut) {
                note.content = updated;
                summary.updated_notes += 1;
                changed = true;
            }
        }

        let mut new_refs = Vec::new();
        for name in &authors {
            let Some(author) = graph.resolve_author(&publisher_name, name) else {
                continue;
            };
            if author.is_created() {
                summary.added_identities += 1;
            }
            new_refs.push(author.id().clone());

            if let Some(edge) = graph.link(
                CREATED_BY,
                &report_id,
                author.id(),
                Some(AUTHOR_EDGE_CONFIDENCE),
            ) {
                summary.added_relationships += 1;
                new_refs.push(edge);
            }
            if let Some((publisher_id, _)) = &publisher {
                if let Some(edge) = graph.link(
                    RELATED_TO,
                    author.id(),
                    publisher_id,
                    Some(PUBLISHER_EDGE_CONFIDENCE),
                ) {
                    summary.added_relationships += 1;
                    new_refs.push(edge);
                }
            }
        }

        if let Some(report) = graph.object_mut(report_index).and_then(StixObject::as_report_mut) {
            for id in &new_refs {
                changed |= report.add_ref(id);
            }
        }

        if changed {
            summary.changed_reports += 1;
            debug!(report = %report_id, authors = ?authors, "report enriched");
        }
    }

    bundle.objects = graph.into_objects();
    bundle
        .x_enriched_at
        .get_or_insert_with(|| options.now.to_rfc3339_opts(SecondsFormat::Secs, true));
    bundle.x_enrichment = Some(summary.clone());

    info!(
        changed_reports = summary.changed_reports,
        added_identities = summary.added_identities,
        added_relationships = summary.added_relationships,
        updated_notes = summary.updated_notes,
        "enrichment complete"
    );
    Ok(summary)
}

/// The identity named `creator_name`, else the first identity.
fn find_creator(objects: &[StixObject], creator_name: &str) -> Option<StixId> {
    let identities = || objects.iter().filter(|obj| obj.object_type() == "identity");
    identities()
        .find(|obj| obj.name() == Some(creator_name))
        .or_else(|| identities().next())
        .map(|obj| obj.id().clone())
}

/// A Note referencing `report_id`, preferring one that starts with `author:`.
fn find_attribution_note(objects: &[StixObject], report_id: &StixId) -> Option<usize> {
    let mut fallback = None;
    for (i, note) in objects
        .iter()
        .enumerate()
        .filter_map(|(i, obj)| obj.as_note().map(|note| (i, note)))
    {
        if !note.object_refs.contains(report_id) {
            continue;
        }
        if is_attribution(&note.content) {
            return Some(i);
        }
        fallback.get_or_insert(i);
    }
    fallback
}

/// Read the raw article text a Note points at. `None` if there is no path or
/// the file cannot be read.
fn read_raw_text(content: &str, raw_base: Option<&Path>) -> Option<String> {
    let recorded = raw_saved_path(content)?;
    let path = resolve_raw_path(recorded, raw_base);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "raw text unreadable");
            return None;
        }
    };

    if let Some(actual) = raw_hash_mismatch(content, &bytes) {
        let expected = raw_sha256(content).unwrap_or_default();
        warn!(path = %path.display(), expected, actual = %actual, "raw text hash mismatch");
    }

    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// The actual SHA-256 of `bytes` when the Note records a different one.
/// A missing or malformed recorded hash is not a mismatch.
fn raw_hash_mismatch(content: &str, bytes: &[u8]) -> Option<String> {
    let expected = raw_sha256(content).filter(|h| is_sha256_hex(h))?;
    let actual = format!("{:x}", Sha256::digest(bytes));
    (!actual.eq_ignore_ascii_case(expected)).then_some(actual)
}

fn resolve_raw_path(recorded: &str, raw_base: Option<&Path>) -> PathBuf {
    let path = Path::new(recorded);
    match raw_base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

//! Report Assembler: extraction items → one STIX bundle.
//!
//! Each article is processed in order against one [`GraphBuilder`], so domain
//! objects, indicators, publishers, authors and edges are deduplicated across
//! the whole run. An article either produces a Report (plus its attribution
//! Note) or a manifest `skipped` entry; a failure part-way through rolls the
//! article's objects back.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use stixgraph_shared::manifest::{
    REASON_DUPLICATE, REASON_INVALID_INDICATOR, REASON_MISSING_ENDPOINT,
    REASON_MISSING_TYPE_OR_NAME, REASON_UNRESOLVED_ENDPOINT, REASON_UNSUPPORTED_TYPE,
};
use stixgraph_shared::{
    CandidateRelationship, CleanedDoc, CleanedItem, ExtractedItem, ExtractionDoc, IncludedDoc,
    IncludedRow, ReportEntry, Result, SkippedArticle, SkippedIndicator, SkippedObject,
    SkippedRelationship,
};
use stixgraph_stix::identity::UNKNOWN_PUBLISHER;
use stixgraph_stix::indicator::validate_indicator;
use stixgraph_stix::relationship::{CREATED_BY, RELATED_TO};
use stixgraph_stix::sdo::is_supported_type;
use stixgraph_stix::text::{is_sha256_hex, truncate_chars};
use stixgraph_stix::{Bundle, ExternalReference, Note, Report, StixId};

use crate::authors::parse_author_field;
use crate::graph::GraphBuilder;
use crate::note::{RawTextRef, attribution_content};
use crate::pipeline::ProgressReporter;

/// Confidence on Report → Author `created-by` edges.
pub const AUTHOR_EDGE_CONFIDENCE: u8 = 60;
/// Confidence on Author → Publisher `related-to` edges.
pub const PUBLISHER_EDGE_CONFIDENCE: u8 = 40;

const MAX_NAME_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_LABELS: usize = 20;

pub const SKIP_NOT_OK: &str = "skip: not ok";
pub const SKIP_NO_TITLE_OR_URL: &str = "skip: missing title and url";
pub const SKIP_EMPTY: &str = "skip: no objects/indicators/relationships";

/// Knobs for one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Name of the Creator identity.
    pub creator_name: String,
    /// Store cleaned text on Reports as `x_opencti_content`.
    pub embed_clean_text: bool,
    /// Process at most this many items.
    pub limit: Option<usize>,
    /// Run timestamp, applied as `created`/`modified` to every new object.
    pub now: DateTime<Utc>,
}

/// The stage documents one build reads.
#[derive(Debug, Clone, Copy)]
pub struct BuildInputs<'a> {
    pub extraction: &'a ExtractionDoc,
    pub cleaned: Option<&'a CleanedDoc>,
    pub included: Option<&'a IncludedDoc>,
}

/// A built bundle and the per-article audit trail.
#[derive(Debug)]
pub struct BuildOutcome {
    pub bundle: Bundle,
    pub reports: Vec<ReportEntry>,
    pub skipped: Vec<SkippedArticle>,
}

/// Build the bundle for every item in the extraction document.
#[instrument(skip_all, fields(items = inputs.extraction.items.len(), limit = ?options.limit))]
pub fn build_bundle(
    inputs: BuildInputs<'_>,
    options: &BuildOptions,
    progress: &dyn ProgressReporter,
) -> BuildOutcome {
    build_with(inputs, options, progress, assemble_article)
}

/// The per-item loop, with the per-article step passed in.
fn build_with<F>(
    inputs: BuildInputs<'_>,
    options: &BuildOptions,
    progress: &dyn ProgressReporter,
    mut assemble: F,
) -> BuildOutcome
where
    F: FnMut(&mut GraphBuilder, &ExtractedItem, &SideTables<'_>, &BuildOptions) -> Result<ArticleOutcome>,
{
    let side = SideTables::new(inputs.cleaned, inputs.included);
    let mut graph = GraphBuilder::new(&options.creator_name, stixgraph_stix::Stamp::at(options.now));
    let mut reports = Vec::new();
    let mut skipped = Vec::new();

    let take = options.limit.unwrap_or(usize::MAX);
    let items: Vec<&Value> = inputs.extraction.items.iter().take(take).collect();
    let total = items.len();
    info!(total, "assembling reports");

    for (i, raw) in items.into_iter().enumerate() {
        let item = match ExtractionDoc::parse_item(raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(row = ?ExtractionDoc::raw_row_num(raw), error = %e, "unreadable extraction item");
                skipped.push(unreadable_item(raw, &e.to_string()));
                progress.item(i + 1, total, "");
                continue;
            }
        };
        progress.item(i + 1, total, &item.title);

        if !item.is_ok() {
            debug!(row = ?item.row_num, "upstream stage not ok");
            skipped.push(skipped_article(&item, SKIP_NOT_OK));
            continue;
        }
        if item.title.is_empty() && item.url.is_empty() {
            skipped.push(skipped_article(&item, SKIP_NO_TITLE_OR_URL));
            continue;
        }

        let checkpoint = graph.checkpoint();
        match assemble(&mut graph, &item, &side, options) {
            Ok(ArticleOutcome::Report(entry)) => reports.push(entry),
            Ok(ArticleOutcome::Empty(rejections)) => {
                graph.rollback(checkpoint);
                debug!(row = ?item.row_num, "nothing to report");
                let mut entry = skipped_article(&item, SKIP_EMPTY);
                entry.skipped_indicators = rejections.indicators;
                entry.skipped_objects = rejections.objects;
                entry.skipped_relationships = rejections.relationships;
                skipped.push(entry);
            }
            Err(e) => {
                graph.rollback(checkpoint);
                warn!(row = ?item.row_num, url = %item.url, error = %e, "article failed");
                skipped.push(skipped_article(&item, &format!("exception: {e}")));
            }
        }
    }

    let bundle = Bundle::new(graph.into_objects());
    info!(
        reports = reports.len(),
        skipped = skipped.len(),
        objects = bundle.objects.len(),
        "bundle assembled"
    );
    BuildOutcome {
        bundle,
        reports,
        skipped,
    }
}

// ---------------------------------------------------------------------------
// One article
// ---------------------------------------------------------------------------

/// What one article produced.
enum ArticleOutcome {
    Report(ReportEntry),
    /// Nothing to reference; the rejections still go to the manifest.
    Empty(Rejections),
}

#[derive(Default)]
struct Rejections {
    indicators: Vec<SkippedIndicator>,
    objects: Vec<SkippedObject>,
    relationships: Vec<SkippedRelationship>,
}

/// Ids referenced by one Report, in first-seen order without repeats.
#[derive(Default)]
struct RefSet {
    ids: Vec<StixId>,
    seen: HashSet<StixId>,
}

impl RefSet {
    fn add(&mut self, id: &StixId) {
        if self.seen.insert(id.clone()) {
            self.ids.push(id.clone());
        }
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Stage every object for one article and its Report.
///
/// The Report references everything staged here, including the Publisher it
/// is attributed to. The Creator predates the run's articles and is never
/// referenced.
fn assemble_article(
    graph: &mut GraphBuilder,
    item: &ExtractedItem,
    side: &SideTables<'_>,
    options: &BuildOptions,
) -> Result<ArticleOutcome> {
    let cleaned = side.cleaned(&item.url);
    let included = side.included(&item.url, item.row_num);

    let mut refs = RefSet::default();
    let mut local: HashMap<(&str, &str), StixId> = HashMap::new();
    let mut skipped_objects = Vec::new();
    let mut skipped_indicators = Vec::new();
    let mut skipped_relationships = Vec::new();

    for candidate in &item.objects {
        if candidate.stix_type.is_empty() || candidate.name.is_empty() {
            debug!(stix_type = %candidate.stix_type, name = %candidate.name, "object candidate missing type or name");
            skipped_objects.push(SkippedObject {
                stix_type: candidate.stix_type.clone(),
                name: candidate.name.clone(),
                reason: REASON_MISSING_TYPE_OR_NAME.into(),
            });
            continue;
        }
        if !is_supported_type(&candidate.stix_type) {
            skipped_objects.push(SkippedObject {
                stix_type: candidate.stix_type.clone(),
                name: candidate.name.clone(),
                reason: REASON_UNSUPPORTED_TYPE.into(),
            });
            continue;
        }
        let resolution = graph.resolve_sdo(candidate)?;
        refs.add(resolution.id());
        local.insert(
            (candidate.stix_type.as_str(), candidate.name.as_str()),
            resolution.id().clone(),
        );
    }

    for candidate in &item.indicators {
        match validate_indicator(&candidate.indicator_type, &candidate.value) {
            Ok(validated) => {
                let resolution =
                    graph.resolve_indicator(&validated, &candidate.context, candidate.confidence);
                refs.add(resolution.id());
            }
            Err(rejection) => {
                debug!(%rejection, "indicator rejected");
                skipped_indicators.push(SkippedIndicator {
                    indicator_type: candidate.indicator_type.clone(),
                    value: candidate.value.clone(),
                    reason: REASON_INVALID_INDICATOR.into(),
                });
            }
        }
    }

    for candidate in &item.relationships {
        match link_candidate(graph, candidate, &local) {
            Ok(id) => refs.add(&id),
            Err(reason) => skipped_relationships.push(SkippedRelationship {
                source_name: candidate.source_name.clone(),
                relationship_type: relationship_type_or_default(candidate).to_string(),
                target_name: candidate.target_name.clone(),
                reason: reason.into(),
            }),
        }
    }

    if refs.is_empty() {
        return Ok(ArticleOutcome::Empty(Rejections {
            indicators: skipped_indicators,
            objects: skipped_objects,
            relationships: skipped_relationships,
        }));
    }

    // Attribution
    let publisher_name = [
        included.map(IncludedRow::publisher_hint),
        cleaned.map(CleanedItem::publisher_hint),
        Some(item.publisher_hint()),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.is_empty())
    .unwrap_or(UNKNOWN_PUBLISHER)
    .to_string();
    let publisher = graph.resolve_publisher(&publisher_name);
    refs.add(publisher.id());

    let author_names = [
        included.and_then(|row| row.author.as_ref()),
        cleaned.and_then(|c| c.author.as_ref()),
        item.author.as_ref(),
    ]
    .into_iter()
    .map(parse_author_field)
    .find(|names| !names.is_empty())
    .unwrap_or_default();

    // Report
    let focus_summary = cleaned.map(|c| c.focus_summary.as_str()).unwrap_or_default();
    let name = [item.title.as_str(), focus_summary]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("Untitled Report");
    let published = included
        .and_then(|row| parse_published(&row.published))
        .unwrap_or(graph.stamp().created);

    let mut report = Report::new(
        truncate_chars(name, MAX_NAME_CHARS),
        published,
        &graph.stamp().by(publisher.id()),
    );
    if !focus_summary.is_empty() {
        report.description = Some(truncate_chars(focus_summary, MAX_DESCRIPTION_CHARS));
    }
    if let Some(row) = included {
        report.labels = report_labels(row);
    }
    if !item.url.is_empty() {
        report.external_references.push(ExternalReference {
            source_name: "source".into(),
            url: Some(item.url.clone()),
            description: None,
            extra: Default::default(),
        });
    }
    if let Some(cleaned) = cleaned.filter(|_| options.embed_clean_text) {
        if !cleaned.clean_text.is_empty() {
            report
                .extra
                .insert("x_opencti_content".into(), cleaned.clean_text.clone().into());
        }
        if is_sha256_hex(&cleaned.clean_sha256) {
            report.extra.insert(
                "x_opencti_clean_sha256".into(),
                cleaned.clean_sha256.to_lowercase().into(),
            );
        }
    }
    let report_id = report.common.id.clone();

    // Authors
    let mut authors = Vec::new();
    for author_name in &author_names {
        let Some(author) = graph.resolve_author(&publisher_name, author_name) else {
            debug!(author = %author_name, "author name normalizes to nothing");
            continue;
        };
        authors.push(author_name.clone());
        refs.add(author.id());
        if let Some(edge) = graph.link(
            CREATED_BY,
            &report_id,
            author.id(),
            Some(AUTHOR_EDGE_CONFIDENCE),
        ) {
            refs.add(&edge);
        }
        if let Some(edge) = graph.link(
            RELATED_TO,
            author.id(),
            publisher.id(),
            Some(PUBLISHER_EDGE_CONFIDENCE),
        ) {
            refs.add(&edge);
        }
    }

    // Attribution note
    let raw_ref = cleaned.and_then(|c| RawTextRef::from_cleaned(&item.url, c));
    let note = Note::new(
        attribution_content(&authors, &publisher_name, raw_ref.as_ref()),
        vec![report_id.clone()],
        graph.stamp(),
    );
    refs.add(&note.common.id);

    report.object_refs = refs.ids;
    let entry = ReportEntry {
        row_num: item.row_num,
        title: item.title.clone(),
        url: item.url.clone(),
        report_id: report_id.to_string(),
        publisher: publisher_name,
        authors,
        object_refs_count: report.object_refs.len(),
        has_clean_text: cleaned.is_some_and(|c| !c.clean_text.is_empty()),
        has_raw_ref: raw_ref.is_some(),
        skipped_indicators,
        skipped_objects,
        skipped_relationships,
    };

    graph.push(report);
    graph.push(note);
    debug!(report = %report_id, refs = entry.object_refs_count, "report assembled");
    Ok(ArticleOutcome::Report(entry))
}

fn relationship_type_or_default(candidate: &CandidateRelationship) -> &str {
    if candidate.relationship_type.is_empty() {
        RELATED_TO
    } else {
        &candidate.relationship_type
    }
}

/// Link a candidate relationship between two objects of the same article.
fn link_candidate(
    graph: &mut GraphBuilder,
    candidate: &CandidateRelationship,
    local: &HashMap<(&str, &str), StixId>,
) -> std::result::Result<StixId, &'static str> {
    let endpoints = [
        &candidate.source_name,
        &candidate.source_stix_type,
        &candidate.target_name,
        &candidate.target_stix_type,
    ];
    if endpoints.iter().any(|s| s.is_empty()) {
        return Err(REASON_MISSING_ENDPOINT);
    }

    let source = local.get(&(
        candidate.source_stix_type.as_str(),
        candidate.source_name.as_str(),
    ));
    let target = local.get(&(
        candidate.target_stix_type.as_str(),
        candidate.target_name.as_str(),
    ));
    let (Some(source), Some(target)) = (source, target) else {
        debug!(
            source = %candidate.source_name,
            target = %candidate.target_name,
            "relationship endpoint not in this article"
        );
        return Err(REASON_UNRESOLVED_ENDPOINT);
    };

    graph
        .link(
            relationship_type_or_default(candidate),
            source,
            target,
            candidate.confidence,
        )
        .ok_or(REASON_DUPLICATE)
}

/// `category_main` then tags, without repeats, at most [`MAX_LABELS`].
fn report_labels(row: &IncludedRow) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(row.category_main.clone())
        .chain(row.tags.iter().flat_map(|tags| tags.to_vec()))
        .filter(|label| !label.is_empty())
        .filter(|label| seen.insert(label.clone()))
        .take(MAX_LABELS)
        .collect()
}

/// RFC 2822 (feed dates), RFC 3339, or a bare `YYYY-MM-DD`.
fn parse_published(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    let parsed = DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        });
    if parsed.is_none() {
        debug!(published = value, "unparseable published date");
    }
    parsed.map(|dt| dt.trunc_subsecs(0))
}

// ---------------------------------------------------------------------------
// Side tables
// ---------------------------------------------------------------------------

/// Cleaned items by URL; included rows by URL and by row number. First entry wins.
struct SideTables<'a> {
    cleaned_by_url: HashMap<&'a str, &'a CleanedItem>,
    included_by_url: HashMap<&'a str, &'a IncludedRow>,
    included_by_row: HashMap<u64, &'a IncludedRow>,
}

impl<'a> SideTables<'a> {
    fn new(cleaned: Option<&'a CleanedDoc>, included: Option<&'a IncludedDoc>) -> Self {
        let mut tables = Self {
            cleaned_by_url: HashMap::new(),
            included_by_url: HashMap::new(),
            included_by_row: HashMap::new(),
        };
        for item in cleaned.map(|doc| doc.items.as_slice()).unwrap_or_default() {
            if !item.url.is_empty() {
                tables.cleaned_by_url.entry(item.url.as_str()).or_insert(item);
            }
        }
        for row in included.map(|doc| doc.rows.as_slice()).unwrap_or_default() {
            if !row.url.is_empty() {
                tables.included_by_url.entry(row.url.as_str()).or_insert(row);
            }
            if let Some(row_num) = row.row_num {
                tables.included_by_row.entry(row_num).or_insert(row);
            }
        }
        tables
    }

    fn cleaned(&self, url: &str) -> Option<&'a CleanedItem> {
        self.cleaned_by_url.get(url).copied()
    }

    fn included(&self, url: &str, row_num: Option<u64>) -> Option<&'a IncludedRow> {
        self.included_by_url
            .get(url)
            .or_else(|| row_num.and_then(|n| self.included_by_row.get(&n)))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Manifest helpers
// ---------------------------------------------------------------------------

fn skipped_article(item: &ExtractedItem, reason: &str) -> SkippedArticle {
    SkippedArticle {
        row_num: item.row_num,
        title: item.title.clone(),
        url: item.url.clone(),
        retrieval_status: item.retrieval_status.clone(),
        extraction_status: item.extraction_status.clone(),
        reason: reason.to_string(),
        skipped_indicators: Vec::new(),
        skipped_objects: Vec::new(),
        skipped_relationships: Vec::new(),
    }
}

fn unreadable_item(raw: &Value, error: &str) -> SkippedArticle {
    let text = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    SkippedArticle {
        row_num: ExtractionDoc::raw_row_num(raw),
        title: text("title"),
        url: text("url"),
        retrieval_status: text("retrieval_status"),
        extraction_status: text("extraction_status"),
        reason: format!("exception: {error}"),
        skipped_indicators: Vec::new(),
        skipped_objects: Vec::new(),
        skipped_relationships: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use serde_json::json;
    use stixgraph_shared::StixGraphError;
    use stixgraph_stix::StixObject;

    fn options() -> BuildOptions {
        BuildOptions {
            creator_name: "Geopolitical Collector".into(),
            embed_clean_text: true,
            limit: None,
            now: "2025-01-06T10:00:00Z".parse().unwrap(),
        }
    }

    fn doc(items: Value) -> ExtractionDoc {
        serde_json::from_value(json!({ "items": items })).unwrap()
    }

    fn build(extraction: &ExtractionDoc) -> BuildOutcome {
        let inputs = BuildInputs {
            extraction,
            cleaned: None,
            included: None,
        };
        build_bundle(inputs, &options(), &SilentProgress)
    }

    fn example_item() -> Value {
        json!({
            "_row_num": 12,
            "title": "X Ransomware Hits Y Corp",
            "url": "https://ex.com/a",
            "retrieval_status": "ok",
            "extraction_status": "ok",
            "objects": [{"stix_type": "malware", "name": "Lockbit"}],
            "indicators": [
                {"indicator_type": "ip", "value": "203.0.113.5"},
                {"indicator_type": "other", "value": "bogus"}
            ],
            "relationships": [{
                "source_name": "Lockbit", "source_stix_type": "malware",
                "target_name": "Y Corp", "target_stix_type": "identity",
                "relationship_type": "targets"
            }]
        })
    }

    fn count(bundle: &Bundle, object_type: &str) -> usize {
        bundle
            .objects
            .iter()
            .filter(|o| o.object_type() == object_type)
            .count()
    }

    #[test]
    fn example_article() {
        let outcome = build(&doc(json!([example_item()])));
        let bundle = &outcome.bundle;

        assert_eq!(count(bundle, "malware"), 1);
        assert_eq!(count(bundle, "indicator"), 1);
        assert_eq!(count(bundle, "relationship"), 0);
        assert_eq!(count(bundle, "report"), 1);
        assert_eq!(count(bundle, "note"), 1);

        let report = bundle.objects.iter().find_map(StixObject::as_report).unwrap();
        // malware, indicator, publisher, note
        assert_eq!(report.object_refs.len(), 4);
        let note = bundle.objects.iter().find_map(StixObject::as_note).unwrap();
        assert_eq!(report.object_refs[3], note.common.id);
        assert_eq!(note.object_refs, vec![report.common.id.clone()]);
        assert!(note.content.starts_with("author: Unknown\npublisher: Unknown Publisher"));

        let publisher = bundle
            .objects
            .iter()
            .filter_map(StixObject::as_identity)
            .find(|i| i.name == UNKNOWN_PUBLISHER)
            .unwrap();
        assert_eq!(report.common.created_by_ref.as_ref(), Some(&publisher.common.id));
        assert_eq!(report.object_refs[2], publisher.common.id);

        assert_eq!(outcome.reports.len(), 1);
        let entry = &outcome.reports[0];
        assert_eq!(entry.row_num, Some(12));
        assert_eq!(entry.object_refs_count, 4);
        assert_eq!(
            entry.skipped_indicators,
            vec![SkippedIndicator {
                indicator_type: "other".into(),
                value: "bogus".into(),
                reason: "invalid_or_not_allowed_for_indicator".into(),
            }]
        );
        assert_eq!(entry.skipped_relationships[0].reason, REASON_UNRESOLVED_ENDPOINT);
        assert!(outcome.skipped.is_empty());
        assert!(bundle.dangling_refs().is_empty());
    }

    #[test]
    fn objects_are_shared_across_articles() {
        let mut second = example_item();
        second["_row_num"] = json!(13);
        second["url"] = json!("https://ex.com/b");
        let outcome = build(&doc(json!([example_item(), second])));

        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(count(&outcome.bundle, "malware"), 1);
        assert_eq!(count(&outcome.bundle, "indicator"), 1);
        assert_eq!(count(&outcome.bundle, "report"), 2);
        // Creator and one shared Unknown Publisher.
        assert_eq!(count(&outcome.bundle, "identity"), 2);
    }

    #[test]
    fn skip_reasons() {
        let outcome = build(&doc(json!([
            {"title": "t", "url": "u", "retrieval_status": "error", "extraction_status": "ok"},
            {"retrieval_status": "ok", "extraction_status": "ok",
             "objects": [{"stix_type": "malware", "name": "Lockbit"}]},
            {"title": "t", "retrieval_status": "ok", "extraction_status": "ok",
             "objects": [{"stix_type": "malware", "name": ""}]},
            "not an object"
        ])));

        let reasons: Vec<&str> = outcome.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(reasons[..3], [SKIP_NOT_OK, SKIP_NO_TITLE_OR_URL, SKIP_EMPTY]);
        assert!(reasons[3].starts_with("exception: invalid record"));
        assert_eq!(outcome.skipped[0].retrieval_status, "error");
        assert_eq!(outcome.skipped[2].skipped_objects[0].reason, REASON_MISSING_TYPE_OR_NAME);
        assert!(outcome.reports.is_empty());
        // Only the Creator remains.
        assert_eq!(outcome.bundle.objects.len(), 1);
    }

    #[test]
    fn empty_article_keeps_rejections() {
        let outcome = build(&doc(json!([{
            "_row_num": 7,
            "title": "Nothing usable", "url": "https://ex.com/e",
            "retrieval_status": "ok", "extraction_status": "ok",
            "objects": [{"stix_type": "report", "name": "Quarterly"}],
            "indicators": [{"indicator_type": "ip", "value": "999.1.1.1"}],
            "relationships": [{
                "source_name": "A", "source_stix_type": "malware",
                "target_name": "B", "target_stix_type": "tool",
                "relationship_type": "uses"
            }]
        }])));

        assert!(outcome.reports.is_empty());
        let skipped = &outcome.skipped[0];
        assert_eq!(skipped.reason, SKIP_EMPTY);
        assert_eq!(skipped.skipped_indicators[0].value, "999.1.1.1");
        assert_eq!(skipped.skipped_indicators[0].reason, REASON_INVALID_INDICATOR);
        assert_eq!(skipped.skipped_objects[0].reason, REASON_UNSUPPORTED_TYPE);
        assert_eq!(skipped.skipped_relationships[0].reason, REASON_UNRESOLVED_ENDPOINT);
        assert_eq!(skipped.skipped_relationships[0].relationship_type, "uses");

        let json = serde_json::to_string(&outcome.skipped).unwrap();
        assert!(json.contains("999.1.1.1"));
        // Only the Creator remains.
        assert_eq!(outcome.bundle.objects.len(), 1);
    }

    #[test]
    fn nameless_objects_are_recorded() {
        let outcome = build(&doc(json!([{
            "title": "t", "url": "https://ex.com/f",
            "retrieval_status": "ok", "extraction_status": "ok",
            "objects": [
                {"stix_type": "malware", "name": "Emotet"},
                {"stix_type": "tool", "name": ""},
                {"stix_type": "", "name": "Cobalt Strike"}
            ]
        }])));

        let entry = &outcome.reports[0];
        assert_eq!(
            entry.skipped_objects,
            vec![
                SkippedObject {
                    stix_type: "tool".into(),
                    name: String::new(),
                    reason: REASON_MISSING_TYPE_OR_NAME.into(),
                },
                SkippedObject {
                    stix_type: String::new(),
                    name: "Cobalt Strike".into(),
                    reason: REASON_MISSING_TYPE_OR_NAME.into(),
                },
            ]
        );
        assert_eq!(count(&outcome.bundle, "malware"), 1);
    }

    #[test]
    fn failing_article_is_rolled_back() {
        let failing = json!({
            "title": "boom", "url": "https://ex.com/boom",
            "retrieval_status": "ok", "extraction_status": "ok",
            "source": "Boom Daily",
            "author": "Jane Roe",
            "objects": [{"stix_type": "malware", "name": "Clop"}],
            "indicators": [{"indicator_type": "ip", "value": "198.51.100.7"}]
        });
        let mut after = failing.clone();
        after["title"] = json!("after");
        after["url"] = json!("https://ex.com/after");
        let extraction = doc(json!([failing, example_item(), after]));
        let inputs = BuildInputs {
            extraction: &extraction,
            cleaned: None,
            included: None,
        };

        let outcome = build_with(inputs, &options(), &SilentProgress, |graph, item, side, opts| {
            let staged = assemble_article(graph, item, side, opts)?;
            if item.title == "boom" {
                return Err(StixGraphError::validation("failed after staging"));
            }
            Ok(staged)
        });

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            outcome.skipped[0].reason,
            "exception: validation error: failed after staging"
        );
        assert_eq!(outcome.reports.len(), 2);

        let bundle = &outcome.bundle;
        assert_eq!(count(bundle, "report"), 2);
        assert_eq!(count(bundle, "note"), 2);
        // Clop, its indicator, Boom Daily and Jane Roe exist once, from "after".
        assert_eq!(bundle.objects.iter().filter(|o| o.name() == Some("Clop")).count(), 1);
        assert_eq!(
            bundle.objects.iter().filter(|o| o.name() == Some("ip:198.51.100.7")).count(),
            1
        );
        assert_eq!(bundle.objects.iter().filter(|o| o.name() == Some("Boom Daily")).count(), 1);
        assert_eq!(bundle.objects.iter().filter(|o| o.name() == Some("Jane Roe")).count(), 1);

        let clop = bundle.objects.iter().find(|o| o.name() == Some("Clop")).unwrap();
        let after_report = bundle
            .objects
            .iter()
            .filter_map(StixObject::as_report)
            .find(|r| r.name == "after")
            .unwrap();
        assert!(after_report.object_refs.contains(clop.id()));
        assert!(bundle.dangling_refs().is_empty());
    }

    #[test]
    fn relationships_within_article() {
        let outcome = build(&doc(json!([{
            "title": "t", "url": "https://ex.com/c",
            "retrieval_status": "ok", "extraction_status": "ok",
            "objects": [
                {"stix_type": "malware", "name": "Lockbit"},
                {"stix_type": "identity", "name": "Acme Health"},
                {"stix_type": "indicator", "name": "203.0.113.5"}
            ],
            "relationships": [
                {"source_name": "Lockbit", "source_stix_type": "malware",
                 "target_name": "Acme Health", "target_stix_type": "identity",
                 "relationship_type": "targets", "confidence": 70},
                {"source_name": "Lockbit", "source_stix_type": "malware",
                 "target_name": "Acme Health", "target_stix_type": "identity",
                 "relationship_type": "targets"},
                {"source_name": "Lockbit", "source_stix_type": "malware",
                 "target_name": "", "target_stix_type": "identity"}
            ]
        }])));

        let bundle = &outcome.bundle;
        assert_eq!(count(bundle, "relationship"), 1);
        let edge = bundle.objects.iter().find_map(StixObject::as_relationship).unwrap();
        assert_eq!(edge.relationship_type, "targets");
        assert_eq!(edge.common.confidence, Some(70));

        let entry = &outcome.reports[0];
        assert_eq!(entry.skipped_objects[0].reason, REASON_UNSUPPORTED_TYPE);
        let reasons: Vec<&str> = entry
            .skipped_relationships
            .iter()
            .map(|r| r.reason.as_str())
            .collect();
        assert_eq!(reasons, [REASON_DUPLICATE, REASON_MISSING_ENDPOINT]);
        assert_eq!(entry.skipped_relationships[1].relationship_type, "related-to");
    }

    #[test]
    fn attribution_from_side_tables() {
        let extraction = doc(json!([{
            "_row_num": 13,
            "title": "Lockbit hits Acme Health",
            "url": "https://ex.com/b",
            "retrieval_status": "ok", "extraction_status": "ok",
            "source": "Extractor Guess",
            "author": "Someone Else",
            "objects": [{"stix_type": "malware", "name": "Lockbit"}]
        }]));
        let cleaned: CleanedDoc = serde_json::from_value(json!({"items": [{
            "url": "https://ex.com/b",
            "focus_summary": "Lockbit affiliate breached Acme Health.",
            "clean_text": "Body",
            "clean_sha256": "A".repeat(64),
            "raw_saved_path": "raw/ex-com-b.txt",
            "raw_sha256": "b".repeat(64),
            "raw_char_len": 1834,
            "source": "BleepingComputer (mirror)"
        }]}))
        .unwrap();
        let included: IncludedDoc = serde_json::from_value(json!({"rows": [{
            "_row_num": 13,
            "source": "BleepingComputer",
            "author": "Bill Toulas and Jane Roe",
            "published": "Mon, 06 Jan 2025 10:00:00 +0000",
            "category_main": "ransomware",
            "tags": "healthcare, lockbit, ransomware"
        }]}))
        .unwrap();

        let outcome = build_bundle(
            BuildInputs {
                extraction: &extraction,
                cleaned: Some(&cleaned),
                included: Some(&included),
            },
            &options(),
            &SilentProgress,
        );
        let bundle = &outcome.bundle;
        let entry = &outcome.reports[0];
        assert_eq!(entry.publisher, "BleepingComputer");
        assert_eq!(entry.authors, vec!["Bill Toulas", "Jane Roe"]);
        assert!(entry.has_clean_text);
        assert!(entry.has_raw_ref);

        let report = bundle.objects.iter().find_map(StixObject::as_report).unwrap();
        assert_eq!(report.description.as_deref(), Some("Lockbit affiliate breached Acme Health."));
        assert_eq!(report.labels, vec!["ransomware", "healthcare", "lockbit"]);
        assert_eq!(report.published.to_rfc3339(), "2025-01-06T10:00:00+00:00");
        assert_eq!(report.extra["x_opencti_content"], "Body");
        assert_eq!(report.extra["x_opencti_clean_sha256"], "a".repeat(64));
        assert_eq!(report.external_references[0].url.as_deref(), Some("https://ex.com/b"));

        // malware, publisher, 2 authors, 2 x (created-by, related-to), note
        assert_eq!(report.object_refs.len(), 9);
        assert_eq!(count(bundle, "relationship"), 4);
        let authors: Vec<_> = bundle
            .objects
            .iter()
            .filter_map(StixObject::as_identity)
            .filter(|i| i.identity_class == Some(stixgraph_stix::IdentityClass::Individual))
            .collect();
        assert_eq!(authors.len(), 2);

        let note = bundle.objects.iter().find_map(StixObject::as_note).unwrap();
        assert!(note.content.starts_with("author: Bill Toulas; Jane Roe\npublisher: BleepingComputer\n"));
        assert!(note.content.contains("- raw_saved_path: raw/ex-com-b.txt"));
        assert!(bundle.dangling_refs().is_empty());
    }

    #[test]
    fn embed_clean_text_off() {
        let extraction = doc(json!([example_item()]));
        let cleaned: CleanedDoc = serde_json::from_value(json!({"items": [{
            "url": "https://ex.com/a", "clean_text": "Body"
        }]}))
        .unwrap();
        let mut opts = options();
        opts.embed_clean_text = false;
        let outcome = build_bundle(
            BuildInputs {
                extraction: &extraction,
                cleaned: Some(&cleaned),
                included: None,
            },
            &opts,
            &SilentProgress,
        );
        let report = outcome.bundle.objects.iter().find_map(StixObject::as_report).unwrap();
        assert!(!report.extra.contains_key("x_opencti_content"));
        assert!(outcome.reports[0].has_clean_text);
    }

    #[test]
    fn limit_cuts_items() {
        let mut second = example_item();
        second["url"] = json!("https://ex.com/b");
        let extraction = doc(json!([example_item(), second]));
        let mut opts = options();
        opts.limit = Some(1);
        let outcome = build_bundle(
            BuildInputs {
                extraction: &extraction,
                cleaned: None,
                included: None,
            },
            &opts,
            &SilentProgress,
        );
        assert_eq!(outcome.reports.len() + outcome.skipped.len(), 1);
    }

    #[test]
    fn published_formats() {
        assert_eq!(
            parse_published("2025-01-06").map(|d| d.to_rfc3339()),
            Some("2025-01-06T00:00:00+00:00".into())
        );
        assert_eq!(
            parse_published("2025-01-06T10:00:00.750+02:00").map(|d| d.to_rfc3339()),
            Some("2025-01-06T08:00:00+00:00".into())
        );
        assert!(parse_published("not a date").is_none());
        assert!(parse_published("").is_none());
    }

    #[test]
    fn fixture_build() {
        let read = |name: &str| {
            std::fs::read_to_string(format!("../../../fixtures/json/{name}")).expect("read fixture")
        };
        let extraction: ExtractionDoc = serde_json::from_str(&read("extracted.fixture.json")).unwrap();
        let cleaned: CleanedDoc = serde_json::from_str(&read("cleaned.fixture.json")).unwrap();
        let included: IncludedDoc = serde_json::from_str(&read("included.fixture.json")).unwrap();

        let outcome = build_bundle(
            BuildInputs {
                extraction: &extraction,
                cleaned: Some(&cleaned),
                included: Some(&included),
            },
            &options(),
            &SilentProgress,
        );

        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.bundle.dangling_refs().is_empty());
        // Lockbit and 203.0.113.5 appear in both articles but exist once.
        assert_eq!(count(&outcome.bundle, "malware"), 1);
        assert_eq!(
            outcome.bundle.objects.iter().filter(|o| o.name() == Some("ip:203.0.113.5")).count(),
            1
        );
    }
}

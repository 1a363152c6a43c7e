//! File-level runs: read the input documents, call the assembler or the
//! enrichment pass, and write the results.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use stixgraph_shared::{
    BuildManifest, CleanedDoc, ExtractionDoc, IncludedDoc, Result, StixGraphError,
};
use stixgraph_stix::{Bundle, EnrichmentSummary};

use crate::assembler::{BuildInputs, BuildOptions, build_bundle};
use crate::enrichment::{EnrichOptions, enrich_bundle};

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each article or report is processed.
    fn item(&self, current: usize, total: usize, label: &str);
    /// Called when the run completes.
    fn finish(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _label: &str) {}
    fn finish(&self) {}
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Inputs and outputs of one `build` run.
#[derive(Debug, Clone)]
pub struct BuildRun {
    pub extracted: PathBuf,
    /// Optional side table; a missing file is logged and ignored.
    pub cleaned: PathBuf,
    /// Optional side table; a missing file is logged and ignored.
    pub included: PathBuf,
    pub out_bundle: PathBuf,
    pub out_manifest: PathBuf,
    pub creator_name: String,
    pub embed_clean_text: bool,
    pub limit: Option<usize>,
}

/// Counts reported after a `build` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub reports: usize,
    pub skipped: usize,
    pub objects: usize,
    pub dangling_refs: usize,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reports={} skipped={} objects={}",
            self.reports, self.skipped, self.objects
        )
    }
}

/// Read the inputs, assemble the bundle, and write bundle plus manifest.
#[instrument(skip_all, fields(extracted = %run.extracted.display()))]
pub fn run_build(run: &BuildRun, progress: &dyn ProgressReporter) -> Result<BuildSummary> {
    let start = Instant::now();

    progress.phase("Reading inputs");
    let extraction: ExtractionDoc = read_required(&run.extracted, "extracted")?;
    let cleaned: Option<CleanedDoc> = read_optional(&run.cleaned, "cleaned")?;
    let included: Option<IncludedDoc> = read_optional(&run.included, "included")?;
    info!(
        items = extraction.items.len(),
        cleaned = cleaned.as_ref().map_or(0, |d| d.items.len()),
        included = included.as_ref().map_or(0, |d| d.rows.len()),
        "inputs loaded"
    );

    progress.phase("Assembling reports");
    let now = Utc::now();
    let options = BuildOptions {
        creator_name: run.creator_name.clone(),
        embed_clean_text: run.embed_clean_text,
        limit: run.limit,
        now,
    };
    let outcome = build_bundle(
        BuildInputs {
            extraction: &extraction,
            cleaned: cleaned.as_ref(),
            included: included.as_ref(),
        },
        &options,
        progress,
    );

    let dangling = outcome.bundle.dangling_refs();
    for d in &dangling {
        warn!(from = %d.from, missing = %d.missing, "dangling reference");
    }

    progress.phase("Writing bundle");
    let mut manifest = BuildManifest::new(now, run.extracted.display().to_string());
    manifest.input_cleaned = cleaned.is_some().then(|| run.cleaned.display().to_string());
    manifest.input_included = included
        .is_some()
        .then(|| run.included.display().to_string());
    manifest.limit = run.limit;
    manifest.reports = outcome.reports;
    manifest.skipped = outcome.skipped;

    write_json_atomic(&run.out_bundle, &outcome.bundle)?;
    write_json_atomic(&run.out_manifest, &manifest)?;
    progress.finish();

    let summary = BuildSummary {
        reports: manifest.reports.len(),
        skipped: manifest.skipped.len(),
        objects: outcome.bundle.objects.len(),
        dangling_refs: dangling.len(),
    };
    info!(
        reports = summary.reports,
        skipped = summary.skipped,
        objects = summary.objects,
        bundle = %run.out_bundle.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "build complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

/// Inputs and outputs of one `enrich` run.
#[derive(Debug, Clone)]
pub struct EnrichRun {
    pub in_bundle: PathBuf,
    pub out_bundle: PathBuf,
    pub raw_base: Option<PathBuf>,
    pub creator_name: String,
    /// Run the pass but write nothing.
    pub dry_run: bool,
}

/// Read a bundle, enrich it, and write it unless this is a dry run.
#[instrument(skip_all, fields(in_bundle = %run.in_bundle.display(), dry_run = run.dry_run))]
pub fn run_enrich(run: &EnrichRun, progress: &dyn ProgressReporter) -> Result<EnrichmentSummary> {
    let start = Instant::now();

    progress.phase("Reading bundle");
    let text = read_text(&run.in_bundle, "bundle")?;
    let mut bundle = Bundle::from_json(&text)?;
    info!(objects = bundle.objects.len(), "bundle loaded");

    progress.phase("Enriching reports");
    let options = EnrichOptions {
        creator_name: run.creator_name.clone(),
        raw_base: run.raw_base.clone(),
        now: Utc::now(),
    };
    let summary = enrich_bundle(&mut bundle, &options, progress)?;

    if run.dry_run {
        info!("dry run, nothing written");
    } else {
        progress.phase("Writing bundle");
        write_json_atomic(&run.out_bundle, &bundle)?;
    }
    progress.finish();

    info!(
        out_bundle = %run.out_bundle.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "enrich complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn read_text(path: &Path, what: &str) -> Result<String> {
    if !path.exists() {
        return Err(StixGraphError::validation(format!(
            "missing {what} input: {}",
            path.display()
        )));
    }
    std::fs::read_to_string(path).map_err(|e| StixGraphError::io(path, e))
}

fn parse_json<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| StixGraphError::parse(format!("{}: {e}", path.display())))
}

fn read_required<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = read_text(path, what)?;
    parse_json(path, &text)
}

fn read_optional<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
    if !path.exists() {
        warn!(path = %path.display(), "{what} input not found, continuing without it");
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|e| StixGraphError::io(path, e))?;
    parse_json(path, &text).map(Some)
}

/// Pretty-print `data` to `path` via a temp file and rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        StixGraphError::validation(format!("JSON serialization failed: {e}"))
    })?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StixGraphError::io(parent, e))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            StixGraphError::validation(format!("not a file path: {}", path.display()))
        })?;
    let temp = parent.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, json.as_bytes()).map_err(|e| StixGraphError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| StixGraphError::io(path, e))?;

    debug!(path = %path.display(), size = json.len(), "wrote JSON file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use stixgraph_stix::{IdentityClass, StixObject};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sg-pipeline-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from("../../../fixtures/json").join(name)
    }

    fn build_run(out: &Path) -> BuildRun {
        BuildRun {
            extracted: fixture("extracted.fixture.json"),
            cleaned: fixture("cleaned.fixture.json"),
            included: fixture("included.fixture.json"),
            out_bundle: out.join("out/stix_bundle.json"),
            out_manifest: out.join("out/bundle_manifest.json"),
            creator_name: "Geopolitical Collector".into(),
            embed_clean_text: true,
            limit: None,
        }
    }

    #[test]
    fn build_writes_bundle_and_manifest() {
        let tmp = temp_dir();
        let run = build_run(&tmp);
        let summary = run_build(&run, &SilentProgress).unwrap();

        assert_eq!(summary.reports, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.dangling_refs, 0);
        assert_eq!(
            summary.to_string(),
            format!("reports=2 skipped=2 objects={}", summary.objects)
        );

        let bundle = Bundle::from_json(&std::fs::read_to_string(&run.out_bundle).unwrap()).unwrap();
        assert_eq!(bundle.objects.len(), summary.objects);

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(&run.out_manifest).unwrap()).unwrap();
        assert_eq!(manifest["reports"].as_array().unwrap().len(), 2);
        assert_eq!(manifest["skipped"].as_array().unwrap().len(), 2);
        assert!(manifest["input_cleaned"].is_string());
        assert!(manifest.get("limit").is_none());

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_extracted_is_fatal() {
        let tmp = temp_dir();
        let mut run = build_run(&tmp);
        run.extracted = tmp.join("nope.json");
        let err = run_build(&run, &SilentProgress).unwrap_err();
        assert!(err.to_string().contains("missing extracted input"));
        assert!(!run.out_bundle.exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_side_tables_are_tolerated() {
        let tmp = temp_dir();
        let mut run = build_run(&tmp);
        run.cleaned = tmp.join("no-cleaned.json");
        run.included = tmp.join("no-included.json");
        let summary = run_build(&run, &SilentProgress).unwrap();
        assert_eq!(summary.reports, 2);

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(&run.out_manifest).unwrap()).unwrap();
        assert!(manifest.get("input_cleaned").is_none());
        assert!(manifest.get("input_included").is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_input_is_fatal() {
        let tmp = temp_dir();
        let mut run = build_run(&tmp);
        run.extracted = tmp.join("bad.json");
        std::fs::write(&run.extracted, "{ not json").unwrap();
        let err = run_build(&run, &SilentProgress).unwrap_err();
        assert!(matches!(err, StixGraphError::Parse { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn enrich_round_trip_and_dry_run() {
        let tmp = temp_dir();
        let build = build_run(&tmp);
        run_build(&build, &SilentProgress).unwrap();

        let dry = EnrichRun {
            in_bundle: build.out_bundle.clone(),
            out_bundle: tmp.join("out/stix_bundle_enriched.json"),
            raw_base: Some(PathBuf::from("../../../fixtures")),
            creator_name: "Geopolitical Collector".into(),
            dry_run: true,
        };
        let summary = run_enrich(&dry, &SilentProgress).unwrap();
        assert_eq!(summary.stage, "enrich_authors");
        assert!(!dry.out_bundle.exists());

        let wet = EnrichRun {
            dry_run: false,
            ..dry
        };
        run_enrich(&wet, &SilentProgress).unwrap();
        let enriched =
            Bundle::from_json(&std::fs::read_to_string(&wet.out_bundle).unwrap()).unwrap();
        assert!(enriched.x_enriched_at.is_some());
        assert!(enriched.dangling_refs().is_empty());

        // The byline names the same authors the build already attached.
        let again = EnrichRun {
            in_bundle: wet.out_bundle.clone(),
            ..wet
        };
        let summary = run_enrich(&again, &SilentProgress).unwrap();
        assert_eq!(summary.changed_reports, 0);
        assert_eq!(summary.added_identities, 0);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn enrich_attaches_byline_authors_from_raw_text() {
        let tmp = temp_dir();
        let build = BuildRun {
            // No included rows, so the build attaches no authors.
            included: tmp.join("absent.json"),
            ..build_run(&tmp)
        };
        run_build(&build, &SilentProgress).unwrap();

        let run = EnrichRun {
            in_bundle: build.out_bundle.clone(),
            out_bundle: tmp.join("out/stix_bundle_enriched.json"),
            raw_base: Some(PathBuf::from("../../../fixtures")),
            creator_name: "Geopolitical Collector".into(),
            dry_run: false,
        };
        let summary = run_enrich(&run, &SilentProgress).unwrap();
        assert_eq!(summary.changed_reports, 1);
        assert_eq!(summary.added_identities, 2);
        // created-by and related-to per author
        assert_eq!(summary.added_relationships, 4);
        assert_eq!(summary.updated_notes, 1);

        let enriched =
            Bundle::from_json(&std::fs::read_to_string(&run.out_bundle).unwrap()).unwrap();
        assert!(enriched.dangling_refs().is_empty());

        let authors: Vec<_> = enriched
            .objects
            .iter()
            .filter_map(StixObject::as_identity)
            .filter(|i| i.identity_class == Some(IdentityClass::Individual))
            .collect();
        let mut names: Vec<&str> = authors.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["Bill Toulas", "Jane Roe"]);

        let report = enriched
            .objects
            .iter()
            .filter_map(StixObject::as_report)
            .find(|r| r.external_references.iter().any(|e| e.url.as_deref() == Some("https://ex.com/b")))
            .unwrap();
        let created_by: Vec<_> = enriched
            .objects
            .iter()
            .filter_map(StixObject::as_relationship)
            .filter(|r| r.relationship_type == "created-by" && r.source_ref == report.common.id)
            .collect();
        assert_eq!(created_by.len(), 2);
        for author in &authors {
            assert!(created_by.iter().any(|r| r.target_ref == author.common.id));
            assert!(report.object_refs.contains(&author.common.id));
        }

        let note = enriched
            .objects
            .iter()
            .filter_map(StixObject::as_note)
            .find(|n| n.object_refs.contains(&report.common.id))
            .unwrap();
        assert!(note.content.starts_with("author: Bill Toulas; Jane Roe\n"));

        let again = EnrichRun {
            in_bundle: run.out_bundle.clone(),
            ..run
        };
        let summary = run_enrich(&again, &SilentProgress).unwrap();
        assert_eq!(summary.changed_reports, 0);
        assert_eq!(summary.added_identities, 0);
        assert_eq!(summary.added_relationships, 0);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn enrich_rejects_non_bundle() {
        let tmp = temp_dir();
        let path = tmp.join("not-a-bundle.json");
        std::fs::write(&path, r#"{"type": "report", "id": "report--1"}"#).unwrap();
        let run = EnrichRun {
            in_bundle: path.clone(),
            out_bundle: path,
            raw_base: None,
            creator_name: "Geopolitical Collector".into(),
            dry_run: true,
        };
        assert!(run_enrich(&run, &SilentProgress).is_err());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn atomic_write_creates_parents() {
        let tmp = temp_dir();
        let path = tmp.join("a/b/c.json");
        write_json_atomic(&path, &serde_json::json!({"ok": true})).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"ok\": true"));
        assert!(!tmp.join("a/b/.c.json.tmp").exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}

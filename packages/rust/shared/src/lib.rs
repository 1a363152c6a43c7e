//! Shared types, error model, and configuration for stixgraph.
//!
//! This crate is the foundation depended on by all other stixgraph crates.
//! It provides:
//! - [`StixGraphError`]: the unified error type
//! - Input record types ([`ExtractionDoc`], [`ExtractedItem`], [`CleanedItem`], [`IncludedRow`])
//! - Manifest types ([`BuildManifest`], [`ReportEntry`], [`SkippedArticle`])
//! - Configuration ([`AppConfig`], [`DataPaths`], config loading)

pub mod config;
pub mod error;
pub mod manifest;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, CreatorConfig, DataPaths, PathsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, StixGraphError};
pub use manifest::{
    BuildManifest, ReportEntry, SkippedArticle, SkippedIndicator, SkippedObject,
    SkippedRelationship,
};
pub use types::{
    AuthorField, CandidateIndicator, CandidateObject, CandidateRelationship, CleanedDoc,
    CleanedItem, ExtractedItem, ExtractionDoc, IncludedDoc, IncludedRow, TagsField,
};

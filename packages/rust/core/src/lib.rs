//! Graph assembly and enrichment for stixgraph.
//!
//! [`assembler::build_bundle`] turns extraction records into one STIX bundle
//! with a Report per article; [`enrichment::enrich_bundle`] adds Author
//! identities found in raw article bylines. [`pipeline`] wraps both with
//! file I/O for the CLI.

pub mod assembler;
pub mod authors;
pub mod enrichment;
pub mod graph;
pub mod note;
pub mod pipeline;
pub mod registry;

//! # strata
//!
//! Structure-aware chunking of technical manuals for retrieval pipelines.
//!
//! ## The Problem
//!
//! Service manuals are deep hierarchies: groups, sections, procedures,
//! numbered steps. A retrieval system that chunks them by size alone will
//! happily separate a `WARNING:` from the steps it governs, split a
//! torque table in half, or start a chunk at step (4) with no idea which
//! procedure it belongs to.
//!
//! Each manual also spells its hierarchy differently:
//!
//! ```text
//! 1999 Jeep XJ:        7 Cooling System / SERVICE PROCEDURES / (1) Remove...
//! 1953 Willys CJ:      B  ENGINE / B-4. Valve Adjustment / a. Loosen...
//! Army TM 9-8014:      CHAPTER 3 / Section IV / 69. Generator / (1) ...
//! ```
//!
//! So nothing about a particular manual is hard-coded. A YAML *profile*
//! describes its hierarchy patterns, step markers, callout keywords and
//! size thresholds, and the pipeline is driven entirely by it.
//!
//! ## Pipeline
//!
//! ```text
//! pages ─► detect_boundaries ─► filter_boundaries ─► build_manifest ─► assemble_chunks ─► chunks
//!           (open-level          (known ids, blank     (ids, lineage)    (rules R1..R8,
//!            state machine)       line, gap, content)                     cross-entry merge)
//! ```
//!
//! All stages are pure functions of the pages and the profile. Only profile
//! loading can fail; a document with no recognizable structure simply yields
//! no chunks.
//!
//! ## Line Numbering
//!
//! Positions are global line numbers over the whole document, i.e. indices
//! into `pages.join("\n").split('\n')`. Pages are 0-based.
//!
//! ## Chunk Ids
//!
//! ```text
//! xj-1999::7::SERVICE PROCEDURES::RADIATOR DRAINING
//! ^^^^^^^  ^  ^^^^^^^^^^^^^^^^^^  ^^^^^^^^^^^^^^^^^
//! document │  level 2             level 3
//!          level 1
//! ```
//!
//! An entry split into several chunks gains a `::part1`, `::part2`, ... suffix.
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::{chunk_document, Profile};
//!
//! let yaml = r#"
//! manual_id: demo
//! manual_title: Demo Manual
//! source_url: https://example.com/demo.pdf
//! source_format: pdf-native
//! vehicles: [{model: Demo, years: "2000"}]
//! structure:
//!   hierarchy:
//!     - {level: 1, name: group, id_pattern: '^(\d+)\s+[A-Z][a-z]'}
//!   step_patterns: ['^\((\d+)\)\s']
//! "#;
//! let profile = Profile::from_yaml_str(yaml)?;
//!
//! let page = "7 Cooling System\n\n(1) Drain the radiator.\n(2) Remove the hoses.";
//! let chunks = chunk_document(&[page], &profile);
//!
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_id, "demo::7");
//! # Ok::<(), strata::Error>(())
//! ```
//!
//! ## Assembly Rules
//!
//! | Rule | Effect |
//! |------|--------|
//! | R1 | the entry's span is the primary unit |
//! | R3 | a numbered step run is never split |
//! | R4 | warnings, cautions and notes travel with what follows them |
//! | R5 | tables stay whole |
//! | R2 | anything over the ceiling is split recursively |
//! | R6 | undersized fragments merge forward |
//! | R7 | reference-only blocks merge into the preceding fragment |
//! | R8 | a fragment opening on a figure reference joins the preceding one |
//!
//! Protective rules run before size rules; the order is fixed.

mod assemble;
mod boundary;
mod capacity;
mod chunk;
mod detect;
mod error;
mod filter;
mod manifest;
mod profile;
mod qa;
mod recursive;
mod rules;

pub use assemble::{
    assemble_chunks, compose_hierarchical_header, draft_entries, merge_small_drafts, Draft,
    MAX_MERGE_PASSES,
};
pub use boundary::{
    detect_boundaries, document_lines, validate_boundaries, Boundary, BoundaryStats, OpenLevel,
};
pub use capacity::ChunkBudget;
pub use chunk::{load_chunks, read_chunks, save_chunks, write_chunks, Chunk, EMBEDDING_BODY_WORDS};
pub use detect::{
    applicability, detect_safety_callouts, detect_step_sequences, detect_tables, Applicability,
    CalloutBlock, APPLIES_TO_ALL,
};
pub use error::{Error, Result};
pub use filter::filter_boundaries;
pub use manifest::{
    build_manifest, generate_chunk_id, level1_segment, LineRange, Manifest, ManifestEntry,
    PageRange, ID_DELIMITER,
};
pub use profile::{
    CalloutLevel, HierarchyLevel, LevelFilter, Profile, ProfileSpec, SafetyCallout,
    CURRENT_SCHEMA_VERSION,
};
pub use qa::{
    check_cross_ref_validity, check_duplicate_content, check_metadata_completeness,
    check_orphaned_steps, check_profile_validation, check_size_outliers,
    check_split_safety_callouts, run_validation_suite, Severity, ValidationIssue,
    ValidationReport,
};
pub use recursive::RecursiveSplitter;
pub use rules::{apply_rules, Fragment, FragmentKind};

/// Run the whole pipeline: detect, filter, build the manifest, assemble.
///
/// Returns an empty vector when the document has no recognizable structure.
#[must_use]
pub fn chunk_document<S: AsRef<str>>(pages: &[S], profile: &Profile) -> Vec<Chunk> {
    let manifest = document_manifest(pages, profile);
    assemble_chunks(pages, &manifest, profile)
}

/// Detect, filter and build the manifest for a document.
#[must_use]
pub fn document_manifest<S: AsRef<str>>(pages: &[S], profile: &Profile) -> Manifest {
    let detected = detect_boundaries(pages, profile);
    let boundaries = filter_boundaries(&detected, profile, pages);
    let manifest = build_manifest(&boundaries, profile);
    tracing::debug!(entries = manifest.len(), "built manifest");
    if manifest.is_empty() {
        tracing::warn!(document = profile.document_id(), "no structural boundaries found");
    }
    manifest
}

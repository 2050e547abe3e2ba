//! Offline QA over an assembled chunk list.
//!
//! Each check is a plain function from chunks to issues, so callers can run
//! one in isolation. [`run_validation_suite`] runs all of them.
//!
//! | Check | Severity |
//! |---|---|
//! | `orphaned_steps` | warning |
//! | `split_safety_callouts` | error (warning/caution), warning (note) |
//! | `size_outliers` | warning |
//! | `metadata_completeness` | error |
//! | `duplicate_content` | warning |
//! | `cross_ref_validity` | error, or warning into a skipped section |
//! | `profile_validation` | warning |

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use unicode_segmentation::UnicodeSegmentation;

use crate::capacity::ChunkBudget;
use crate::chunk::Chunk;
use crate::detect::{self, first_group, is_start_marker};
use crate::manifest::ID_DELIMITER;
use crate::profile::{CalloutLevel, Profile};

/// Default lower size bound for [`check_size_outliers`].
pub const DEFAULT_MIN_TOKENS: usize = 100;
/// Default upper size bound for [`check_size_outliers`].
pub const DEFAULT_MAX_TOKENS: usize = 3000;
/// Default Jaccard threshold for [`check_duplicate_content`].
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// How bad an issue is. Only errors fail a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the suite.
    Error,
    /// Reported only.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
        })
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Name of the check that produced it.
    pub check: &'static str,
    /// Severity.
    pub severity: Severity,
    /// Chunk the issue is about.
    pub chunk_id: String,
    /// Human-readable description.
    pub message: String,
    /// Check-specific data.
    pub details: Value,
}

impl ValidationIssue {
    fn new(check: &'static str, severity: Severity, chunk_id: &str, message: String) -> Self {
        Self {
            check,
            severity,
            chunk_id: chunk_id.to_string(),
            message,
            details: json!({}),
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Result of [`run_validation_suite`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Chunks inspected.
    pub total_chunks: usize,
    /// Every issue, grouped by check in run order.
    pub issues: Vec<ValidationIssue>,
    /// Names of the checks that ran.
    pub checks_run: Vec<&'static str>,
    /// True when there are no errors.
    pub passed: bool,
}

impl ValidationReport {
    /// Number of error issues.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Number of warning issues.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

// =============================================================================
// Checks
// =============================================================================

/// Chunks whose first line is a step that does not start a sequence.
#[must_use]
pub fn check_orphaned_steps(chunks: &[Chunk], step_patterns: &[Regex]) -> Vec<ValidationIssue> {
    chunks
        .iter()
        .filter_map(|chunk| {
            let line = first_line(&chunk.text)?;
            let marker = step_patterns.iter().find_map(|p| {
                let caps = p.captures(line)?;
                first_group(&caps).map(|m| m.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            })?;
            (!is_start_marker(&marker)).then(|| {
                ValidationIssue::new(
                    "orphaned_steps",
                    Severity::Warning,
                    &chunk.chunk_id,
                    format!("chunk starts mid-sequence at step '{marker}'"),
                )
                .with_details(json!({ "marker": marker }))
            })
        })
        .collect()
}

/// Chunks made of nothing but safety callouts.
///
/// A warning or caution cut away from the procedure it governs is an error;
/// a lone note is only a warning.
#[must_use]
pub fn check_split_safety_callouts(chunks: &[Chunk], profile: &Profile) -> Vec<ValidationIssue> {
    chunks
        .iter()
        .filter(|chunk| detect::is_callout_only(&chunk.text, profile))
        .map(|chunk| {
            let levels = detect::safety_levels(&chunk.text, profile);
            let severity = if levels.iter().all(|l| *l == CalloutLevel::Note) {
                Severity::Warning
            } else {
                Severity::Error
            };
            let names: Vec<&str> = levels.iter().map(|l| l.as_str()).collect();
            ValidationIssue::new(
                "split_safety_callouts",
                severity,
                &chunk.chunk_id,
                format!("chunk contains only safety callouts ({})", names.join(", ")),
            )
            .with_details(json!({ "levels": names }))
        })
        .collect()
}

/// Chunks outside `min_tokens..=max_tokens`.
#[must_use]
pub fn check_size_outliers(chunks: &[Chunk], min_tokens: usize, max_tokens: usize) -> Vec<ValidationIssue> {
    let budget = ChunkBudget::new(min_tokens, max_tokens);
    chunks
        .iter()
        .filter_map(|chunk| {
            let tokens = budget.estimate(&chunk.text);
            let bound = match budget.fits(tokens) {
                std::cmp::Ordering::Less => "below minimum",
                std::cmp::Ordering::Greater => "above maximum",
                std::cmp::Ordering::Equal => return None,
            };
            Some(
                ValidationIssue::new(
                    "size_outliers",
                    Severity::Warning,
                    &chunk.chunk_id,
                    format!("{tokens} tokens is {bound} ({min_tokens}..={max_tokens})"),
                )
                .with_details(json!({ "tokens": tokens, "min": min_tokens, "max": max_tokens })),
            )
        })
        .collect()
}

const REQUIRED_METADATA: &[&str] = &["document_id", "level1_id", "content_type"];

/// Chunks missing `document_id`, `level1_id` or `content_type`.
#[must_use]
pub fn check_metadata_completeness(chunks: &[Chunk]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for chunk in chunks {
        for key in REQUIRED_METADATA {
            if chunk.meta_str(key).map_or(true, str::is_empty) {
                issues.push(
                    ValidationIssue::new(
                        "metadata_completeness",
                        Severity::Error,
                        &chunk.chunk_id,
                        format!("missing metadata field '{key}'"),
                    )
                    .with_details(json!({ "field": key })),
                );
            }
        }
    }
    issues
}

fn word_set(text: &str) -> HashSet<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Jaccard similarity of two word sets; zero when both are empty.
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Pairs of chunks in the same document whose word sets nearly coincide.
///
/// Quadratic in the chunk count.
#[must_use]
pub fn check_duplicate_content(chunks: &[Chunk], similarity_threshold: f64) -> Vec<ValidationIssue> {
    let sets: Vec<HashSet<String>> = chunks.iter().map(|c| word_set(&c.text)).collect();
    let mut issues = Vec::new();
    for (i, a) in chunks.iter().enumerate() {
        for (j, b) in chunks.iter().enumerate().skip(i + 1) {
            if a.document_id != b.document_id {
                continue;
            }
            let similarity = jaccard(&sets[i], &sets[j]);
            if similarity >= similarity_threshold {
                issues.push(
                    ValidationIssue::new(
                        "duplicate_content",
                        Severity::Warning,
                        &b.chunk_id,
                        format!("near-duplicate of {} (similarity {similarity:.2})", a.chunk_id),
                    )
                    .with_details(json!({ "duplicate_of": a.chunk_id, "similarity": similarity })),
                );
            }
        }
    }
    issues
}

/// Whether `target` names any chunk in `ids`.
///
/// Tried in order: exact id, a descendant (`target::...`), a string prefix
/// (`doc::8` reaches `doc::8A`), and a trailing run of whole segments
/// (`doc::69` reaches `doc::1::IV::69`).
#[must_use]
pub fn resolves(target: &str, ids: &[&str]) -> bool {
    if ids.contains(&target) {
        return true;
    }
    let descendant = format!("{target}{ID_DELIMITER}");
    if ids.iter().any(|id| id.starts_with(&descendant)) {
        return true;
    }
    if ids.iter().any(|id| id.starts_with(target)) {
        return true;
    }
    let Some((_, tail)) = target.split_once(ID_DELIMITER) else {
        return false;
    };
    let suffix = format!("{ID_DELIMITER}{tail}");
    ids.iter().any(|id| id.ends_with(&suffix))
}

/// Cross references that resolve to no chunk.
///
/// With a profile, a dangling reference into a skip namespace is a warning,
/// since its target was excluded on purpose.
#[must_use]
pub fn check_cross_ref_validity(chunks: &[Chunk], profile: Option<&Profile>) -> Vec<ValidationIssue> {
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    let mut issues = Vec::new();
    for chunk in chunks {
        for target in chunk.meta_list("cross_references") {
            if resolves(target, &ids) {
                continue;
            }
            let skipped = profile.is_some_and(|p| p.is_skipped(target));
            let issue = if skipped {
                ValidationIssue::new(
                    "cross_ref_validity",
                    Severity::Warning,
                    &chunk.chunk_id,
                    format!("cross reference '{target}' points into a skipped section"),
                )
            } else {
                ValidationIssue::new(
                    "cross_ref_validity",
                    Severity::Error,
                    &chunk.chunk_id,
                    format!("cross reference '{target}' does not resolve to any chunk"),
                )
            };
            issues.push(issue.with_details(json!({ "target": target, "skipped": skipped })));
        }
    }
    issues
}

/// Chunks whose `level1_id` is not a known level-1 id.
///
/// Profiles without a level-1 known-id list produce no issues.
#[must_use]
pub fn check_profile_validation(chunks: &[Chunk], profile: &Profile) -> Vec<ValidationIssue> {
    let Some(level) = profile.level(1).filter(|l| !l.known_ids.is_empty()) else {
        return Vec::new();
    };
    chunks
        .iter()
        .filter_map(|chunk| {
            let id = chunk.meta_str("level1_id")?;
            (!level.is_known(id)).then(|| {
                ValidationIssue::new(
                    "profile_validation",
                    Severity::Warning,
                    &chunk.chunk_id,
                    format!("level1_id '{id}' is not a known {} id", level.name),
                )
                .with_details(json!({ "level1_id": id }))
            })
        })
        .collect()
}

/// Run every check with its defaults.
#[must_use]
pub fn run_validation_suite(chunks: &[Chunk], profile: &Profile) -> ValidationReport {
    let runs: [(&'static str, Vec<ValidationIssue>); 7] = [
        ("orphaned_steps", check_orphaned_steps(chunks, profile.step_patterns())),
        ("split_safety_callouts", check_split_safety_callouts(chunks, profile)),
        (
            "size_outliers",
            check_size_outliers(chunks, DEFAULT_MIN_TOKENS, DEFAULT_MAX_TOKENS),
        ),
        ("metadata_completeness", check_metadata_completeness(chunks)),
        (
            "duplicate_content",
            check_duplicate_content(chunks, DEFAULT_SIMILARITY_THRESHOLD),
        ),
        ("cross_ref_validity", check_cross_ref_validity(chunks, Some(profile))),
        ("profile_validation", check_profile_validation(chunks, profile)),
    ];

    let mut checks_run = Vec::with_capacity(runs.len());
    let mut issues = Vec::new();
    for (name, found) in runs {
        tracing::debug!(check = name, issues = found.len(), "qa check");
        checks_run.push(name);
        issues.extend(found);
    }
    let passed = !issues.iter().any(|i| i.severity == Severity::Error);
    ValidationReport {
        total_chunks: chunks.len(),
        issues,
        checks_run,
        passed,
    }
}

//! Text detectors shared by the assembly rules and chunk metadata.
//!
//! Everything here is line-oriented and profile-driven. Detectors never
//! decide what to do with what they find; the rules in [`crate::rules`] do.
//!
//! ## Step Runs
//!
//! ```text
//! (1) Remove the drain plug.          run 1
//! (2) Allow the oil to drain          run 1
//! completely.                         run 1 (continuation)
//!
//! (3) Install the drain plug.         run 1 (blank lines between steps are fine)
//!
//! Refill as follows.                  not a step: closes run 1
//! (1) Fill the crankcase.             run 2
//! (2) Start the engine.               run 2
//! (1) Check the level.                run 3 ("1" again: a different procedure)
//! ```
//!
//! ## Tables
//!
//! Scanned specification tables survive OCR mostly as leader dots:
//!
//! ```text
//! Engine Oil Capacity:                        <- header (one line)
//!   2.5L I4 .............. 4 quarts           <- table line
//!   4.0L I6 .............. 6 quarts
//! Coolant Capacity:                           <- gap line (up to 3 tolerated)
//!   2.5L I4 .............. 9.0 quarts
//! ```

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::profile::{CalloutLevel, Profile};

/// Step markers that begin a new numbering sequence.
const START_MARKERS: &[&str] = &["1", "a", "A", "i", "I"];

/// Maximum non-table lines tolerated inside a table.
pub const TABLE_GAP_LINES: usize = 3;

/// A line above a table is taken as its header only up to this many words.
pub const TABLE_HEADER_MAX_WORDS: usize = 8;

/// How many non-blank lines at a fragment edge are inspected for table content.
pub const TABLE_EDGE_LINES: usize = 4;

/// A leader run: text, four or more dots, then a value.
static LEADER_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S[ \t]*\.{4,}[ \t]*\S").expect("valid leader regex"));

/// Headings in a reference-only block have at most this many words.
const HEADING_MAX_WORDS: usize = 6;

// =============================================================================
// Steps
// =============================================================================

/// If `line` starts a step, return the matching pattern index and its marker.
#[must_use]
pub fn step_marker(line: &str, profile: &Profile) -> Option<(usize, String)> {
    let text = line.trim();
    profile.step_patterns().iter().enumerate().find_map(|(i, p)| {
        let caps = p.captures(text)?;
        let marker = caps.get(1).or_else(|| caps.get(0))?.as_str();
        Some((i, marker.trim_matches(|c: char| !c.is_alphanumeric()).to_string()))
    })
}

/// Whether a marker restarts numbering (`1`, `a`, `A`, `i`, `I`).
#[must_use]
pub fn is_start_marker(marker: &str) -> bool {
    START_MARKERS.contains(&marker)
}

/// Find step runs in `lines`, as half-open line ranges.
///
/// A run is a step line plus its continuation lines, extended by further
/// step lines (blank lines between steps are tolerated). A non-blank,
/// non-step line that does not directly continue a step closes the run. A
/// start marker in the run's outermost pattern closes the run and opens a
/// new one; in any other pattern it begins nested sub-steps.
#[must_use]
pub fn detect_step_sequences(lines: &[&str], profile: &Profile) -> Vec<Range<usize>> {
    struct Open {
        start: usize,
        last: usize,
        outer: usize,
    }

    let mut runs = Vec::new();
    let mut open: Option<Open> = None;

    for (i, line) in lines.iter().enumerate() {
        if let Some((pattern, marker)) = step_marker(line, profile) {
            match open.as_mut() {
                Some(run) if is_start_marker(&marker) && run.outer == pattern => {
                    runs.push(run.start..run.last + 1);
                    open = Some(Open {
                        start: i,
                        last: i,
                        outer: pattern,
                    });
                }
                Some(run) => run.last = i,
                None => {
                    open = Some(Open {
                        start: i,
                        last: i,
                        outer: pattern,
                    });
                }
            }
        } else if !line.trim().is_empty() {
            match open.as_mut() {
                Some(run) if run.last + 1 == i => run.last = i,
                Some(run) => {
                    runs.push(run.start..run.last + 1);
                    open = None;
                }
                None => {}
            }
        }
    }

    if let Some(run) = open {
        runs.push(run.start..run.last + 1);
    }
    runs
}

// =============================================================================
// Safety callouts
// =============================================================================

/// The callout level a line opens, if any.
#[must_use]
pub fn callout_level(line: &str, profile: &Profile) -> Option<CalloutLevel> {
    let text = line.trim();
    profile
        .callouts()
        .iter()
        .find(|c| c.pattern.is_match(text))
        .map(|c| c.level)
}

/// A detected callout block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalloutBlock {
    /// Severity.
    pub level: CalloutLevel,
    /// Half-open line range within the inspected lines.
    pub lines: Range<usize>,
}

/// Find callout blocks.
///
/// A block starts at a callout line and extends forward until a blank line,
/// another callout, or a step line.
#[must_use]
pub fn detect_safety_callouts(lines: &[&str], profile: &Profile) -> Vec<CalloutBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(level) = callout_level(lines[i], profile) else {
            i += 1;
            continue;
        };
        let start = i;
        i += 1;
        while i < lines.len()
            && !lines[i].trim().is_empty()
            && callout_level(lines[i], profile).is_none()
            && step_marker(lines[i], profile).is_none()
        {
            i += 1;
        }
        blocks.push(CalloutBlock {
            level,
            lines: start..i,
        });
    }
    blocks
}

/// Distinct callout levels in `text`, in order of first appearance.
#[must_use]
pub fn safety_levels(text: &str, profile: &Profile) -> Vec<CalloutLevel> {
    let mut levels = Vec::new();
    for line in text.lines() {
        if let Some(level) = callout_level(line, profile) {
            if !levels.contains(&level) {
                levels.push(level);
            }
        }
    }
    levels
}

/// Whether `text` consists of nothing but callout blocks.
#[must_use]
pub fn is_callout_only(text: &str, profile: &Profile) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    let blocks = detect_safety_callouts(&lines, profile);
    if blocks.is_empty() {
        return false;
    }
    let mut covered = vec![false; lines.len()];
    for block in &blocks {
        for flag in &mut covered[block.lines.clone()] {
            *flag = true;
        }
    }
    lines
        .iter()
        .zip(covered)
        .all(|(line, inside)| inside || line.trim().is_empty())
}

// =============================================================================
// Tables
// =============================================================================

/// Whether a line looks like a leader-dot table row.
///
/// An ellipsis in prose (`Wait...`, `may fail... check`) is not a leader run.
#[must_use]
pub fn is_table_line(line: &str) -> bool {
    LEADER_ROW.is_match(line)
}

/// Find table regions as half-open line ranges.
///
/// Table lines separated by at most [`TABLE_GAP_LINES`] other lines belong to
/// the same region. One short non-blank header line directly above is
/// included.
#[must_use]
pub fn detect_tables(lines: &[&str]) -> Vec<Range<usize>> {
    let mut regions: Vec<Range<usize>> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (i, line) in lines.iter().enumerate() {
        if !is_table_line(line) {
            continue;
        }
        current = match current {
            Some((start, last)) if i - last - 1 <= TABLE_GAP_LINES => Some((start, i)),
            Some((start, last)) => {
                regions.push(with_header(lines, start)..last + 1);
                Some((i, i))
            }
            None => Some((i, i)),
        };
    }
    if let Some((start, last)) = current {
        regions.push(with_header(lines, start)..last + 1);
    }
    regions
}

fn with_header(lines: &[&str], start: usize) -> usize {
    match start.checked_sub(1) {
        Some(prev)
            if !lines[prev].trim().is_empty()
                && !is_table_line(lines[prev])
                && lines[prev].split_whitespace().count() <= TABLE_HEADER_MAX_WORDS =>
        {
            prev
        }
        _ => start,
    }
}

/// Whether any of the first [`TABLE_EDGE_LINES`] non-blank lines is a table row.
#[must_use]
pub fn leading_table_like(text: &str) -> bool {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(TABLE_EDGE_LINES)
        .any(is_table_line)
}

/// Whether any of the last [`TABLE_EDGE_LINES`] non-blank lines is a table row.
#[must_use]
pub fn trailing_table_like(text: &str) -> bool {
    text.lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(TABLE_EDGE_LINES)
        .any(is_table_line)
}

// =============================================================================
// Figures and cross references
// =============================================================================

/// Distinct figure ids referenced in `text`, in order of first appearance.
#[must_use]
pub fn figure_references(text: &str, profile: &Profile) -> Vec<String> {
    let Some(pattern) = profile.figure_pattern() else {
        return Vec::new();
    };
    distinct(
        pattern
            .captures_iter(text)
            .filter_map(|caps| first_group(&caps).map(str::to_string)),
    )
}

/// If the first non-blank line of `text` starts with a figure reference,
/// return its id.
#[must_use]
pub fn leading_figure(text: &str, profile: &Profile) -> Option<String> {
    let pattern = profile.figure_pattern()?;
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let caps = pattern.captures(first)?;
    if caps.get(0)?.start() != 0 {
        return None;
    }
    first_group(&caps).map(str::to_string)
}

/// Distinct cross reference targets in `text`, unqualified.
#[must_use]
pub fn cross_references(text: &str, profile: &Profile) -> Vec<String> {
    distinct(profile.cross_ref_patterns().iter().flat_map(|p| {
        p.captures_iter(text)
            .filter_map(|caps| first_group(&caps).map(|m| m.trim().to_string()))
    }))
}

/// Whether a line contains a cross reference.
#[must_use]
pub fn is_cross_ref_line(line: &str, profile: &Profile) -> bool {
    profile.cross_ref_patterns().iter().any(|p| p.is_match(line))
}

/// Whether a line is a short all-caps heading such as `RELATED PROCEDURES`.
#[must_use]
pub fn is_heading_line(line: &str) -> bool {
    let text = line.trim();
    let words = text.split_whitespace().count();
    (1..=HEADING_MAX_WORDS).contains(&words)
        && text.chars().any(char::is_alphabetic)
        && !text.chars().any(char::is_lowercase)
}

/// The first participating capture group, or the whole match.
///
/// Lets a profile combine alternatives such as
/// `\(Fig\.\s+(\d+)\)|FIG\.\s+([A-Z]-\d+)` in one pattern.
pub(crate) fn first_group<'t>(caps: &regex::Captures<'t>) -> Option<&'t str> {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
}

fn distinct(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// =============================================================================
// Applicability
// =============================================================================

/// Value used when no specific applicability is found.
pub const APPLIES_TO_ALL: &str = "all";

/// Vehicles, engines and drivetrains a text applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicability {
    /// Vehicle model names.
    pub vehicles: Vec<String>,
    /// Engine names.
    pub engines: Vec<String>,
    /// Drivetrain names.
    pub drivetrains: Vec<String>,
}

/// Match the profile's vehicle vocabulary against `text`.
///
/// Matching is case-insensitive substring search. Engines match by name,
/// code or alias and are reported by name. Each list defaults to
/// `["all"]` when nothing specific is found.
#[must_use]
pub fn applicability(text: &str, profile: &Profile) -> Applicability {
    let haystack = text.to_lowercase();
    let mentions = |needle: &str| !needle.is_empty() && haystack.contains(&needle.to_lowercase());

    let mut vehicles = Vec::new();
    let mut engines = Vec::new();
    let mut drivetrains = Vec::new();

    for vehicle in profile.vehicles() {
        if mentions(&vehicle.model) {
            vehicles.push(vehicle.model.clone());
        }
        for engine in &vehicle.engines {
            let hit = mentions(&engine.name)
                || mentions(&engine.code)
                || engine.aliases.iter().any(|a| mentions(a));
            if hit {
                engines.push(engine.name.clone());
            }
        }
        for drive in &vehicle.drive_type {
            if mentions(drive) {
                drivetrains.push(drive.clone());
            }
        }
    }

    let or_all = |found: Vec<String>| {
        let found = distinct(found.into_iter());
        if found.is_empty() {
            vec![APPLIES_TO_ALL.to_string()]
        } else {
            found
        }
    };

    Applicability {
        vehicles: or_all(vehicles),
        engines: or_all(engines),
        drivetrains: or_all(drivetrains),
    }
}

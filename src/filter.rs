//! Boundary filtering: pruning false positives.
//!
//! OCR output is full of lines that look like headings and are not: a stray
//! `"12 Volts"` matches a group pattern, a running page header repeats a
//! section title on every page, a figure caption in capitals looks like a
//! procedure name.
//!
//! Four passes run in a fixed order, each on the output of the one before:
//!
//! | Pass | Enabled by | Drops |
//! |------|------------|-------|
//! | 0 | `require_known_id` (non-empty allow-list) | ids missing from the allow-list |
//! | 1 | `require_blank_before` | boundaries without a blank line above |
//! | 2 | `min_gap_lines = N` | same-level boundaries closer than N lines |
//! | 3 | `min_content_words = N` | boundaries followed by fewer than N words |
//!
//! Each pass only touches levels that enable it. Pass 2 measures against the
//! previous *surviving* boundary of the same level; pass 3 measures up to the
//! next *surviving* boundary of any level, so it walks the sequence
//! back to front. The result is a fixed point: filtering the output again
//! removes nothing.

use std::collections::HashMap;

use crate::boundary::{document_lines, Boundary};
use crate::profile::Profile;

/// Run all four passes in order.
///
/// # Arguments
///
/// * `boundaries` - Detected boundaries, ordered by position
/// * `profile` - Profile whose per-level thresholds enable the passes
/// * `pages` - The same pages the boundaries were detected in
#[must_use]
pub fn filter_boundaries<S: AsRef<str>>(
    boundaries: &[Boundary],
    profile: &Profile,
    pages: &[S],
) -> Vec<Boundary> {
    let lines = document_lines(pages);
    let before = boundaries.len();

    let kept = known_id_pass(boundaries.to_vec(), profile);
    let kept = blank_before_pass(kept, profile, &lines);
    let kept = min_gap_pass(kept, profile);
    let kept = min_content_pass(kept, profile, &lines);

    tracing::debug!(before, after = kept.len(), "filtered boundaries");
    kept
}

/// Pass 0: drop ids outside a level's allow-list.
///
/// A level with an empty allow-list is treated as unconfigured and passes
/// everything.
#[must_use]
pub fn known_id_pass(boundaries: Vec<Boundary>, profile: &Profile) -> Vec<Boundary> {
    boundaries
        .into_iter()
        .filter(|b| {
            let Some(level) = profile.level(b.level) else {
                return true;
            };
            if !level.filter.require_known_id || level.known_ids.is_empty() {
                return true;
            }
            b.id.as_deref().is_some_and(|id| level.is_known(id))
        })
        .collect()
}

/// Pass 1: drop boundaries whose preceding global line is not blank.
#[must_use]
pub fn blank_before_pass(boundaries: Vec<Boundary>, profile: &Profile, lines: &[&str]) -> Vec<Boundary> {
    boundaries
        .into_iter()
        .filter(|b| {
            let enabled = profile
                .level(b.level)
                .is_some_and(|l| l.filter.require_blank_before);
            if !enabled {
                return true;
            }
            b.line
                .checked_sub(1)
                .and_then(|prev| lines.get(prev))
                .is_some_and(|l| l.trim().is_empty())
        })
        .collect()
}

/// Pass 2: drop same-level boundaries closer than `min_gap_lines`.
#[must_use]
pub fn min_gap_pass(boundaries: Vec<Boundary>, profile: &Profile) -> Vec<Boundary> {
    let mut last_line: HashMap<usize, usize> = HashMap::new();
    boundaries
        .into_iter()
        .filter(|b| {
            let gap = profile.level(b.level).map_or(0, |l| l.filter.min_gap_lines);
            if gap == 0 {
                return true;
            }
            let keep = last_line
                .get(&b.level)
                .map_or(true, |&prev| b.line.saturating_sub(prev) >= gap);
            if keep {
                last_line.insert(b.level, b.line);
            }
            keep
        })
        .collect()
}

/// Pass 3: drop boundaries with fewer than `min_content_words` words before
/// the next surviving boundary.
///
/// The count includes the boundary's own line.
#[must_use]
pub fn min_content_pass(boundaries: Vec<Boundary>, profile: &Profile, lines: &[&str]) -> Vec<Boundary> {
    let mut next_line = lines.len();
    let mut kept = Vec::with_capacity(boundaries.len());

    for b in boundaries.into_iter().rev() {
        let threshold = profile.level(b.level).map_or(0, |l| l.filter.min_content_words);
        let keep = threshold == 0 || {
            let start = b.line.min(lines.len());
            let end = next_line.clamp(start, lines.len());
            let words: usize = lines[start..end]
                .iter()
                .map(|l| l.split_whitespace().count())
                .sum();
            words >= threshold
        };
        if keep {
            next_line = b.line;
            kept.push(b);
        }
    }

    kept.reverse();
    kept
}

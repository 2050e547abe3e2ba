//! Boundary detection: finding the lines that open a hierarchy unit.
//!
//! ## The Problem
//!
//! Profiles describe each level with a pattern, but patterns overlap. A line
//! like `"SERVICE PROCEDURES"` may match both the section and the procedure
//! level; a numeric heading may look like a chapter or a paragraph.
//!
//! ```text
//! 7 Cooling System          level 1 only
//! SERVICE PROCEDURES        levels 2 and 3 match  -> ?
//! RADIATOR DRAINING         levels 2 and 3 match  -> ?
//! ```
//!
//! ## The State Machine
//!
//! Disambiguation uses one piece of context: the deepest level currently
//! open. [`OpenLevel`] holds it, and each line is one transition:
//!
//! ```text
//! state = None | Some(level)
//!
//! candidates = levels whose id or title pattern matches the line
//! chosen     = min(c in candidates where c > state)     -- descend
//!            | min(candidates)                          -- otherwise restart
//! state'     = chosen
//! ```
//!
//! With that rule the example above resolves to 1, 2, 3.
//!
//! ## Line Numbers
//!
//! Line numbers are global: page `p`'s local line `k` is
//! `k + sum(lines(page) for page in pages[..p])`, where a page's line count is
//! the number of `'\n'`-separated pieces. This is exactly the indexing of
//! `pages.join("\n").split('\n')`, which [`document_lines`] returns.

use std::collections::BTreeMap;

use regex::Captures;
use serde::{Deserialize, Serialize};

use crate::profile::{HierarchyLevel, Profile};

/// A detected structural marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// 1-based hierarchy level.
    pub level: usize,
    /// Level name from the profile.
    pub level_name: String,
    /// Identifier extracted by the level's id pattern.
    pub id: Option<String>,
    /// Title extracted from the line.
    pub title: Option<String>,
    /// 0-based page index.
    pub page: usize,
    /// Global 0-based line number.
    pub line: usize,
}

impl Boundary {
    /// The key boundaries are ordered by.
    #[must_use]
    pub const fn position(&self) -> (usize, usize) {
        (self.page, self.line)
    }
}

/// All lines of the document, globally indexed.
#[must_use]
pub fn document_lines<S: AsRef<str>>(pages: &[S]) -> Vec<&str> {
    pages.iter().flat_map(|p| p.as_ref().split('\n')).collect()
}

/// Global line index of each page's first line.
pub(crate) fn page_starts<S: AsRef<str>>(pages: &[S]) -> Vec<usize> {
    let mut starts = Vec::with_capacity(pages.len());
    let mut offset = 0;
    for page in pages {
        starts.push(offset);
        offset += page.as_ref().split('\n').count();
    }
    starts
}

/// Page containing a global line. Lines past the end map to the last page.
pub(crate) fn page_of_line(starts: &[usize], line: usize) -> usize {
    starts.partition_point(|&s| s <= line).saturating_sub(1)
}

/// The "currently open level" state of the detector.
///
/// # Examples
///
/// ```rust
/// use strata::OpenLevel;
///
/// let mut state = OpenLevel::default();
/// assert_eq!(state.transition(&[1]), Some(1));
/// assert_eq!(state.transition(&[2, 3]), Some(2)); // descend
/// assert_eq!(state.transition(&[2, 3]), Some(3)); // descend again
/// assert_eq!(state.transition(&[1, 3]), Some(1)); // nothing deeper: restart
/// assert_eq!(state.transition(&[]), None);
/// assert_eq!(state.current(), Some(1));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenLevel(Option<usize>);

impl OpenLevel {
    /// The deepest open level, if any.
    #[must_use]
    pub const fn current(&self) -> Option<usize> {
        self.0
    }

    /// Consume one line's candidate levels and return the chosen level.
    ///
    /// Empty candidates leave the state untouched.
    pub fn transition(&mut self, candidates: &[usize]) -> Option<usize> {
        let shallowest = candidates.iter().copied().min()?;
        let chosen = match self.0 {
            Some(open) => candidates
                .iter()
                .copied()
                .filter(|&c| c > open)
                .min()
                .unwrap_or(shallowest),
            None => shallowest,
        };
        self.0 = Some(chosen);
        Some(chosen)
    }
}

struct Candidate {
    level: usize,
    id: Option<String>,
    title: Option<String>,
}

fn group_or_whole(caps: &Captures<'_>) -> Option<String> {
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn match_level(level: &HierarchyLevel, text: &str) -> Option<Candidate> {
    let id_caps = level.id_pattern.as_ref().and_then(|p| p.captures(text));
    let title_caps = level.title_pattern.as_ref().and_then(|p| p.captures(text));
    if id_caps.is_none() && title_caps.is_none() {
        return None;
    }

    let id = id_caps.as_ref().and_then(group_or_whole);
    let title = match (&title_caps, &id_caps) {
        (Some(caps), _) => group_or_whole(caps),
        (None, Some(caps)) => {
            // "7 Cooling System" -> "Cooling System"; "42. Starting" -> "Starting"
            let end = caps.get(1).or_else(|| caps.get(0)).map_or(0, |m| m.end());
            let rest = text[end..].trim_start_matches(|c: char| !c.is_alphanumeric());
            let rest = rest.trim();
            Some(if rest.is_empty() { text } else { rest }.to_string())
        }
        (None, None) => None,
    };

    Some(Candidate {
        level: level.level,
        id,
        title,
    })
}

/// Scan pages for hierarchy boundaries.
///
/// Never fails; a document with no matching lines yields an empty vector.
///
/// # Arguments
///
/// * `pages` - Cleaned page texts in document order
/// * `profile` - Compiled profile whose hierarchy patterns are applied
#[must_use]
pub fn detect_boundaries<S: AsRef<str>>(pages: &[S], profile: &Profile) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    let mut state = OpenLevel::default();
    let mut offset = 0;

    for (page_index, page) in pages.iter().enumerate() {
        let page = page.as_ref();
        let mut line_count = 0;

        for (local, raw) in page.split('\n').enumerate() {
            line_count += 1;
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }

            let candidates: Vec<Candidate> = profile
                .levels()
                .iter()
                .filter_map(|level| match_level(level, text))
                .collect();
            let levels: Vec<usize> = candidates.iter().map(|c| c.level).collect();

            let Some(chosen) = state.transition(&levels) else {
                continue;
            };
            let Some(candidate) = candidates.into_iter().find(|c| c.level == chosen) else {
                continue;
            };
            let level_name = profile
                .level(chosen)
                .map(|l| l.name.clone())
                .unwrap_or_default();

            boundaries.push(Boundary {
                level: chosen,
                level_name,
                id: candidate.id,
                title: candidate.title,
                page: page_index,
                line: offset + local,
            });
        }

        offset += line_count;
    }

    // Scan order already satisfies this; the sort makes it a guarantee.
    boundaries.sort_by_key(Boundary::position);
    tracing::debug!(count = boundaries.len(), pages = pages.len(), "detected boundaries");
    boundaries
}

/// Report boundaries whose id is missing from a non-empty allow-list.
///
/// Returns one message per unrecognized boundary. Unlike the filter's
/// known-id pass this never removes anything; it is a diagnostic.
#[must_use]
pub fn validate_boundaries(boundaries: &[Boundary], profile: &Profile) -> Vec<String> {
    boundaries
        .iter()
        .filter_map(|b| {
            let level = profile.level(b.level)?;
            if level.known_ids.is_empty() {
                return None;
            }
            let id = b.id.as_deref()?;
            (!level.is_known(id)).then(|| {
                format!(
                    "unrecognized {} id '{id}' at page {}, line {} (title: {})",
                    b.level_name,
                    b.page,
                    b.line,
                    b.title.as_deref().unwrap_or("-")
                )
            })
        })
        .collect()
}

/// Boundaries with this many words or fewer before the next are suspect.
pub const FALSE_POSITIVE_WORDS: usize = 3;

/// Quality statistics for a boundary sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundaryStats {
    /// Number of boundaries.
    pub total: usize,
    /// Boundaries per page.
    pub per_page: f64,
    /// Smallest span, in words.
    pub min_words: usize,
    /// Median span, in words.
    pub median_words: f64,
    /// Mean span, in words.
    pub avg_words: f64,
    /// Largest span, in words.
    pub max_words: usize,
    /// Indices of boundaries whose span has at most [`FALSE_POSITIVE_WORDS`] words.
    pub suspected_false_positives: Vec<usize>,
    /// Boundary count per level number.
    pub by_level: BTreeMap<usize, usize>,
}

impl BoundaryStats {
    /// Compute statistics over `boundaries` against `pages`.
    ///
    /// A boundary's span runs from its own line up to the next boundary's
    /// line, or to the end of the document.
    #[must_use]
    pub fn compute<S: AsRef<str>>(boundaries: &[Boundary], pages: &[S]) -> Self {
        let lines = document_lines(pages);
        let total = boundaries.len();
        let mut counts = Vec::with_capacity(total);
        let mut suspected = Vec::new();
        let mut by_level = BTreeMap::new();

        for (i, b) in boundaries.iter().enumerate() {
            let end = boundaries.get(i + 1).map_or(lines.len(), |n| n.line);
            let start = b.line.min(lines.len());
            let words: usize = lines[start..end.clamp(start, lines.len())]
                .iter()
                .map(|l| l.split_whitespace().count())
                .sum();
            if words <= FALSE_POSITIVE_WORDS {
                suspected.push(i);
            }
            counts.push(words);
            *by_level.entry(b.level).or_insert(0) += 1;
        }

        let mut sorted = counts.clone();
        sorted.sort_unstable();
        let median_words = match sorted.len() {
            0 => 0.0,
            n if n % 2 == 1 => sorted[n / 2] as f64,
            n => (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0,
        };

        Self {
            total,
            per_page: total as f64 / pages.len().max(1) as f64,
            min_words: sorted.first().copied().unwrap_or(0),
            median_words,
            avg_words: if total == 0 {
                0.0
            } else {
                counts.iter().sum::<usize>() as f64 / total as f64
            },
            max_words: sorted.last().copied().unwrap_or(0),
            suspected_false_positives: suspected,
            by_level,
        }
    }
}

//! Chunk assembly: manifest entries to final chunks.
//!
//! ## Pipeline
//!
//! ```text
//! for each entry (skip namespaces excluded):
//!     span      = lines[entry.start .. next_entry.start]
//!     fragments = apply_rules(span)                 R1 R3 R4 R5 | R2 R6 R7 R8
//!     drafts   += fragments, suffixed ::partN when more than one
//!
//! repeat up to 10 passes, until nothing merges:
//!     draft under min  +  next draft  ->  one draft   (same level-1 id, fits max)
//!
//! surviving parts renumbered ::part1..::partN per entry
//! metadata re-derived from each final text
//! ```
//!
//! ## Cross-Entry Merge
//!
//! Rules only see one entry. A section whose only content is a heading and a
//! sentence becomes a tiny chunk, and a run of such sections becomes a run of
//! tiny chunks. The merge pass folds each undersized draft into the draft
//! after it, keeping the later draft's id. One pass halves a run at best:
//!
//! ```text
//! pass 0:  a  b  c  d  e        (all under min)
//! pass 1:  ab    cd    e
//! pass 2:  abcd        e
//! pass 3:  abcde
//! ```
//!
//! A merged draft is not re-examined in the same pass. Merges never cross a
//! level-1 boundary (a chapter's tail never leaks into the next chapter) and
//! never produce a draft over the ceiling.
//!
//! Each draft's page range comes from the lines its own text was cut from,
//! so the parts of a long entry report the pages they actually cover.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use crate::boundary::{document_lines, page_of_line, page_starts};
use crate::capacity::ChunkBudget;
use crate::chunk::Chunk;
use crate::detect;
use crate::manifest::{generate_chunk_id, level1_segment, Manifest, ManifestEntry, PageRange};
use crate::profile::Profile;
use crate::rules::apply_rules;

/// Upper bound on cross-entry merge passes.
pub const MAX_MERGE_PASSES: usize = 10;

/// Separator between header segments.
pub const HEADER_SEPARATOR: &str = " | ";

/// `"{title} | t1 | t2 | ..."`.
///
/// ```rust
/// use strata::compose_hierarchical_header;
///
/// let header = compose_hierarchical_header("1999 XJ FSM", &["Cooling System", "SERVICE PROCEDURES"]);
/// assert_eq!(header, "1999 XJ FSM | Cooling System | SERVICE PROCEDURES");
/// ```
#[must_use]
pub fn compose_hierarchical_header<S: AsRef<str>>(document_title: &str, path: &[S]) -> String {
    std::iter::once(document_title)
        .chain(path.iter().map(AsRef::as_ref))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(HEADER_SEPARATOR)
}

/// A chunk before metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Chunk id (with part suffix).
    pub chunk_id: String,
    /// Index of the originating manifest entry.
    pub entry: usize,
    /// Body text.
    pub text: String,
    /// Pages covered.
    pub pages: PageRange,
}

impl Draft {
    fn words(&self) -> usize {
        self.text.split_whitespace().count()
    }

    fn absorb_into(self, next: Self) -> Self {
        Self {
            text: format!("{}\n\n{}", self.text, next.text),
            pages: PageRange {
                start: self.pages.start.min(next.pages.start),
                end: self.pages.end.max(next.pages.end),
            },
            ..next
        }
    }
}

/// Assemble chunks for a whole document.
///
/// # Arguments
///
/// * `pages` - The pages the manifest was built from
/// * `manifest` - Entries in document order
/// * `profile` - Rules, thresholds and skip namespaces
///
/// Entries under a skip namespace are never assembled. An entry whose start
/// lies beyond the document is skipped with a warning; the rest of the
/// document is still processed.
#[must_use]
pub fn assemble_chunks<S: AsRef<str>>(pages: &[S], manifest: &Manifest, profile: &Profile) -> Vec<Chunk> {
    let drafts = draft_entries(pages, manifest, profile);
    let drafts = merge_small_drafts(drafts, profile.budget());
    let drafts = renumber_parts(drafts, manifest);
    let chunks: Vec<Chunk> = drafts
        .into_iter()
        .map(|draft| finalize(draft, manifest, profile))
        .collect();
    tracing::debug!(entries = manifest.len(), chunks = chunks.len(), "assembled chunks");
    chunks
}

/// Apply the rule pipeline to every entry's span.
#[must_use]
pub fn draft_entries<S: AsRef<str>>(pages: &[S], manifest: &Manifest, profile: &Profile) -> Vec<Draft> {
    let lines = document_lines(pages);
    let starts = page_starts(pages);
    let total = lines.len();
    let mut drafts = Vec::new();
    let mut skipped = 0;

    for (index, entry) in manifest.entries.iter().enumerate() {
        if profile.is_skipped(&entry.chunk_id) {
            skipped += 1;
            continue;
        }
        let start = entry.line_range.start;
        if start > total {
            tracing::warn!(
                chunk_id = %entry.chunk_id,
                start,
                total,
                "entry starts past end of document, skipping"
            );
            continue;
        }
        let end = manifest
            .entries
            .get(index + 1)
            .map_or(total, |next| next.line_range.start)
            .clamp(start, total);

        let span_lines = &lines[start..end];
        let fragments = apply_rules(&span_lines.join("\n"), profile);
        let entry_pages = PageRange {
            start: page_of_line(&starts, start),
            end: page_of_line(&starts, end.saturating_sub(1).max(start)),
        };

        let multipart = fragments.len() > 1;
        let mut cursor = 0;
        for (part, fragment) in fragments.into_iter().enumerate() {
            let chunk_id = if multipart {
                part_id(&entry.chunk_id, part + 1)
            } else {
                entry.chunk_id.clone()
            };
            let text = fragment.text.trim().to_string();
            let pages = match locate(span_lines, &text, cursor) {
                Some((first, last)) => {
                    cursor = last;
                    PageRange {
                        start: page_of_line(&starts, start + first),
                        end: page_of_line(&starts, start + last),
                    }
                }
                None => entry_pages,
            };
            drafts.push(Draft {
                chunk_id,
                entry: index,
                text,
                pages,
            });
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "entries under skip namespaces");
    }
    drafts
}

fn part_id(entry_id: &str, part: usize) -> String {
    generate_chunk_id(entry_id, &[format!("part{part}")])
}

/// Span lines holding the first and last non-blank lines of `text`, at or
/// after `from`.
///
/// Fragments keep document order, so the search only moves forward. A piece
/// cut mid-line by the size split is found by containment.
fn locate(span_lines: &[&str], text: &str, from: usize) -> Option<(usize, usize)> {
    let content: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let (first, last) = (content.first()?, content.last()?);
    let start = (from..span_lines.len()).find(|&i| span_lines[i].contains(first))?;
    let earliest = (start + content.len() - 1).min(span_lines.len() - 1);
    let end = (earliest..span_lines.len())
        .chain(start..earliest)
        .find(|&i| span_lines[i].contains(last))?;
    Some((start, end))
}

/// Number surviving parts `part1..partN` per entry after merging.
///
/// An entry left with a single draft takes the bare entry id.
fn renumber_parts(mut drafts: Vec<Draft>, manifest: &Manifest) -> Vec<Draft> {
    let mut i = 0;
    while i < drafts.len() {
        let entry = drafts[i].entry;
        let run = drafts[i..].iter().take_while(|d| d.entry == entry).count();
        if let Some(base) = manifest.entries.get(entry) {
            for (part, draft) in drafts[i..i + run].iter_mut().enumerate() {
                draft.chunk_id = if run > 1 {
                    part_id(&base.chunk_id, part + 1)
                } else {
                    base.chunk_id.clone()
                };
            }
        }
        i += run;
    }
    drafts
}

/// One cross-entry merge pass. Returns the new drafts and the merge count.
fn merge_pass(drafts: Vec<Draft>, budget: ChunkBudget) -> (Vec<Draft>, usize) {
    let mut out = Vec::with_capacity(drafts.len());
    let mut merges = 0;
    let mut iter = drafts.into_iter().peekable();

    while let Some(draft) = iter.next() {
        let undersized = budget.fits(budget.tokens_for_words(draft.words())) == Ordering::Less;
        let mergeable = undersized
            && iter.peek().is_some_and(|next| {
                level1_segment(&draft.chunk_id).is_some()
                    && level1_segment(&draft.chunk_id) == level1_segment(&next.chunk_id)
                    && !budget.would_overflow(draft.words(), next.words())
            });
        match iter.next_if(|_| mergeable) {
            Some(next) => {
                out.push(draft.absorb_into(next));
                merges += 1;
            }
            None => out.push(draft),
        }
    }
    (out, merges)
}

/// Merge undersized drafts forward until stable or [`MAX_MERGE_PASSES`].
#[must_use]
pub fn merge_small_drafts(mut drafts: Vec<Draft>, budget: ChunkBudget) -> Vec<Draft> {
    for pass in 1..=MAX_MERGE_PASSES {
        let (next, merges) = merge_pass(drafts, budget);
        drafts = next;
        tracing::trace!(pass, merges, remaining = drafts.len(), "cross-entry merge pass");
        if merges == 0 {
            break;
        }
    }
    drafts
}

fn strings(items: &[String]) -> Value {
    Value::from(items.to_vec())
}

fn finalize(draft: Draft, manifest: &Manifest, profile: &Profile) -> Chunk {
    let document_id = manifest.document_id.clone();
    let entry: Option<&ManifestEntry> = manifest.entries.get(draft.entry);
    let text = draft.text;

    let applicability = detect::applicability(&text, profile);
    let safety: Vec<String> = detect::safety_levels(&text, profile)
        .iter()
        .map(|l| l.as_str().to_string())
        .collect();
    let figures = detect::figure_references(&text, profile);
    let cross_refs: Vec<String> = detect::cross_references(&text, profile)
        .iter()
        .map(|target| generate_chunk_id(&document_id, &[target]))
        .collect();

    let path: &[String] = entry.map_or(&[], |e| e.hierarchy_path.as_slice());
    let mut metadata = Map::new();
    metadata.insert("document_id".into(), json!(document_id));
    metadata.insert(
        "level1_id".into(),
        json!(level1_segment(&draft.chunk_id).unwrap_or_default()),
    );
    metadata.insert(
        "procedure_name".into(),
        json!(entry.map(|e| e.title.as_str()).unwrap_or_default()),
    );
    metadata.insert(
        "hierarchical_header".into(),
        json!(compose_hierarchical_header(profile.title(), path)),
    );
    metadata.insert("hierarchy_path".into(), strings(path));
    metadata.insert(
        "content_type".into(),
        json!(entry.map(|e| e.content_type.as_str()).unwrap_or_default()),
    );
    metadata.insert("level".into(), json!(entry.map_or(0, |e| e.level)));
    metadata.insert(
        "page_range".into(),
        json!({"start": draft.pages.start, "end": draft.pages.end}),
    );
    metadata.insert("vehicle_models".into(), strings(&applicability.vehicles));
    metadata.insert("engine_applicability".into(), strings(&applicability.engines));
    metadata.insert(
        "drivetrain_applicability".into(),
        strings(&applicability.drivetrains),
    );
    metadata.insert("has_safety_callouts".into(), strings(&safety));
    metadata.insert("figure_references".into(), strings(&figures));
    metadata.insert("cross_references".into(), strings(&cross_refs));

    Chunk {
        chunk_id: draft.chunk_id,
        document_id,
        text,
        metadata,
    }
}

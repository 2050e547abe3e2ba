//! The eight assembly rules.
//!
//! Each rule is a pure function from a fragment list to a fragment list.
//! [`apply_rules`] runs them in two phases:
//!
//! ```text
//! span ─ R1 ─ R3 ─ R4 ─ R5 ──────── R2 ─ R6 ─ R7 ─ R8 ─ fragments
//!        └─ semantic integrity ─┘   └──── size enforcement ────┘
//! ```
//!
//! | Rule | Effect |
//! |------|--------|
//! | R1 | the span is the unit; blank spans are dropped |
//! | R3 | each step run becomes its own fragment |
//! | R4 | a callout-only fragment merges into the next |
//! | R5 | table regions are tagged; split tables are re-merged |
//! | R2 | fragments over the ceiling are split recursively (tables exempt) |
//! | R6 | fragments under half the minimum merge into the next |
//! | R7 | reference-only fragments merge into the previous |
//! | R8 | a leading figure caption merges into the previous fragment that cites it |
//!
//! Semantic rules must precede size rules: once R2 has split a fragment,
//! nothing can tell a step run or a warning block apart from ordinary lines.
//!
//! Every merge pass builds a new list from the old one; no rule edits the
//! list it is iterating.

use crate::capacity::ChunkBudget;
use crate::detect;
use crate::profile::Profile;
use crate::recursive::RecursiveSplitter;

/// What a fragment is known to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Ordinary text.
    Prose,
    /// A protected step run.
    Steps,
    /// A table region; exempt from the size ceiling.
    Table,
}

/// A piece of an entry's text on its way to becoming a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The text.
    pub text: String,
    /// What it contains.
    pub kind: FragmentKind,
}

impl Fragment {
    /// A prose fragment.
    #[must_use]
    pub fn prose(text: impl Into<String>) -> Self {
        Self::new(text, FragmentKind::Prose)
    }

    /// A fragment of the given kind.
    #[must_use]
    pub fn new(text: impl Into<String>, kind: FragmentKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    fn words(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Append `next` to this fragment.
    ///
    /// The result keeps the more protective kind: a table absorbs anything,
    /// steps absorb prose.
    #[must_use]
    pub fn join(self, next: Self) -> Self {
        let kind = match (self.kind, next.kind) {
            (FragmentKind::Table, _) | (_, FragmentKind::Table) => FragmentKind::Table,
            (FragmentKind::Steps, _) | (_, FragmentKind::Steps) => FragmentKind::Steps,
            _ => FragmentKind::Prose,
        };
        Self {
            text: format!("{}\n\n{}", self.text, next.text),
            kind,
        }
    }
}

/// Cut `lines` into fragments at `ranges`; ranges become `kind`, the gaps
/// become prose. Blank pieces are dropped.
fn carve(lines: &[&str], ranges: &[std::ops::Range<usize>], kind: FragmentKind) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut push = |range: std::ops::Range<usize>, kind: FragmentKind| {
        let text = lines[range].join("\n");
        let text = text.trim_matches('\n');
        if !text.trim().is_empty() {
            out.push(Fragment::new(text, kind));
        }
    };

    let mut cursor = 0;
    for range in ranges {
        if range.start > cursor {
            push(cursor..range.start, FragmentKind::Prose);
        }
        push(range.clone(), kind);
        cursor = range.end;
    }
    if cursor < lines.len() {
        push(cursor..lines.len(), FragmentKind::Prose);
    }
    out
}

// =============================================================================
// Phase 1: semantic integrity
// =============================================================================

/// R1: the entry's span is the primary unit.
#[must_use]
pub fn r1_primary_unit(span: &str) -> Vec<Fragment> {
    let text = span.trim_matches('\n');
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![Fragment::prose(text)]
    }
}

/// R3: give every step run its own fragment.
#[must_use]
pub fn r3_protect_steps(fragments: Vec<Fragment>, profile: &Profile) -> Vec<Fragment> {
    fragments
        .into_iter()
        .flat_map(|fragment| {
            if fragment.kind != FragmentKind::Prose {
                return vec![fragment];
            }
            let lines: Vec<&str> = fragment.text.split('\n').collect();
            let runs = detect::detect_step_sequences(&lines, profile);
            if runs.is_empty() {
                vec![fragment]
            } else {
                carve(&lines, &runs, FragmentKind::Steps)
            }
        })
        .collect()
}

/// Whether a fragment holds callout blocks and nothing they could govern.
///
/// Short all-caps headings don't count as governed content, so
/// `"RADIATOR DRAINING\n\nWARNING: ..."` still qualifies.
fn governs_nothing(text: &str, profile: &Profile) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    let blocks = detect::detect_safety_callouts(&lines, profile);
    if blocks.is_empty() {
        return false;
    }
    lines.iter().enumerate().all(|(i, line)| {
        line.trim().is_empty()
            || (detect::is_heading_line(line) && detect::step_marker(line, profile).is_none())
            || blocks.iter().any(|b| b.lines.contains(&i))
    })
}

/// R4: merge a callout-only fragment forward into the content it governs.
///
/// A trailing callout-only fragment has nothing to attach to and stays.
#[must_use]
pub fn r4_attach_callouts(fragments: Vec<Fragment>, profile: &Profile) -> Vec<Fragment> {
    let mut out = Vec::with_capacity(fragments.len());
    let mut carry: Option<Fragment> = None;

    for fragment in fragments {
        let fragment = match carry.take() {
            Some(callout) => callout.join(fragment),
            None => fragment,
        };
        if governs_nothing(&fragment.text, profile) {
            carry = Some(fragment);
        } else {
            out.push(fragment);
        }
    }
    out.extend(carry);
    out
}

fn line_words(lines: &[&str]) -> usize {
    lines.iter().map(|l| l.split_whitespace().count()).sum()
}

/// R5: keep tables whole.
///
/// A prose fragment whose words are mostly inside table regions is tagged as
/// a table; otherwise each region is carved out as its own fragment, so the
/// surrounding prose stays subject to the ceiling. Then adjacent table
/// fragments are merged while the first ends table-like and the next begins
/// table-like, so a table split in two or three is rejoined.
#[must_use]
pub fn r5_table_integrity(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let tagged = fragments.into_iter().flat_map(|fragment| {
        if fragment.kind != FragmentKind::Prose {
            return vec![fragment];
        }
        let lines: Vec<&str> = fragment.text.split('\n').collect();
        let regions = detect::detect_tables(&lines);
        if regions.is_empty() {
            return vec![fragment];
        }
        let in_tables: usize = regions.iter().map(|r| line_words(&lines[r.clone()])).sum();
        if in_tables * 2 >= fragment.words() {
            vec![Fragment::new(fragment.text, FragmentKind::Table)]
        } else {
            carve(&lines, &regions, FragmentKind::Table)
        }
    });

    let mut out: Vec<Fragment> = Vec::new();
    for fragment in tagged {
        match out.pop() {
            Some(prev)
                if prev.kind == FragmentKind::Table
                    && fragment.kind == FragmentKind::Table
                    && detect::trailing_table_like(&prev.text)
                    && detect::leading_table_like(&fragment.text) =>
            {
                out.push(prev.join(fragment));
            }
            Some(prev) => {
                out.push(prev);
                out.push(fragment);
            }
            None => out.push(fragment),
        }
    }
    out
}

// =============================================================================
// Phase 2: size enforcement
// =============================================================================

/// R2: split fragments over the ceiling. Tables are exempt.
#[must_use]
pub fn r2_size_ceiling(fragments: Vec<Fragment>, budget: ChunkBudget) -> Vec<Fragment> {
    let splitter = RecursiveSplitter::new(budget);
    fragments
        .into_iter()
        .flat_map(|fragment| {
            if fragment.kind == FragmentKind::Table || budget.estimate(&fragment.text) <= budget.max() {
                return vec![fragment];
            }
            let kind = fragment.kind;
            splitter
                .split(&fragment.text)
                .into_iter()
                .map(|piece| Fragment::new(piece, kind))
                .collect()
        })
        .collect()
}

/// R6: merge fragments under `min / 2` tokens forward.
///
/// A merge only happens when the combined fragment stays under the ceiling.
/// A small final fragment stays.
#[must_use]
pub fn r6_merge_small(fragments: Vec<Fragment>, budget: ChunkBudget) -> Vec<Fragment> {
    let threshold = budget.merge_threshold();
    let mut out = Vec::with_capacity(fragments.len());
    let mut carry: Option<Fragment> = None;

    for fragment in fragments {
        let fragment = match carry.take() {
            Some(small) if !budget.would_overflow(small.words(), fragment.words()) => {
                small.join(fragment)
            }
            Some(small) => {
                out.push(small);
                fragment
            }
            None => fragment,
        };
        if budget.tokens_for_words(fragment.words()) < threshold {
            carry = Some(fragment);
        } else {
            out.push(fragment);
        }
    }
    out.extend(carry);
    out
}

/// Whether every line is a cross reference or a short heading, with at least
/// one cross reference.
fn references_only(text: &str, profile: &Profile) -> bool {
    let mut any_ref = false;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if detect::is_cross_ref_line(line, profile) {
            any_ref = true;
        } else if !detect::is_heading_line(line) {
            return false;
        }
    }
    any_ref
}

/// Merge `fragment` onto the end of `out` if the result fits, else push it.
fn merge_back(out: &mut Vec<Fragment>, fragment: Fragment, budget: ChunkBudget) {
    match out.pop() {
        Some(prev) if !budget.would_overflow(prev.words(), fragment.words()) => {
            out.push(prev.join(fragment));
        }
        Some(prev) => {
            out.push(prev);
            out.push(fragment);
        }
        None => out.push(fragment),
    }
}

/// R7: merge reference-only fragments into the previous fragment.
#[must_use]
pub fn r7_merge_references(fragments: Vec<Fragment>, profile: &Profile) -> Vec<Fragment> {
    let budget = profile.budget();
    let mut out = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if references_only(&fragment.text, profile) {
            merge_back(&mut out, fragment, budget);
        } else {
            out.push(fragment);
        }
    }
    out
}

/// R8: merge a fragment that opens with a figure caption into the previous
/// fragment when that fragment cites the same figure id.
#[must_use]
pub fn r8_figure_continuity(fragments: Vec<Fragment>, profile: &Profile) -> Vec<Fragment> {
    let budget = profile.budget();
    let mut out: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let cited = detect::leading_figure(&fragment.text, profile).is_some_and(|id| {
            out.last()
                .is_some_and(|prev| detect::figure_references(&prev.text, profile).contains(&id))
        });
        if cited {
            merge_back(&mut out, fragment, budget);
        } else {
            out.push(fragment);
        }
    }
    out
}

/// Run R1, R3, R4, R5, then R2, R6, R7, R8 over one entry's span.
#[must_use]
pub fn apply_rules(span: &str, profile: &Profile) -> Vec<Fragment> {
    let budget = profile.budget();

    let fragments = r1_primary_unit(span);
    let fragments = r3_protect_steps(fragments, profile);
    let fragments = r4_attach_callouts(fragments, profile);
    let fragments = r5_table_integrity(fragments);

    let fragments = r2_size_ceiling(fragments, budget);
    let fragments = r6_merge_small(fragments, budget);
    let fragments = r7_merge_references(fragments, profile);
    r8_figure_continuity(fragments, profile)
}

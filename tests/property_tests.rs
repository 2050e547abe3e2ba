//! Property-based tests for the chunking pipeline.
//!
//! These tests verify that the pipeline maintains key invariants:
//! - Ordering: boundaries are strictly increasing global positions
//! - Idempotence: filtering filtered boundaries changes nothing
//! - Ceiling: no non-table chunk exceeds the maximum size
//! - Atomicity: a step run under the ceiling lands in one chunk
//! - Conservation: the cross-entry merge neither drops nor reorders words

use proptest::prelude::*;
use strata::{
    chunk_document, detect_boundaries, document_lines, document_manifest, draft_entries,
    filter_boundaries, merge_small_drafts, Profile,
};

const FILTERED: &str = r#"
manual_id: prop
manual_title: Property Manual
source_url: https://example.com/prop.pdf
source_format: pdf-ocr
vehicles: [{model: Testbed, years: "2000"}]
structure:
  hierarchy:
    - level: 1
      name: group
      id_pattern: '^(\d{1,2}[A-Z]?)\s+[A-Z][a-z]'
      require_known_id: true
      known_ids: [{id: "0", title: Lubrication}, {id: "7", title: Cooling}]
    - level: 2
      name: section
      title_pattern: '^([A-Z]{2,}(?:\s+[A-Z]{2,})+)$'
      require_blank_before: true
      min_gap_lines: 2
    - level: 3
      name: procedure
      title_pattern: '^([A-Z]{2,}(?:\s+[A-Z]{2,})+)$'
      min_content_words: 3
  step_patterns: ['^\((\d+)\)\s']
safety_callouts:
  - {level: warning, pattern: '^WARNING:'}
chunking: {min_tokens: 5, max_tokens: 40}
"#;

const GROUPS: &[&str] = &["7 Cooling System", "9 Engine", "0 Lubrication and Maintenance"];
const HEADINGS: &[&str] = &[
    "SERVICE PROCEDURES",
    "RADIATOR DRAINING",
    "DRAIN PLUG",
    "REMOVAL AND INSTALLATION",
    "FAN BELT",
];

fn filtered() -> Profile {
    Profile::from_yaml_str(FILTERED).unwrap()
}

fn roomy() -> Profile {
    let yaml = FILTERED.replace(
        "chunking: {min_tokens: 5, max_tokens: 40}",
        "chunking: {min_tokens: 200, max_tokens: 2000}",
    );
    Profile::from_yaml_str(&yaml).unwrap()
}

// =============================================================================
// Test Generators
// =============================================================================

#[derive(Debug, Clone)]
enum Block {
    Group(usize),
    Heading(usize),
    Prose(Vec<String>),
    Steps(usize),
    Warning,
}

fn block() -> impl Strategy<Value = Block> {
    prop_oneof![
        (0..GROUPS.len()).prop_map(Block::Group),
        (0..HEADINGS.len()).prop_map(Block::Heading),
        prop::collection::vec(prop::string::string_regex("[a-z]{2,8}").unwrap(), 1..60)
            .prop_map(Block::Prose),
        (1usize..12).prop_map(Block::Steps),
        Just(Block::Warning),
    ]
}

fn render(block: &Block) -> String {
    match block {
        Block::Group(i) => GROUPS[*i].to_string(),
        Block::Heading(i) => HEADINGS[*i].to_string(),
        Block::Prose(words) => words
            .chunks(8)
            .map(|line| line.join(" "))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Steps(n) => (1..=*n)
            .map(|i| format!("({i}) Tighten bolt {i} to the specified torque."))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Warning => "WARNING: DISCONNECT THE BATTERY FIRST.".to_string(),
    }
}

/// Pages built from generated blocks, always opening with a group heading.
fn document() -> impl Strategy<Value = Vec<String>> {
    (prop::collection::vec(block(), 1..25), 1usize..4).prop_map(|(blocks, pages)| {
        let mut blocks = blocks;
        blocks.insert(0, Block::Group(0));
        let per_page = blocks.len().div_ceil(pages);
        blocks
            .chunks(per_page)
            .map(|page| page.iter().map(render).collect::<Vec<_>>().join("\n\n"))
            .collect()
    })
}

// =============================================================================
// Boundaries
// =============================================================================

proptest! {
    #[test]
    fn boundaries_strictly_ordered(pages in document()) {
        let profile = filtered();
        let boundaries = detect_boundaries(&pages, &profile);
        for pair in boundaries.windows(2) {
            prop_assert!(pair[0].position() < pair[1].position());
            prop_assert!(pair[0].line < pair[1].line);
        }
    }

    #[test]
    fn boundaries_point_at_their_lines(pages in document()) {
        let profile = filtered();
        let lines = document_lines(&pages);
        let mut page_of = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            page_of.extend(std::iter::repeat(i).take(page.split('\n').count()));
        }
        for b in detect_boundaries(&pages, &profile) {
            prop_assert!(b.line < lines.len());
            prop_assert!(!lines[b.line].trim().is_empty());
            prop_assert_eq!(b.page, page_of[b.line]);
        }
    }

    #[test]
    fn filter_is_idempotent(pages in document()) {
        let profile = filtered();
        let detected = detect_boundaries(&pages, &profile);
        let once = filter_boundaries(&detected, &profile, &pages);
        let twice = filter_boundaries(&once, &profile, &pages);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.iter().all(|b| detected.contains(b)));
    }
}

// =============================================================================
// Chunks
// =============================================================================

proptest! {
    #[test]
    fn chunks_respect_ceiling(pages in document()) {
        let profile = filtered();
        let budget = profile.budget();
        for chunk in chunk_document(&pages, &profile) {
            prop_assert!(
                budget.estimate(&chunk.text) <= budget.max(),
                "chunk {} has {} tokens",
                chunk.chunk_id,
                budget.estimate(&chunk.text)
            );
        }
    }

    #[test]
    fn chunks_are_nonempty_and_namespaced(pages in document()) {
        let profile = filtered();
        for chunk in chunk_document(&pages, &profile) {
            prop_assert!(!chunk.text.trim().is_empty());
            prop_assert!(chunk.chunk_id.starts_with("prop::"));
            prop_assert_eq!(
                chunk.meta_str("level1_id"),
                chunk.chunk_id.split("::").nth(1)
            );
        }
    }

    #[test]
    fn step_runs_stay_together(n in 1usize..20, words in 0usize..40) {
        let profile = roomy();
        let intro = vec!["lorem"; words].join(" ");
        let steps = render(&Block::Steps(n));
        let page = format!("7 Cooling System\n\nFAN BELT\n\n{intro}\n\n{steps}");

        let chunks = chunk_document(&[page.as_str()], &profile);
        let holding: Vec<_> = chunks.iter().filter(|c| c.text.contains("(1) ")).collect();
        prop_assert_eq!(holding.len(), 1);
        let last = format!("({n}) ");
        prop_assert!(holding[0].text.contains(&last));
    }

    #[test]
    fn cross_entry_merge_conserves_words(pages in document()) {
        let profile = filtered();
        let manifest = document_manifest(&pages, &profile);
        let drafts = draft_entries(&pages, &manifest, &profile);
        let before: Vec<String> = drafts
            .iter()
            .flat_map(|d| d.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let merged = merge_small_drafts(drafts, profile.budget());
        let after: Vec<String> = merged
            .iter()
            .flat_map(|d| d.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        prop_assert_eq!(before, after);
    }
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn empty_document_produces_nothing() {
    let profile = filtered();
    let pages: [&str; 0] = [];
    assert!(detect_boundaries(&pages, &profile).is_empty());
    assert!(chunk_document(&pages, &profile).is_empty());
    assert!(chunk_document(&[""], &profile).is_empty());
}

#[test]
fn chunking_is_deterministic() {
    let profile = filtered();
    let pages = [
        "7 Cooling System\n\nSERVICE PROCEDURES\n\nsome words here\n\n(1) Tighten it.",
        "FAN BELT\n\nmore words on the second page",
    ];
    assert_eq!(chunk_document(&pages, &profile), chunk_document(&pages, &profile));
}

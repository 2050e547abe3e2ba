//! Recursive splitting under a token ceiling.
//!
//! Tries progressively finer units until every piece fits.
//!
//! ## The Algorithm
//!
//! Given a ceiling of `max` estimated tokens:
//!
//! ```text
//! 1. Split on "\n\n" (paragraphs), accumulate while the total fits
//! 2. A paragraph group still over max? Split it on "\n" (lines)
//! 3. A line group still over max? Split it on whitespace (words)
//! ```
//!
//! Accumulation is greedy: units are appended to the current piece until the
//! next one would push it over the ceiling, then a new piece starts. A
//! paragraph boundary is better than a line boundary, which is better than a
//! word boundary, so coarse units are kept whenever they fit.
//!
//! Sizes are tracked as word counts and converted with
//! [`ChunkBudget::tokens_for_words`], so a piece's size is the sum of its
//! units' sizes. A single word is never split; with a token factor above
//! `max` it is emitted on its own.

use crate::capacity::ChunkBudget;

/// Split units, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Paragraph,
    Line,
    Word,
}

impl Unit {
    const fn finer(self) -> Option<Self> {
        match self {
            Self::Paragraph => Some(Self::Line),
            Self::Line => Some(Self::Word),
            Self::Word => None,
        }
    }

    const fn joiner(self) -> &'static str {
        match self {
            Self::Paragraph => "\n\n",
            Self::Line => "\n",
            Self::Word => " ",
        }
    }

    fn parts(self, text: &str) -> Vec<&str> {
        match self {
            Self::Paragraph => text.split("\n\n").collect(),
            Self::Line => text.split('\n').collect(),
            Self::Word => text.split_whitespace().collect(),
        }
    }
}

/// Paragraph → line → word splitter.
///
/// ## Example
///
/// ```rust
/// use strata::{ChunkBudget, RecursiveSplitter};
///
/// let splitter = RecursiveSplitter::new(ChunkBudget::new(0, 4));
/// let pieces = splitter.split("one two\n\nthree four five\n\nsix");
/// assert_eq!(pieces, vec!["one two", "three four five\n\nsix"]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    budget: ChunkBudget,
}

impl RecursiveSplitter {
    /// Create a splitter enforcing `budget.max()`.
    #[must_use]
    pub const fn new(budget: ChunkBudget) -> Self {
        Self { budget }
    }

    /// Split `text` into pieces that each fit the ceiling.
    ///
    /// Text that already fits is returned as a single piece. Blank text
    /// yields no pieces.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, Unit::Paragraph)
    }

    fn fits(&self, words: usize) -> bool {
        self.budget.tokens_for_words(words) <= self.budget.max()
    }

    fn split_recursive(&self, text: &str, unit: Unit) -> Vec<String> {
        let words = text.split_whitespace().count();
        if self.fits(words) {
            return vec![text.trim_matches('\n').to_string()];
        }
        let Some(finer) = unit.finer() else {
            // Word level: each part is one word, emitted alone when over.
            return self.accumulate(text, unit);
        };

        let parts: Vec<&str> = unit
            .parts(text)
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.len() <= 1 {
            // Unit not found, try the next one
            return self.split_recursive(text, finer);
        }

        let mut result = Vec::new();
        for piece in self.accumulate(text, unit) {
            if self.fits(piece.split_whitespace().count()) {
                result.push(piece);
            } else {
                // Too big, recurse with finer unit
                result.extend(self.split_recursive(&piece, finer));
            }
        }
        result
    }

    /// Greedily group `unit`s of `text` into pieces that fit where possible.
    fn accumulate(&self, text: &str, unit: Unit) -> Vec<String> {
        let mut result = Vec::new();
        let mut current = String::new();
        let mut current_words = 0;

        for part in unit.parts(text) {
            let part = part.trim_matches('\n');
            let part_words = part.split_whitespace().count();
            if part_words == 0 {
                continue;
            }

            if current.is_empty() {
                current.push_str(part);
                current_words = part_words;
            } else if !self.budget.would_overflow(current_words, part_words) {
                current.push_str(unit.joiner());
                current.push_str(part);
                current_words += part_words;
            } else {
                // Current piece is full
                result.push(std::mem::take(&mut current));
                current.push_str(part);
                current_words = part_words;
            }
        }

        // Don't forget the last piece
        if !current.is_empty() {
            result.push(current);
        }
        result
    }
}

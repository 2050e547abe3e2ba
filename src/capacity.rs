//! Chunk size budget.
//!
//! ## The Problem
//!
//! Embedding models count subword tokens; the assembler has only text. Running
//! a real tokenizer per fragment would tie the core to one model family, so
//! sizes are estimated instead:
//!
//! ```text
//! tokens ≈ floor(whitespace_words × factor)
//! ```
//!
//! The estimate deliberately under-counts. A chunk that ends up a little over
//! the model's real limit keeps its context; one that was split early because
//! of an over-count loses it.
//!
//! ## Min vs Max
//!
//! `ChunkBudget` carries two thresholds:
//!
//! - `min`: the smallest chunk worth emitting. Fragments under `min / 2` are
//!   merged within an entry; chunks under `min` are merged across entries.
//! - `max`: the hard ceiling. Fragments over it are split recursively.

use std::cmp::Ordering;

/// Size thresholds and the word-to-token estimate.
///
/// # Examples
///
/// ```rust
/// use strata::ChunkBudget;
///
/// let budget = ChunkBudget::new(200, 2000);
/// assert_eq!(budget.estimate("five words in this text"), 5);
///
/// let doubled = budget.with_factor(2.0);
/// assert_eq!(doubled.estimate("five words in this text"), 10);
///
/// let budget = ChunkBudget::from(100..=500);
/// assert_eq!(budget.min(), 100);
/// assert_eq!(budget.max(), 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBudget {
    min: usize,
    max: usize,
    factor: f64,
}

impl ChunkBudget {
    /// Create a budget with a 1:1 word-to-token estimate.
    #[must_use]
    pub const fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            factor: 1.0,
        }
    }

    /// Set tokens-per-word.
    #[must_use]
    pub const fn with_factor(self, factor: f64) -> Self {
        Self { factor, ..self }
    }

    /// Minimum target size in tokens.
    #[must_use]
    pub const fn min(&self) -> usize {
        self.min
    }

    /// Hard ceiling in tokens.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Tokens per word.
    #[must_use]
    pub const fn factor(&self) -> f64 {
        self.factor
    }

    /// Fragments strictly below this are merged forward within an entry.
    #[must_use]
    pub const fn merge_threshold(&self) -> usize {
        self.min / 2
    }

    /// Estimated token count of `text`.
    #[must_use]
    pub fn estimate(&self, text: &str) -> usize {
        self.tokens_for_words(text.split_whitespace().count())
    }

    /// Estimated token count of `words` whitespace-delimited words.
    #[must_use]
    pub fn tokens_for_words(&self, words: usize) -> usize {
        (words as f64 * self.factor).floor() as usize
    }

    /// Classify a size against the budget.
    ///
    /// Returns:
    /// - `Ordering::Less`: under `min`, a merge candidate
    /// - `Ordering::Equal`: within `min..=max`
    /// - `Ordering::Greater`: over `max`, must split
    #[must_use]
    pub fn fits(&self, tokens: usize) -> Ordering {
        if tokens < self.min {
            Ordering::Less
        } else if tokens > self.max {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Check if appending `additional` words to a piece of `current` words
    /// would exceed the ceiling.
    ///
    /// Useful for incremental chunk building. Works in words so that the
    /// estimate of the combined piece is computed once, not summed.
    #[must_use]
    pub fn would_overflow(&self, current: usize, additional: usize) -> bool {
        self.tokens_for_words(current.saturating_add(additional)) > self.max
    }
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self::new(200, 2000)
    }
}

impl From<std::ops::RangeInclusive<usize>> for ChunkBudget {
    fn from(range: std::ops::RangeInclusive<usize>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits() {
        let budget = ChunkBudget::new(100, 200);
        assert_eq!(budget.fits(50), Ordering::Less);
        assert_eq!(budget.fits(100), Ordering::Equal);
        assert_eq!(budget.fits(200), Ordering::Equal);
        assert_eq!(budget.fits(201), Ordering::Greater);
    }

    #[test]
    fn test_estimate_counts_words() {
        let budget = ChunkBudget::default();
        assert_eq!(budget.estimate(""), 0);
        assert_eq!(budget.estimate("  one\ttwo\n\nthree  "), 3);
    }

    #[test]
    fn test_factor_scales_and_floors() {
        let budget = ChunkBudget::default().with_factor(1.3);
        assert_eq!(budget.tokens_for_words(10), 13);
        assert_eq!(budget.tokens_for_words(1), 1);
        assert_eq!(budget.tokens_for_words(3), 3);
    }

    #[test]
    fn test_would_overflow() {
        let budget = ChunkBudget::new(0, 100);
        assert!(!budget.would_overflow(50, 50));
        assert!(budget.would_overflow(50, 51));

        let scaled = budget.with_factor(1.5);
        assert!(!scaled.would_overflow(33, 33));
        assert!(scaled.would_overflow(34, 34));
    }

    #[test]
    fn test_merge_threshold() {
        assert_eq!(ChunkBudget::new(200, 2000).merge_threshold(), 100);
        assert_eq!(ChunkBudget::new(1, 10).merge_threshold(), 0);
    }
}

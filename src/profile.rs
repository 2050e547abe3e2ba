//! Document profiles: per-manual-family configuration.
//!
//! ## The Problem
//!
//! Scanned service manuals all have structure, but no two families agree on
//! what it looks like:
//!
//! ```text
//! 1999 Cherokee FSM:   "7 Cooling System" / "SERVICE PROCEDURES" / "RADIATOR DRAINING"
//! CJ Universal:        "B Lubrication" / "B-4. Engine Lubrication System"
//! TM 9-8014:           "CHAPTER 2. OPERATING INSTRUCTIONS" / "Section III." / "42. Starting"
//! ```
//!
//! Rather than guessing, every manual family ships a YAML profile that names
//! its hierarchy levels and the patterns that recognize them. The core never
//! edits a profile; it only consumes the compiled form.
//!
//! ## Two Forms
//!
//! - [`ProfileSpec`]: the serde view of the YAML document. Every field is
//!   optional at parse time so that [`ProfileSpec::validate`] can report all
//!   problems at once instead of failing on the first missing key.
//! - [`Profile`]: the validated, compiled form. All regexes are built, the
//!   hierarchy is known to be contiguous, and the chunk budget is fixed.
//!
//! A profile that fails validation never becomes a [`Profile`], so
//! configuration mistakes surface before any page is scanned.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::capacity::ChunkBudget;
use crate::error::{Error, Result};

/// Profile schema version this crate understands.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

/// Accepted values for `source_format`.
pub const SOURCE_FORMATS: &[&str] = &["pdf-ocr", "pdf-native", "html", "epub"];

/// Accepted values for a safety callout's `level`.
pub const CALLOUT_LEVELS: &[&str] = &["warning", "caution", "note"];

/// Accepted values for a safety callout's `style`.
pub const CALLOUT_STYLES: &[&str] = &["block", "inline"];

// =============================================================================
// Serde view
// =============================================================================

/// The profile document as written in YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSpec {
    /// Schema version; must equal [`CURRENT_SCHEMA_VERSION`].
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Document identifier. Every chunk id is namespaced under it.
    pub manual_id: String,
    /// Human title, used as the first segment of hierarchical headers.
    pub manual_title: String,
    /// Where the source document came from.
    pub source_url: String,
    /// Source format, one of [`SOURCE_FORMATS`].
    pub source_format: String,
    /// Vehicles covered by the manual.
    pub vehicles: Vec<VehicleSpec>,
    /// Hierarchy and text patterns.
    pub structure: StructureSpec,
    /// Warning / caution / note patterns.
    pub safety_callouts: Vec<CalloutSpec>,
    /// Size thresholds.
    pub chunking: ChunkingSpec,
    /// Chunk-id segments below the document id whose entries are not assembled.
    pub skip_sections: Vec<String>,
}

fn default_schema_version() -> String {
    CURRENT_SCHEMA_VERSION.to_string()
}

/// One vehicle model covered by a manual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSpec {
    /// Model name, e.g. `"Cherokee XJ"`.
    pub model: String,
    /// Model years as written, e.g. `"1953-1971"`.
    pub years: String,
    /// Drivetrain names, e.g. `["2WD", "4WD"]`.
    pub drive_type: Vec<String>,
    /// Engines offered.
    pub engines: Vec<EngineSpec>,
    /// Transmissions offered.
    pub transmissions: Vec<TransmissionSpec>,
}

/// An engine option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSpec {
    /// Display name, e.g. `"4.0L I6"`.
    pub name: String,
    /// Factory code.
    pub code: String,
    /// Alternative spellings found in the text.
    pub aliases: Vec<String>,
}

/// A transmission option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionSpec {
    /// Display name.
    pub name: String,
    /// Factory code.
    pub code: String,
}

/// Hierarchy levels plus the in-text patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSpec {
    /// Levels, coarsest first, numbered 1..N.
    pub hierarchy: Vec<LevelSpec>,
    /// Patterns matching the first line of a procedural step.
    pub step_patterns: Vec<String>,
    /// Figure reference pattern; capture group 1 is the figure id.
    pub figure_reference: Option<PatternSpec>,
    /// Cross reference patterns; capture group 1 is the target.
    pub cross_reference: Option<CrossReferenceSpec>,
}

/// A single named pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSpec {
    /// The regex source.
    pub pattern: String,
}

/// A list of cross reference patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossReferenceSpec {
    /// The regex sources.
    pub patterns: Vec<String>,
}

/// One rung of the hierarchy ladder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSpec {
    /// 1-based level number.
    pub level: usize,
    /// Level name, which also becomes the entry's content type.
    pub name: String,
    /// Identifier pattern. Capture group 1, if any, is the id.
    pub id_pattern: Option<String>,
    /// Title pattern. Capture group 1, if any, is the title.
    pub title_pattern: Option<String>,
    /// Allow-list of ids for this level.
    pub known_ids: Vec<KnownId>,
    /// Drop boundaries whose id is not in `known_ids`.
    pub require_known_id: bool,
    /// Drop boundaries not preceded by a blank line.
    pub require_blank_before: bool,
    /// Minimum line distance between same-level boundaries.
    pub min_gap_lines: usize,
    /// Minimum words of content before the next boundary.
    pub min_content_words: usize,
}

/// An allow-listed identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnownId {
    /// The id as extracted by `id_pattern`.
    pub id: String,
    /// The section title it belongs to.
    pub title: String,
}

/// A safety callout pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalloutSpec {
    /// One of [`CALLOUT_LEVELS`].
    pub level: String,
    /// Line pattern.
    pub pattern: String,
    /// One of [`CALLOUT_STYLES`].
    #[serde(default = "default_callout_style")]
    pub style: String,
}

fn default_callout_style() -> String {
    "block".to_string()
}

/// Chunk size thresholds, in estimated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSpec {
    /// Target minimum; fragments under half of this are merged.
    pub min_tokens: usize,
    /// Hard ceiling enforced by splitting.
    pub max_tokens: usize,
    /// Tokens per whitespace-delimited word.
    pub token_factor: f64,
}

impl Default for ChunkingSpec {
    fn default() -> Self {
        let budget = ChunkBudget::default();
        Self {
            min_tokens: budget.min(),
            max_tokens: budget.max(),
            token_factor: budget.factor(),
        }
    }
}

impl ProfileSpec {
    /// Parse a YAML document without validating it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the profile, returning every problem found.
    ///
    /// An empty vector means the profile can be compiled.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.schema_version.is_empty() {
            errors.push("missing required field: schema_version".to_string());
        } else if self.schema_version != CURRENT_SCHEMA_VERSION {
            errors.push(format!(
                "unsupported schema_version '{}' (expected '{CURRENT_SCHEMA_VERSION}')",
                self.schema_version
            ));
        }
        for (field, value) in [
            ("manual_id", &self.manual_id),
            ("manual_title", &self.manual_title),
            ("source_url", &self.source_url),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("missing required field: {field}"));
            }
        }
        if !SOURCE_FORMATS.contains(&self.source_format.as_str()) {
            errors.push(format!(
                "invalid source_format '{}' (expected one of: {})",
                self.source_format,
                SOURCE_FORMATS.join(", ")
            ));
        }
        if self.vehicles.is_empty() {
            errors.push("at least one vehicle is required".to_string());
        }

        let hierarchy = &self.structure.hierarchy;
        if hierarchy.is_empty() {
            errors.push("at least one hierarchy level is required".to_string());
        }
        let sequential = hierarchy
            .iter()
            .enumerate()
            .all(|(i, level)| level.level == i + 1);
        if !sequential {
            let found: Vec<String> = hierarchy.iter().map(|l| l.level.to_string()).collect();
            errors.push(format!(
                "hierarchy levels must be sequential 1..{} (found {})",
                hierarchy.len(),
                found.join(", ")
            ));
        }
        for level in hierarchy {
            if let Some(p) = &level.id_pattern {
                check_pattern(&mut errors, p, &format!("id_pattern at hierarchy level {}", level.level));
            }
            if let Some(p) = &level.title_pattern {
                check_pattern(
                    &mut errors,
                    p,
                    &format!("title_pattern at hierarchy level {}", level.level),
                );
            }
        }

        for (i, p) in self.structure.step_patterns.iter().enumerate() {
            check_pattern(&mut errors, p, &format!("step_patterns[{i}]"));
        }
        if let Some(fig) = &self.structure.figure_reference {
            check_pattern(&mut errors, &fig.pattern, "figure_reference pattern");
        }
        if let Some(xref) = &self.structure.cross_reference {
            for (i, p) in xref.patterns.iter().enumerate() {
                check_pattern(&mut errors, p, &format!("cross_reference patterns[{i}]"));
            }
        }

        for callout in &self.safety_callouts {
            if !CALLOUT_LEVELS.contains(&callout.level.as_str()) {
                errors.push(format!(
                    "invalid callout level '{}' (expected one of: {})",
                    callout.level,
                    CALLOUT_LEVELS.join(", ")
                ));
            }
            if !CALLOUT_STYLES.contains(&callout.style.as_str()) {
                errors.push(format!(
                    "invalid callout style '{}' (expected one of: {})",
                    callout.style,
                    CALLOUT_STYLES.join(", ")
                ));
            }
            check_pattern(&mut errors, &callout.pattern, "safety callout pattern");
        }

        let chunking = &self.chunking;
        if chunking.max_tokens == 0 {
            errors.push("chunking.max_tokens must be > 0".to_string());
        }
        if chunking.min_tokens > chunking.max_tokens {
            errors.push(format!(
                "chunking.min_tokens ({}) exceeds chunking.max_tokens ({})",
                chunking.min_tokens, chunking.max_tokens
            ));
        }
        if chunking.token_factor.is_nan() || chunking.token_factor <= 0.0 {
            errors.push(format!(
                "chunking.token_factor must be positive (got {})",
                chunking.token_factor
            ));
        }

        errors
    }
}

fn check_pattern(errors: &mut Vec<String>, pattern: &str, field: &str) {
    if let Err(e) = Regex::new(pattern) {
        errors.push(format!("invalid regex in {field}: {e}"));
    }
}

fn compile(pattern: &str, field: impl Into<String>) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        field: field.into(),
        source,
    })
}

// =============================================================================
// Compiled form
// =============================================================================

/// Severity of a safety callout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutLevel {
    /// Risk of injury.
    Warning,
    /// Risk of damage.
    Caution,
    /// Informational.
    Note,
}

impl CalloutLevel {
    /// Lowercase name as used in profiles and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Caution => "caution",
            Self::Note => "note",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "warning" => Some(Self::Warning),
            "caution" => Some(Self::Caution),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

impl std::fmt::Display for CalloutLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled safety callout pattern.
#[derive(Debug, Clone)]
pub struct SafetyCallout {
    /// Severity.
    pub level: CalloutLevel,
    /// Compiled line pattern.
    pub pattern: Regex,
}

/// Per-level boundary filter thresholds. Zero / false disables a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelFilter {
    /// Pass 0: reject ids outside the allow-list.
    pub require_known_id: bool,
    /// Pass 1: reject boundaries without a blank line above.
    pub require_blank_before: bool,
    /// Pass 2: minimum distance from the previous same-level boundary.
    pub min_gap_lines: usize,
    /// Pass 3: minimum words before the next boundary.
    pub min_content_words: usize,
}

/// A compiled hierarchy level.
#[derive(Debug, Clone)]
pub struct HierarchyLevel {
    /// 1-based level number.
    pub level: usize,
    /// Level name.
    pub name: String,
    /// Compiled identifier pattern.
    pub id_pattern: Option<Regex>,
    /// Compiled title pattern.
    pub title_pattern: Option<Regex>,
    /// Allow-listed ids.
    pub known_ids: Vec<KnownId>,
    /// Filter thresholds.
    pub filter: LevelFilter,
}

impl HierarchyLevel {
    /// Whether `id` is in this level's allow-list.
    #[must_use]
    pub fn is_known(&self, id: &str) -> bool {
        self.known_ids.iter().any(|k| k.id == id)
    }
}

/// A validated, compiled document profile.
///
/// # Examples
///
/// ```rust
/// use strata::Profile;
///
/// let profile = Profile::from_yaml_str(r#"
/// manual_id: demo
/// manual_title: Demo Manual
/// source_url: file://demo.pdf
/// source_format: pdf-native
/// vehicles: [{model: Demo}]
/// structure:
///   hierarchy:
///     - {level: 1, name: chapter, id_pattern: '^(\d+) \w'}
/// "#).unwrap();
///
/// assert_eq!(profile.document_id(), "demo");
/// assert_eq!(profile.levels().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Profile {
    spec: ProfileSpec,
    levels: Vec<HierarchyLevel>,
    step_patterns: Vec<Regex>,
    callouts: Vec<SafetyCallout>,
    figure_pattern: Option<Regex>,
    cross_ref_patterns: Vec<Regex>,
    budget: ChunkBudget,
}

impl Profile {
    /// Load and compile a YAML profile from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ProfileNotFound(path.to_path_buf()));
        }
        let yaml = std::fs::read_to_string(path)?;
        let profile = Self::from_yaml_str(&yaml)?;
        tracing::info!(
            manual_id = %profile.document_id(),
            levels = profile.levels.len(),
            path = %path.display(),
            "loaded profile"
        );
        Ok(profile)
    }

    /// Parse, validate and compile a YAML profile.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::compile(ProfileSpec::from_yaml_str(yaml)?)
    }

    /// Validate and compile a parsed profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] with every validation message if the
    /// profile is not usable.
    pub fn compile(spec: ProfileSpec) -> Result<Self> {
        let errors = spec.validate();
        if !errors.is_empty() {
            return Err(Error::InvalidProfile(errors));
        }

        let levels = spec
            .structure
            .hierarchy
            .iter()
            .map(|l| {
                Ok(HierarchyLevel {
                    level: l.level,
                    name: l.name.clone(),
                    id_pattern: l
                        .id_pattern
                        .as_deref()
                        .map(|p| compile(p, format!("id_pattern at hierarchy level {}", l.level)))
                        .transpose()?,
                    title_pattern: l
                        .title_pattern
                        .as_deref()
                        .map(|p| compile(p, format!("title_pattern at hierarchy level {}", l.level)))
                        .transpose()?,
                    known_ids: l.known_ids.clone(),
                    filter: LevelFilter {
                        require_known_id: l.require_known_id,
                        require_blank_before: l.require_blank_before,
                        min_gap_lines: l.min_gap_lines,
                        min_content_words: l.min_content_words,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let step_patterns = spec
            .structure
            .step_patterns
            .iter()
            .enumerate()
            .map(|(i, p)| compile(p, format!("step_patterns[{i}]")))
            .collect::<Result<Vec<_>>>()?;

        // Anchored callout patterns are matched as written; free-floating
        // ones ("Caution", "Note.") vary in case across OCR output.
        let callouts = spec
            .safety_callouts
            .iter()
            .filter_map(|c| CalloutLevel::parse(&c.level).map(|level| (level, c)))
            .map(|(level, c)| {
                let pattern = RegexBuilder::new(&c.pattern)
                    .case_insensitive(!c.pattern.starts_with('^'))
                    .build()
                    .map_err(|source| Error::InvalidPattern {
                        field: "safety callout pattern".to_string(),
                        source,
                    })?;
                Ok(SafetyCallout { level, pattern })
            })
            .collect::<Result<Vec<_>>>()?;

        let figure_pattern = spec
            .structure
            .figure_reference
            .as_ref()
            .map(|f| compile(&f.pattern, "figure_reference pattern"))
            .transpose()?;

        let cross_ref_patterns = spec
            .structure
            .cross_reference
            .as_ref()
            .map(|x| x.patterns.as_slice())
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, p)| compile(p, format!("cross_reference patterns[{i}]")))
            .collect::<Result<Vec<_>>>()?;

        let budget = ChunkBudget::new(spec.chunking.min_tokens, spec.chunking.max_tokens)
            .with_factor(spec.chunking.token_factor);

        Ok(Self {
            spec,
            levels,
            step_patterns,
            callouts,
            figure_pattern,
            cross_ref_patterns,
            budget,
        })
    }

    /// The parsed document this profile was compiled from.
    #[must_use]
    pub fn spec(&self) -> &ProfileSpec {
        &self.spec
    }

    /// Document id (`manual_id`).
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.spec.manual_id
    }

    /// Document title (`manual_title`).
    #[must_use]
    pub fn title(&self) -> &str {
        &self.spec.manual_title
    }

    /// Hierarchy levels, coarsest first. Index `i` holds level `i + 1`.
    #[must_use]
    pub fn levels(&self) -> &[HierarchyLevel] {
        &self.levels
    }

    /// Look up a level by its 1-based number.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<&HierarchyLevel> {
        level.checked_sub(1).and_then(|i| self.levels.get(i))
    }

    /// Step-line patterns.
    #[must_use]
    pub fn step_patterns(&self) -> &[Regex] {
        &self.step_patterns
    }

    /// Safety callout patterns.
    #[must_use]
    pub fn callouts(&self) -> &[SafetyCallout] {
        &self.callouts
    }

    /// Figure reference pattern.
    #[must_use]
    pub fn figure_pattern(&self) -> Option<&Regex> {
        self.figure_pattern.as_ref()
    }

    /// Cross reference patterns.
    #[must_use]
    pub fn cross_ref_patterns(&self) -> &[Regex] {
        &self.cross_ref_patterns
    }

    /// Size thresholds.
    #[must_use]
    pub fn budget(&self) -> ChunkBudget {
        self.budget
    }

    /// Vehicles covered.
    #[must_use]
    pub fn vehicles(&self) -> &[VehicleSpec] {
        &self.spec.vehicles
    }

    /// Skip namespaces as full chunk-id prefixes (`{doc}::{section}`).
    #[must_use]
    pub fn skip_prefixes(&self) -> Vec<String> {
        self.spec
            .skip_sections
            .iter()
            .map(|s| format!("{}::{s}", self.spec.manual_id))
            .collect()
    }

    /// Whether `chunk_id` falls under a skip namespace.
    ///
    /// `xj-1999::8W` and `xj-1999::8W::...` are skipped by `8W`;
    /// `xj-1999::8WX` is not.
    #[must_use]
    pub fn is_skipped(&self, chunk_id: &str) -> bool {
        self.skip_prefixes()
            .iter()
            .any(|p| in_namespace(chunk_id, p))
    }
}

/// Whether `id` equals `prefix` or is a descendant of it.
pub(crate) fn in_namespace(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(crate::manifest::ID_DELIMITER))
}

//! Manifest construction: from a flat boundary list to a hierarchy.
//!
//! ## Ancestry From Order Alone
//!
//! Boundaries carry a level but no parent. The parent is recovered by walking
//! them in order with one open slot per level:
//!
//! ```text
//! boundary              slots [1, 2, 3]          chunk id
//! 7 Cooling System      [7, -, -]                xj::7
//! SERVICE PROCEDURES    [7, SP, -]               xj::7::SERVICE PROCEDURES
//! RADIATOR DRAINING     [7, SP, RD]              xj::7::SERVICE PROCEDURES::RADIATOR DRAINING
//! SPECIFICATIONS        [7, SPEC, -]   (closes 3) xj::7::SPECIFICATIONS
//! 8A Battery            [8A, -, -]     (closes 2, 3)
//! ```
//!
//! A boundary at level L closes every slot at L and below, takes slot L, and
//! its parent is the nearest occupied slot above it. The slots are a fixed
//! array sized to the profile's hierarchy depth.
//!
//! Entry line ranges are recorded by start only. An entry ends where the next
//! one starts; the assembler resolves that, so building a manifest needs no
//! look-ahead. [`Manifest::annotate`] fills the ends (and the content tags)
//! for inspection and persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::boundary::{document_lines, page_of_line, page_starts, Boundary};
use crate::detect;
use crate::error::Result;
use crate::profile::Profile;

/// Separator between chunk-id segments.
pub const ID_DELIMITER: &str = "::";

/// Join a document id and hierarchy segments into a chunk id.
///
/// # Examples
///
/// ```rust
/// use strata::generate_chunk_id;
///
/// assert_eq!(generate_chunk_id("xj-1999", &["0", "SP", "JSP"]), "xj-1999::0::SP::JSP");
/// assert_eq!(generate_chunk_id::<&str>("xj-1999", &[]), "xj-1999");
/// ```
#[must_use]
pub fn generate_chunk_id<S: AsRef<str>>(document_id: &str, segments: &[S]) -> String {
    let mut id = document_id.to_string();
    for segment in segments {
        id.push_str(ID_DELIMITER);
        id.push_str(segment.as_ref());
    }
    id
}

/// The level-1 segment of a chunk id (the segment after the document id).
///
/// ```rust
/// use strata::level1_segment;
///
/// assert_eq!(level1_segment("xj-1999::7::SP::part2"), Some("7"));
/// assert_eq!(level1_segment("xj-1999"), None);
/// ```
#[must_use]
pub fn level1_segment(chunk_id: &str) -> Option<&str> {
    chunk_id.split(ID_DELIMITER).nth(1)
}

/// First and last page of an entry or chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    /// First page (0-based).
    pub start: usize,
    /// Last page (0-based, inclusive).
    pub end: usize,
}

/// Global line span of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// The boundary's global line.
    pub start: usize,
    /// Exclusive end; `None` until resolved against the next entry.
    pub end: Option<usize>,
}

/// One hierarchy node with its position and lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Namespaced id: document id plus every ancestor segment.
    pub chunk_id: String,
    /// 1-based level.
    pub level: usize,
    /// Level name.
    pub level_name: String,
    /// Entry title.
    pub title: String,
    /// Titles from the level-1 ancestor down to this entry.
    pub hierarchy_path: Vec<String>,
    /// Content type tag (the level name).
    pub content_type: String,
    /// Pages covered.
    pub page_range: PageRange,
    /// Lines covered.
    pub line_range: LineRange,
    /// Vehicle models mentioned in the entry's span.
    #[serde(default)]
    pub vehicle_applicability: Vec<String>,
    /// Engines mentioned in the entry's span.
    #[serde(default)]
    pub engine_applicability: Vec<String>,
    /// Drivetrains mentioned in the entry's span.
    #[serde(default)]
    pub drivetrain_applicability: Vec<String>,
    /// Callout levels present in the entry's span.
    #[serde(default)]
    pub has_safety_callouts: Vec<String>,
    /// Figure ids referenced in the entry's span.
    #[serde(default)]
    pub figure_references: Vec<String>,
    /// Qualified cross references in the entry's span.
    #[serde(default)]
    pub cross_references: Vec<String>,
    /// Chunk id of the nearest ancestor.
    pub parent_chunk_id: Option<String>,
    /// Chunk ids of direct children, in order.
    #[serde(default)]
    pub children: Vec<String>,
}

/// All entries for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Document id.
    pub document_id: String,
    /// Entries in boundary order.
    pub entries: Vec<ManifestEntry>,
}

/// Build a manifest from filtered boundaries.
///
/// One entry per boundary, in order. Ancestry is derived from the sequence.
#[must_use]
pub fn build_manifest(boundaries: &[Boundary], profile: &Profile) -> Manifest {
    let document_id = profile.document_id().to_string();
    let mut slots: Vec<Option<usize>> = vec![None; profile.levels().len()];
    let mut entries: Vec<ManifestEntry> = Vec::with_capacity(boundaries.len());

    for b in boundaries {
        let depth = b.level.max(1);
        if slots.len() < depth {
            slots.resize(depth, None);
        }
        for slot in &mut slots[depth - 1..] {
            *slot = None;
        }

        let ancestors: Vec<usize> = slots[..depth - 1].iter().flatten().copied().collect();
        let title = b
            .title
            .clone()
            .or_else(|| b.id.clone())
            .unwrap_or_else(|| b.level_name.clone());
        let segment = b.id.clone().unwrap_or_else(|| title.clone());

        let parent = ancestors.last().copied();
        let chunk_id = match parent {
            Some(p) => generate_chunk_id(&entries[p].chunk_id, &[&segment]),
            None => generate_chunk_id(&document_id, &[&segment]),
        };
        let mut hierarchy_path: Vec<String> =
            ancestors.iter().map(|&a| entries[a].title.clone()).collect();
        hierarchy_path.push(title.clone());

        let index = entries.len();
        entries.push(ManifestEntry {
            chunk_id: chunk_id.clone(),
            level: b.level,
            level_name: b.level_name.clone(),
            title,
            hierarchy_path,
            content_type: b.level_name.clone(),
            page_range: PageRange {
                start: b.page,
                end: b.page,
            },
            line_range: LineRange {
                start: b.line,
                end: None,
            },
            vehicle_applicability: Vec::new(),
            engine_applicability: Vec::new(),
            drivetrain_applicability: Vec::new(),
            has_safety_callouts: Vec::new(),
            figure_references: Vec::new(),
            cross_references: Vec::new(),
            parent_chunk_id: parent.map(|p| entries[p].chunk_id.clone()),
            children: Vec::new(),
        });
        if let Some(p) = parent {
            entries[p].children.push(chunk_id);
        }
        slots[depth - 1] = Some(index);
    }

    tracing::debug!(entries = entries.len(), "built manifest");
    Manifest {
        document_id,
        entries,
    }
}

impl Manifest {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by chunk id.
    #[must_use]
    pub fn get(&self, chunk_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.chunk_id == chunk_id)
    }

    /// Resolve each entry's span and fill its ends and content tags.
    ///
    /// Tags describe the entry's own span only (up to the next entry), so a
    /// group entry does not inherit its sections' tags.
    pub fn annotate<S: AsRef<str>>(&mut self, pages: &[S], profile: &Profile) {
        let lines = document_lines(pages);
        let starts = page_starts(pages);
        let total = lines.len();
        let next_starts: Vec<usize> = self
            .entries
            .iter()
            .skip(1)
            .map(|e| e.line_range.start)
            .chain(std::iter::once(total))
            .collect();

        for (entry, next) in self.entries.iter_mut().zip(next_starts) {
            let start = entry.line_range.start.min(total);
            let end = next.clamp(start, total);
            entry.line_range.end = Some(end);
            entry.page_range.end = page_of_line(&starts, end.saturating_sub(1).max(start));

            let text = lines[start..end].join("\n");
            let applicability = detect::applicability(&text, profile);
            entry.vehicle_applicability = applicability.vehicles;
            entry.engine_applicability = applicability.engines;
            entry.drivetrain_applicability = applicability.drivetrains;
            entry.has_safety_callouts = detect::safety_levels(&text, profile)
                .iter()
                .map(|l| l.as_str().to_string())
                .collect();
            entry.figure_references = detect::figure_references(&text, profile);
            entry.cross_references = detect::cross_references(&text, profile)
                .iter()
                .map(|target| generate_chunk_id(&self.document_id, &[target]))
                .collect();
        }
    }

    /// Write the manifest as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Read a manifest written by [`Manifest::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

//! The Chunk type: the assembler's output unit, and its JSONL persistence.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Default number of body words in [`Chunk::embedding_input`].
pub const EMBEDDING_BODY_WORDS: usize = 150;

/// A bounded piece of a manual with its structural metadata.
///
/// The four fields are the whole persisted contract: one JSON object per
/// line, exactly these keys.
///
/// ## Chunk Ids
///
/// A chunk id is its manifest entry's id, with a `::partN` suffix when the
/// entry produced more than one chunk:
///
/// ```text
/// xj-1999::7::SERVICE PROCEDURES::RADIATOR DRAINING
/// xj-1999::7::SPECIFICATIONS::part1
/// xj-1999::7::SPECIFICATIONS::part2
/// ```
///
/// ## Embedding Input
///
/// Downstream embedding reads the hierarchical header and a bounded prefix
/// of the body:
///
/// ```rust
/// use strata::Chunk;
/// use serde_json::json;
///
/// let mut chunk = Chunk::new("doc::1", "doc", "one two three four");
/// chunk.metadata.insert("hierarchical_header".into(), json!("Manual | Group 1"));
/// assert_eq!(chunk.embedding_input(2), "Manual | Group 1\n\none two");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Namespaced id.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk body.
    pub text: String,
    /// Structural metadata.
    pub metadata: Map<String, Value>,
}

impl Chunk {
    /// Create a chunk with empty metadata.
    #[must_use]
    pub fn new(
        chunk_id: impl Into<String>,
        document_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            document_id: document_id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    /// A string metadata value.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// A string-list metadata value; missing or mistyped keys yield nothing.
    #[must_use]
    pub fn meta_list(&self, key: &str) -> Vec<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// `"{hierarchical_header}\n\n{first max_words words}"`.
    ///
    /// Without a header, just the truncated body.
    #[must_use]
    pub fn embedding_input(&self, max_words: usize) -> String {
        let body: Vec<&str> = self.text.split_whitespace().take(max_words).collect();
        let body = body.join(" ");
        match self.meta_str("hierarchical_header") {
            Some(header) if !header.is_empty() => format!("{header}\n\n{body}"),
            _ => body,
        }
    }

    /// Whitespace word count of the body.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunk {{ id: {}, words: {}, keys: {} }}",
            self.chunk_id,
            self.word_count(),
            self.metadata.len()
        )
    }
}

/// Write chunks as JSON lines.
pub fn write_chunks<W: Write>(chunks: &[Chunk], mut writer: W) -> Result<()> {
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read JSON lines, skipping blank lines.
pub fn read_chunks<R: BufRead>(reader: R) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        chunks.push(serde_json::from_str(&line)?);
    }
    Ok(chunks)
}

/// Save chunks to a JSONL file, creating parent directories.
///
/// An empty slice produces an empty file.
pub fn save_chunks(chunks: &[Chunk], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_chunks(chunks, BufWriter::new(File::create(path)?))?;
    tracing::info!(count = chunks.len(), path = %path.display(), "saved chunks");
    Ok(())
}

/// Load chunks from a JSONL file.
pub fn load_chunks(path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    read_chunks(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Chunk {
        let mut chunk = Chunk::new("xj-1999::0::SP::JSP", "xj-1999", "Connect the cable.\n(1) Step.");
        chunk.metadata.insert("level1_id".into(), json!("0"));
        chunk.metadata.insert("page_range".into(), json!({"start": 3, "end": 4}));
        chunk.metadata.insert("figure_references".into(), json!(["1", "2"]));
        chunk
    }

    #[test]
    fn test_jsonl_has_four_keys_per_line() {
        let mut buf = Vec::new();
        write_chunks(&[sample(), sample()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: Value = serde_json::from_str(lines[0]).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let line = serde_json::to_string(&sample()).unwrap();
        let content = format!("{line}\n\n{line}\n");
        let chunks = read_chunks(content.as_bytes()).unwrap();
        assert_eq!(chunks, vec![sample(), sample()]);
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(read_chunks("not json\n".as_bytes()).is_err());
    }

    #[test]
    fn test_meta_accessors() {
        let chunk = sample();
        assert_eq!(chunk.meta_str("level1_id"), Some("0"));
        assert_eq!(chunk.meta_list("figure_references"), vec!["1", "2"]);
        assert!(chunk.meta_list("missing").is_empty());
    }

    #[test]
    fn test_embedding_input_without_header() {
        let chunk = Chunk::new("a", "a", "one two three");
        assert_eq!(chunk.embedding_input(EMBEDDING_BODY_WORDS), "one two three");
    }
}

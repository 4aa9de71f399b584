use crate::chunker;
use crate::error::{RagError, Result};
use crate::models::*;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const RECORD_MARKER: &str = "ID:";

fn record_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ID:\s*(\S+)").expect("record id pattern is valid"))
}

fn section_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Sct\.").expect("section marker pattern is valid"))
}

fn not_applicable() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bN/A\b").expect("n/a pattern is valid"))
}

/// Turns raw sources into documents and documents into segments.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    max_length: usize,
    overlap: usize,
}

impl DocumentProcessor {
    pub fn new(max_length: usize, overlap: usize) -> Self {
        Self { max_length, overlap }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Split a record file's content into one document per `ID:` record.
    ///
    /// Anything before the first marker is ignored. Records without an id or
    /// without content are skipped.
    pub fn parse_records(&self, content: &str) -> Vec<Document> {
        let mut documents = Vec::new();

        for record in content.split(RECORD_MARKER).skip(1) {
            let full_record = format!("{}{}", RECORD_MARKER, record);
            let full_record = full_record.trim();

            let Some(id) = record_id().captures(full_record).map(|c| c[1].to_string()) else {
                let preview: String = full_record.chars().take(100).collect();
                log::warn!("Skipping record without an id: {}...", preview);
                continue;
            };

            let cleaned = section_marker().replace_all(full_record, "");
            let cleaned = not_applicable().replace_all(cleaned.trim(), "");
            let cleaned = cleaned.trim();

            if cleaned.is_empty() {
                log::warn!("Record {} has no usable content", id);
                continue;
            }

            documents.push(Document::new(id, cleaned));
        }

        log::info!("Parsed {} records", documents.len());
        documents
    }

    pub async fn load_records(&self, path: impl AsRef<Path>) -> Result<Vec<Document>> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(self.parse_records(&content))
    }

    /// Load every `.txt` and `.pdf` file in `dir`, ordered by file name.
    pub async fn process_documents(&self, dir: impl AsRef<Path>) -> Result<Vec<Document>> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase());
            let content = match extension.as_deref() {
                Some("txt") => tokio::fs::read_to_string(&path).await?,
                Some("pdf") => extract_pdf(path.clone()).await?,
                _ => continue,
            };

            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| RagError::Validation(format!("unnamed file {}", path.display())))?;

            log::info!("Loaded document {} from {}", id, path.display());
            documents.push(Document::new(id, content));
        }

        log::info!("Processed {} documents", documents.len());
        Ok(documents)
    }

    pub fn segment(&self, document: &Document) -> Vec<Segment> {
        chunker::chunk(&document.content, self.max_length, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Segment {
                id: Segment::derive_id(&document.id, index),
                text,
                source_document_id: document.id.clone(),
            })
            .collect()
    }

    /// Segment many documents in parallel; output keeps document order.
    pub fn segment_all(&self, documents: &[Document]) -> Vec<Segment> {
        let segments: Vec<Segment> = documents
            .par_iter()
            .flat_map_iter(|document| self.segment(document))
            .collect();

        log::info!(
            "Created {} segments from {} documents",
            segments.len(),
            documents.len()
        );
        segments
    }

    /// Segments longer than `max_length` (the long-sentence relaxation).
    pub fn over_length<'a>(&self, segments: &'a [Segment]) -> Vec<&'a Segment> {
        segments
            .iter()
            .filter(|s| chunker::char_len(&s.text) > self.max_length)
            .collect()
    }
}

/// Segment ids that occur more than once, each reported once in first-seen order.
///
/// A document id like `Q1_2` collides with the second segment of `Q1`; the index
/// upserts by id, so the later segment silently replaces the earlier one.
pub fn duplicate_ids(segments: &[Segment]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    segments
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !seen.insert(*id) && reported.insert(*id))
        .collect()
}

async fn extract_pdf(path: PathBuf) -> Result<String> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
        .await
        .map_err(|e| RagError::Decode(format!("PDF extraction for {} aborted: {}", display, e)))?
        .map_err(|e| RagError::Decode(format!("could not extract text from {}: {}", display, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDS: &str = "Preamble that is ignored.\n\
ID: ACC_LOGIN_P1\nSct. Pregunta: How do I log in?\n\nSct. Respuesta: Use your user name. N/A\n\
ID: ACC_RESET_P2\nHow do I reset my password?\n\nGo to settings.\n\
ID:\n";

    #[test]
    fn parses_ids_and_strips_markers() {
        let processor = DocumentProcessor::new(512, 100);
        let docs = processor.parse_records(RECORDS);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "ACC_LOGIN_P1");
        assert!(!docs[0].content.contains("Sct."));
        assert!(!docs[0].content.contains("N/A"));
        assert!(docs[0].content.starts_with("ID: ACC_LOGIN_P1"));
        assert_eq!(docs[1].id, "ACC_RESET_P2");
    }

    #[test]
    fn segment_ids_follow_record_convention() {
        let processor = DocumentProcessor::new(40, 5);
        let doc = Document::new(
            "Q7",
            "First paragraph is here.\n\nSecond paragraph is here.\n\nThird paragraph too.",
        );
        let segments = processor.segment(&doc);

        assert!(segments.len() >= 2);
        assert_eq!(segments[0].id, "Q7");
        assert_eq!(segments[1].id, "Q7_2");
        assert!(segments.iter().all(|s| s.source_document_id == "Q7"));
    }

    #[test]
    fn segment_all_preserves_document_order() {
        let processor = DocumentProcessor::new(512, 50);
        let docs: Vec<Document> = (0..20)
            .map(|i| Document::new(format!("D{}", i), format!("Body of document {}.", i)))
            .collect();
        let segments = processor.segment_all(&docs);
        let ids: Vec<String> = segments.iter().map(|s| s.id.clone()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("D{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn derived_ids_colliding_with_document_ids_are_reported() {
        let processor = DocumentProcessor::new(40, 5);
        let docs = vec![
            Document::new(
                "Q7",
                "First paragraph is here.\n\nSecond paragraph is here.\n\nThird paragraph too.",
            ),
            Document::new("Q7_2", "A record whose id looks derived."),
            Document::new("Q8", "Unrelated."),
        ];
        let segments = processor.segment_all(&docs);

        assert_eq!(duplicate_ids(&segments), vec!["Q7_2"]);
    }

    #[test]
    fn unique_ids_have_no_duplicates() {
        let processor = DocumentProcessor::new(512, 50);
        let docs = vec![Document::new("A", "One."), Document::new("B", "Two.")];
        assert!(duplicate_ids(&processor.segment_all(&docs)).is_empty());
    }

    #[tokio::test]
    async fn loads_text_files_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "Second.").unwrap();
        std::fs::write(dir.path().join("a.txt"), "First.").unwrap();
        std::fs::write(dir.path().join("notes.md"), "Ignored.").unwrap();

        let processor = DocumentProcessor::new(512, 50);
        let docs = processor.process_documents(dir.path()).await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs[0].content, "First.");
    }
}

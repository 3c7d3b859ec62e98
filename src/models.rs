//! Core data models used throughout the assistant.
//!
//! These types represent the scraped corpus records, the indexed documents
//! that flow through the build pipeline, and the structured records and
//! results produced at query time.

use serde::{Deserialize, Serialize};

/// Top-level shape of the corpus file produced by the scraper.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusFile {
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub pages_crawled: u64,
    /// Per-page index entries; carried by the scraper but unused here.
    #[serde(default)]
    pub index: Vec<serde_json::Value>,
    #[serde(default)]
    pub content_sections: Vec<DocumentSection>,
}

/// One scraped unit of API documentation.
///
/// Every field defaults when absent so a partially populated scrape still
/// loads; a section with no text and no code simply embeds as its title.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentSection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub code_blocks: Vec<String>,
    /// Extracted tables as arbitrary JSON rows.
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Source page URL.
    #[serde(default)]
    pub source: String,
}

/// Metadata persisted alongside each indexed document.
///
/// `code_blocks_json` and `tables_json` are the serialized section fields;
/// they are parsed back at query time to re-run structuring on the match.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub section_id: String,
    pub title: String,
    pub source: String,
    pub code_blocks_json: String,
    pub tables_json: String,
}

/// A document as stored in the vector collection: deterministic id, the
/// composed content that was embedded, its vector, and display metadata.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    /// Deterministic id derived from corpus position (`doc_{idx}`).
    pub doc_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// A nearest-neighbor match returned from the vector index.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub doc_id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Normalized API description derived from a retrieved section.
///
/// Never persisted; recomputed on every query by the structurer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredApiRecord {
    pub api_name: String,
    pub endpoint: Option<String>,
    /// First request-body object parsed from the section's code blocks.
    pub required_payload: serde_json::Map<String, serde_json::Value>,
    /// First response-body object parsed from the section's code blocks.
    pub response_body: serde_json::Map<String, serde_json::Value>,
    /// First code block containing a curl invocation, verbatim.
    pub example: String,
}

/// Final result of one query: the sanitized question, the structured
/// matches, and the cleaned answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub matches: Vec<StructuredApiRecord>,
    pub answer: String,
}

//! Corpus loading.
//!
//! The scraper (out of scope here) writes a single JSON document of the
//! shape `{start_url, pages_crawled, index, content_sections}`. The build
//! pipeline only consumes `content_sections`; the rest is crawl metadata.

use std::path::Path;

use crate::error::AssistantError;
use crate::models::{CorpusFile, DocumentSection};

/// Load the scraped corpus and return its sections in file order.
///
/// A file that cannot be read or parsed is a [`AssistantError::CorpusFormat`]
/// failure; a well-formed file with zero sections is
/// [`AssistantError::CorpusEmpty`]. Both are fatal to the build path.
pub fn load_corpus(path: &Path) -> Result<Vec<DocumentSection>, AssistantError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AssistantError::CorpusFormat(format!("cannot read {}: {}", path.display(), e))
    })?;

    let corpus: CorpusFile = serde_json::from_str(&raw).map_err(|e| {
        AssistantError::CorpusFormat(format!("cannot parse {}: {}", path.display(), e))
    })?;

    if corpus.content_sections.is_empty() {
        return Err(AssistantError::CorpusEmpty);
    }

    Ok(corpus.content_sections)
}

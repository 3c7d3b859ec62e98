//! Corpus build pipeline.
//!
//! Reads the crawled corpus, embeds every section through the provider
//! chain, and stores the vectors in the named collection. Documents that
//! are already indexed are skipped, before any embedding call, so an
//! interrupted build resumes where it stopped instead of re-spending
//! quota.

use std::io::Write;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::embedding::{self, EmbedderChain};
use crate::error::AssistantError;
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::{DocumentMetadata, DocumentSection, IndexedDocument};

pub struct BuildStats {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `askdocs build` entry point.
pub async fn run_build(config: &Config, rebuild: bool) -> Result<()> {
    let sections = load_corpus(&config.corpus.path)?;
    info!(
        sections = sections.len(),
        corpus = %config.corpus.path.display(),
        "loaded corpus"
    );

    let index =
        SqliteIndex::open_or_create(&config.index.db_path, &config.index.collection, rebuild)
            .await?;
    let chain = embedding::build_chain(&config.embedding)?;

    let stats = index_sections(&sections, &chain, &index).await?;

    println!("build complete");
    println!("  collection: {}", config.index.collection);
    println!("  sections: {}", stats.total);
    println!("  indexed: {}", stats.indexed);
    println!("  skipped: {}", stats.skipped);
    println!("  failed: {}", stats.failed);

    index.close().await;
    Ok(())
}

/// Embed and store each section in corpus order. Document ids are
/// `doc_{idx}` from the section's position, so ids stay stable across
/// runs. Embedding failures are counted, not fatal; storage failures
/// abort the build.
pub async fn index_sections(
    sections: &[DocumentSection],
    chain: &EmbedderChain,
    index: &dyn VectorIndex,
) -> Result<BuildStats, AssistantError> {
    let mut stats = BuildStats {
        total: sections.len(),
        indexed: 0,
        skipped: 0,
        failed: 0,
    };

    for (idx, section) in sections.iter().enumerate() {
        let doc_id = format!("doc_{idx}");

        // Progress goes to stderr so stdout stays parseable.
        let _ = writeln!(
            std::io::stderr().lock(),
            "embedding  {} / {} sections",
            idx + 1,
            stats.total
        );

        if index.contains(&doc_id).await? {
            debug!(doc_id = %doc_id, "already indexed, skipping");
            stats.skipped += 1;
            continue;
        }

        let content = compose_content(section);

        // Full content first, then the bare section text, before giving
        // up on the document. Sections with no text get no fallback; an
        // empty-string embedding would index the document on nothing.
        let embedding = match chain.embed(&content).await {
            Ok(v) => v,
            Err(err) if section.text.is_empty() => {
                warn!(doc_id = %doc_id, error = %err, "embedding failed, skipping document");
                stats.failed += 1;
                continue;
            }
            Err(_) => match chain.embed(&section.text).await {
                Ok(v) => {
                    debug!(doc_id = %doc_id, "embedded with text-only fallback");
                    v
                }
                Err(err) => {
                    warn!(doc_id = %doc_id, error = %err, "embedding failed, skipping document");
                    stats.failed += 1;
                    continue;
                }
            },
        };

        let doc = IndexedDocument {
            doc_id: doc_id.clone(),
            content,
            embedding,
            metadata: DocumentMetadata {
                section_id: section.id.clone(),
                title: section.title.clone(),
                source: section.source.clone(),
                code_blocks_json: serde_json::to_string(&section.code_blocks)
                    .unwrap_or_else(|_| "[]".to_string()),
                tables_json: serde_json::to_string(&section.tables)
                    .unwrap_or_else(|_| "[]".to_string()),
            },
        };

        if index.insert(&doc).await? {
            debug!(doc_id = %doc_id, title = %section.title, "indexed");
            stats.indexed += 1;
        } else {
            stats.skipped += 1;
        }
    }

    Ok(stats)
}

/// Embedding input for a section: title, text, joined code blocks, and
/// the tables as JSON, newline separated.
fn compose_content(section: &DocumentSection) -> String {
    let code = section.code_blocks.join("\n");
    let tables = serde_json::to_string(&section.tables).unwrap_or_else(|_| "[]".to_string());
    format!("{}\n{}\n{}\n{}", section.title, section.text, code, tables)
}

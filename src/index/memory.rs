//! In-memory [`VectorIndex`] implementation for testing.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity, matching the SQLite backend's semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::AssistantError;
use crate::index::VectorIndex;
use crate::models::{IndexedDocument, RetrievedDocument};

#[derive(Default)]
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, IndexedDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn contains(&self, doc_id: &str) -> Result<bool, AssistantError> {
        Ok(self.docs.read().unwrap().contains_key(doc_id))
    }

    async fn insert(&self, doc: &IndexedDocument) -> Result<bool, AssistantError> {
        let mut docs = self.docs.write().unwrap();
        if docs.contains_key(&doc.doc_id) {
            return Ok(false);
        }
        docs.insert(doc.doc_id.clone(), doc.clone());
        Ok(true)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AssistantError> {
        let docs = self.docs.read().unwrap();
        let mut scored: Vec<RetrievedDocument> = docs
            .values()
            .map(|doc| RetrievedDocument {
                doc_id: doc.doc_id.clone(),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                score: cosine_similarity(vector, &doc.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self) -> Result<u64, AssistantError> {
        Ok(self.docs.read().unwrap().len() as u64)
    }
}

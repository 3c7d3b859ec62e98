//! Vector index storage.
//!
//! [`VectorIndex`] is the seam between the pipeline and persistence:
//! SQLite-backed for the CLI and server, in-memory for tests. Nearest
//! neighbour search is brute-force cosine similarity over all stored
//! vectors.

mod memory;
mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use async_trait::async_trait;

use crate::error::AssistantError;
use crate::models::{IndexedDocument, RetrievedDocument};

/// Storage backend for embedded documents.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// True when a document with this id is already stored.
    async fn contains(&self, doc_id: &str) -> Result<bool, AssistantError>;

    /// Store a document unless its id is already present. Returns `true`
    /// when the document was written, `false` when it was skipped.
    async fn insert(&self, doc: &IndexedDocument) -> Result<bool, AssistantError>;

    /// The `k` documents nearest to `vector` by cosine similarity, best
    /// first. Documents embedded at a different dimensionality score 0
    /// and sink to the bottom rather than failing the search.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AssistantError>;

    /// Number of stored documents.
    async fn count(&self) -> Result<u64, AssistantError>;
}

//! SQLite-backed [`VectorIndex`].
//!
//! One database file holds any number of named collections. Embeddings
//! are stored as little-endian f32 BLOBs; similarity is computed in Rust
//! after fetching the collection's rows.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::AssistantError;
use crate::index::VectorIndex;
use crate::models::{DocumentMetadata, IndexedDocument, RetrievedDocument};

#[derive(Debug)]
pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    /// Open the index for building. Creates the database file and
    /// registers the collection when absent. With `rebuild` set, existing
    /// documents in the collection are dropped first.
    pub async fn open_or_create(
        db_path: &Path,
        collection: &str,
        rebuild: bool,
    ) -> Result<Self, AssistantError> {
        let pool = connect(db_path, true).await?;
        ensure_schema(&pool).await?;

        if rebuild {
            sqlx::query("DELETE FROM documents WHERE collection = ?")
                .bind(collection)
                .execute(&pool)
                .await
                .map_err(AssistantError::storage)?;
            info!(collection, "dropped existing documents for rebuild");
        }

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(Utc::now().timestamp())
            .execute(&pool)
            .await
            .map_err(AssistantError::storage)?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    /// Open the index for querying. Fails with
    /// [`AssistantError::CollectionMissing`] when the database file or
    /// the collection has never been built.
    pub async fn open_existing(db_path: &Path, collection: &str) -> Result<Self, AssistantError> {
        if !db_path.exists() {
            return Err(AssistantError::CollectionMissing(collection.to_string()));
        }

        let pool = connect(db_path, false).await?;
        ensure_schema(&pool).await?;

        let registered: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&pool)
                .await
                .map_err(AssistantError::storage)?;

        if !registered {
            return Err(AssistantError::CollectionMissing(collection.to_string()));
        }

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool, AssistantError> {
    if create {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(AssistantError::storage)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(AssistantError::storage)?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(AssistantError::storage)?;

    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), AssistantError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(AssistantError::storage)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            section_id TEXT NOT NULL,
            title TEXT NOT NULL,
            source TEXT NOT NULL,
            code_blocks_json TEXT NOT NULL DEFAULT '[]',
            tables_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, doc_id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(AssistantError::storage)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
        .execute(pool)
        .await
        .map_err(AssistantError::storage)?;

    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn contains(&self, doc_id: &str) -> Result<bool, AssistantError> {
        let found: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE collection = ? AND doc_id = ?",
        )
        .bind(&self.collection)
        .bind(doc_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AssistantError::storage)?;
        Ok(found)
    }

    async fn insert(&self, doc: &IndexedDocument) -> Result<bool, AssistantError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO documents
                (collection, doc_id, content, embedding, section_id, title, source,
                 code_blocks_json, tables_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.collection)
        .bind(&doc.doc_id)
        .bind(&doc.content)
        .bind(vec_to_blob(&doc.embedding))
        .bind(&doc.metadata.section_id)
        .bind(&doc.metadata.title)
        .bind(&doc.metadata.source)
        .bind(&doc.metadata.code_blocks_json)
        .bind(&doc.metadata.tables_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(AssistantError::storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AssistantError> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, content, embedding, section_id, title, source,
                   code_blocks_json, tables_json
            FROM documents
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(AssistantError::storage)?;

        let mut scored: Vec<RetrievedDocument> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                RetrievedDocument {
                    doc_id: row.get("doc_id"),
                    content: row.get("content"),
                    metadata: DocumentMetadata {
                        section_id: row.get("section_id"),
                        title: row.get("title"),
                        source: row.get("source"),
                        code_blocks_json: row.get("code_blocks_json"),
                        tables_json: row.get("tables_json"),
                    },
                    score: cosine_similarity(vector, &stored),
                }
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
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(AssistantError::storage)?;
        Ok(count as u64)
    }
}

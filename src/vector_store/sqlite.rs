//! SQLite-backed vector index.
//!
//! Collections live in `<path>/vectors.sqlite`, separate from the chunk
//! staging database. Search is brute-force cosine similarity over every
//! vector of the collection.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;

use super::{
    build_records, check_query_dimension, top_k, Metric, QueryMatch, VectorStore,
    VectorStoreHandle,
};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::error::VectorStoreError;

const DB_FILE: &str = "vectors.sqlite";

struct OpenCollection {
    pool: SqlitePool,
    handle: VectorStoreHandle,
}

pub struct SqliteVectorStore {
    provider: Arc<dyn EmbeddingProvider>,
    open: Option<OpenCollection>,
}

impl SqliteVectorStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            open: None,
        }
    }

    fn collection(&self) -> Result<&OpenCollection, VectorStoreError> {
        self.open.as_ref().ok_or(VectorStoreError::NotOpen)
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dimension INTEGER NOT NULL,
            metric TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_collection ON vectors(collection)")
        .execute(pool)
        .await?;
    Ok(())
}

/// Registers `name` unless it exists, then returns its recorded dimension.
async fn ensure_collection(
    pool: &SqlitePool,
    name: &str,
    dimension: usize,
) -> Result<usize, sqlx::Error> {
    // INSERT OR IGNORE keeps a concurrent creator's row.
    sqlx::query("INSERT OR IGNORE INTO collections (name, dimension, metric) VALUES (?, ?, ?)")
        .bind(name)
        .bind(dimension as i64)
        .bind(Metric::Cosine.as_str())
        .execute(pool)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(existing as usize)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn open(
        &mut self,
        path: &Path,
        collection: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        self.close().await?;

        let pool = db::connect_path(&path.join(DB_FILE)).await?;
        create_schema(&pool).await?;
        let existing = ensure_collection(&pool, collection, dimension).await?;
        if existing != dimension {
            pool.close().await;
            return Err(VectorStoreError::DimensionMismatch {
                collection: collection.to_string(),
                existing,
                requested: dimension,
            });
        }

        tracing::debug!(path = %path.display(), collection, dimension, "opened sqlite collection");
        self.open = Some(OpenCollection {
            pool,
            handle: VectorStoreHandle {
                path: path.to_path_buf(),
                collection: collection.to_string(),
                dimension,
                metric: Metric::Cosine,
            },
        });
        Ok(())
    }

    async fn insert(
        &mut self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        sources: &[Option<String>],
        pages: &[Option<u32>],
    ) -> Result<usize, VectorStoreError> {
        let open = self.collection()?;
        let records = build_records(open.handle.dimension, texts, embeddings, sources, pages)?;

        let mut tx = open.pool.begin().await?;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO vectors (id, collection, text, source, page, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&open.handle.collection)
            .bind(&record.text)
            .bind(&record.source)
            .bind(record.page as i64)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let open = self.collection()?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE collection = ?")
            .bind(&open.handle.collection)
            .fetch_one(&open.pool)
            .await?;
        Ok(n as usize)
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let open = self.collection()?;
        check_query_dimension(&open.handle, embedding)?;

        let rows = sqlx::query(
            "SELECT text, source, page, embedding FROM vectors WHERE collection = ?",
        )
        .bind(&open.handle.collection)
        .fetch_all(&open.pool)
        .await?;

        let matches = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: i64 = row.get("page");
                QueryMatch {
                    text: row.get("text"),
                    similarity: cosine_similarity(embedding, &blob_to_vec(&blob)),
                    source: row.get("source"),
                    page: page as u32,
                }
            })
            .collect();
        Ok(top_k(matches, k))
    }

    async fn close(&mut self) -> Result<(), VectorStoreError> {
        if let Some(open) = self.open.take() {
            open.pool.close().await;
        }
        Ok(())
    }

    fn handle(&self) -> Option<&VectorStoreHandle> {
        self.open.as_ref().map(|o| &o.handle)
    }

    fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }
}

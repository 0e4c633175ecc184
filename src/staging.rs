//! The chunk staging table.
//!
//! One row per chunk, created by the split stage with no embedding and
//! `stored_in_vdb = 0`. The embed stage fills `embeddings` once; the
//! vectorize stage flips `stored_in_vdb` once. Rows are never updated
//! otherwise and only deleted by [`ChunkStore::clear`].

use std::collections::HashSet;

use sqlx::types::Json;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::migrate;
use crate::models::{DocumentChunk, EmbeddedChunk, PendingChunk};

/// Aggregate row counts over the chunk table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    pub documents: i64,
    pub total: i64,
    pub with_embeddings: i64,
    pub vectorized: i64,
}

impl ChunkCounts {
    pub fn without_embeddings(&self) -> i64 {
        self.total - self.with_embeddings
    }

    pub fn to_vectorize(&self) -> i64 {
        self.with_embeddings - self.vectorized
    }
}

#[derive(Clone)]
pub struct ChunkStore {
    pool: SqlitePool,
}

impl ChunkStore {
    /// Connects to `[db] path` and makes sure the table exists.
    pub async fn open(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Every distinct `fullpath` that has at least one chunk row.
    pub async fn chunked_paths(&self) -> Result<HashSet<String>, sqlx::Error> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT DISTINCT fullpath FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths.into_iter().collect())
    }

    /// Stages the chunks of one document in a single transaction.
    pub async fn insert_document_chunks(
        &self,
        fullpath: &str,
        chunks: &[DocumentChunk],
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (fullpath, chunk_index, chunk, metadata)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(fullpath)
            .bind(chunk.metadata.chunk_index as i64)
            .bind(&chunk.text)
            .bind(Json(&chunk.metadata))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(chunks.len())
    }

    /// Up to `limit` rows without an embedding, with `chunk_id > after`,
    /// in `chunk_id` order.
    pub async fn pending_embeddings(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Vec<PendingChunk>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, chunk
            FROM chunks
            WHERE embeddings IS NULL AND chunk_id > ?
            ORDER BY chunk_id
            LIMIT ?
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PendingChunk {
                chunk_id: row.get("chunk_id"),
                text: row.get("chunk"),
            })
            .collect())
    }

    /// Stores the embedding of one chunk. Returns `false` when the row
    /// already had one, which is then left untouched.
    pub async fn set_embedding(
        &self,
        chunk_id: i64,
        embedding: &[f32],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE chunks SET embeddings = ? WHERE chunk_id = ? AND embeddings IS NULL",
        )
        .bind(vec_to_blob(embedding))
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Up to `limit` embedded rows not yet in the vector index, with
    /// `chunk_id > after`, in `chunk_id` order.
    pub async fn pending_vectors(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Vec<EmbeddedChunk>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, chunk, embeddings,
                   json_extract(metadata, '$.source') AS source,
                   json_extract(metadata, '$.page') AS page
            FROM chunks
            WHERE embeddings IS NOT NULL AND stored_in_vdb = 0 AND chunk_id > ?
            ORDER BY chunk_id
            LIMIT ?
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embeddings");
                let page: Option<i64> = row.get("page");
                EmbeddedChunk {
                    chunk_id: row.get("chunk_id"),
                    text: row.get("chunk"),
                    embedding: blob_to_vec(&blob),
                    source: row.get("source"),
                    page: page.and_then(|p| u32::try_from(p).ok()),
                }
            })
            .collect())
    }

    /// Flags exactly `chunk_ids` as stored in the vector index, in one
    /// statement. The ids are bound as one JSON array, so any batch size fits
    /// under SQLite's bind-variable limit.
    pub async fn mark_vectorized(&self, chunk_ids: &[i64]) -> Result<u64, sqlx::Error> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            UPDATE chunks SET stored_in_vdb = 1
            WHERE chunk_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(Json(chunk_ids))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes every chunk row.
    pub async fn clear(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn counts(&self) -> Result<ChunkCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT fullpath) AS documents,
                   COUNT(*) AS total,
                   COUNT(embeddings) AS with_embeddings,
                   COALESCE(SUM(stored_in_vdb), 0) AS vectorized
            FROM chunks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ChunkCounts {
            documents: row.get("documents"),
            total: row.get("total"),
            with_embeddings: row.get("with_embeddings"),
            vectorized: row.get("vectorized"),
        })
    }
}

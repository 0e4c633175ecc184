//! Vector index abstraction.
//!
//! The [`VectorStore`] trait is the one contract the pipeline and the query
//! path use; backends are interchangeable and chosen by
//! `[vector_store] backend`:
//!
//! | Backend | Type | Metric |
//! |---------|------|--------|
//! | `"sqlite"` | [`SqliteVectorStore`] | cosine |
//! | `"flat"` | [`FlatVectorStore`] | euclidean |
//!
//! Whatever the native metric, [`QueryMatch::similarity`] is normalized so
//! that larger always means more similar, and results come back closest
//! first. Inserts are append-only and never deduplicated: the vectorize
//! stage may replay a batch after a crash.

mod flat;
mod sqlite;

pub use flat::FlatVectorStore;
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::VectorStoreConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::VectorStoreError;

/// Stored in place of a missing source.
pub const UNKNOWN_SOURCE: &str = "n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one open collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreHandle {
    pub path: PathBuf,
    pub collection: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub text: String,
    /// Larger is more similar, for every backend.
    pub similarity: f32,
    pub source: String,
    pub page: u32,
}

/// A record as a backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub source: String,
    pub page: u32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Opens `collection` under `path`, creating it when absent. Opening an
    /// existing collection with a different dimension fails.
    async fn open(
        &mut self,
        path: &Path,
        collection: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError>;

    /// Appends one record per position of the four equal-length columns.
    /// Returns the number of records written.
    async fn insert(
        &mut self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        sources: &[Option<String>],
        pages: &[Option<u32>],
    ) -> Result<usize, VectorStoreError>;

    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// The `k` records nearest to `embedding`, closest first.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError>;

    /// Embeds `text` with the store's provider, then runs [`search`](Self::search).
    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryMatch>, VectorStoreError> {
        if self.handle().is_none() {
            return Err(VectorStoreError::NotOpen);
        }
        let embedding = self.provider().embed(text).await?;
        self.search(&embedding, k).await
    }

    /// Releases the collection. Safe on a closed or never-opened store.
    async fn close(&mut self) -> Result<(), VectorStoreError>;

    /// The open collection, if any.
    fn handle(&self) -> Option<&VectorStoreHandle>;

    fn provider(&self) -> &Arc<dyn EmbeddingProvider>;
}

/// Builds an unopened store for `backend`.
pub fn create_vector_store(
    backend: &str,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match backend {
        "sqlite" => Ok(Box::new(SqliteVectorStore::new(provider))),
        "flat" => Ok(Box::new(FlatVectorStore::new(provider))),
        other => Err(VectorStoreError::UnknownBackend(other.to_string())),
    }
}

/// Builds the configured store and opens its collection.
pub async fn open_vector_store(
    config: &VectorStoreConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    let mut store = create_vector_store(&config.backend, provider)?;
    store
        .open(&config.path, &config.collection, config.dimension)
        .await?;
    Ok(store)
}

/// Validates insert columns against the collection and fills in defaults.
pub(crate) fn build_records(
    dimension: usize,
    texts: &[String],
    embeddings: &[Vec<f32>],
    sources: &[Option<String>],
    pages: &[Option<u32>],
) -> Result<Vec<VectorRecord>, VectorStoreError> {
    let n = texts.len();
    if embeddings.len() != n || sources.len() != n || pages.len() != n {
        return Err(VectorStoreError::LengthMismatch(format!(
            "{} texts, {} embeddings, {} sources, {} pages",
            n,
            embeddings.len(),
            sources.len(),
            pages.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(VectorStoreError::VectorDimension {
            expected: dimension,
            actual: bad.len(),
        });
    }

    Ok(texts
        .iter()
        .zip(embeddings)
        .zip(sources.iter().zip(pages))
        .map(|((text, embedding), (source, page))| VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            embedding: embedding.clone(),
            text: text.clone(),
            source: source.clone().unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            page: page.unwrap_or(0),
        })
        .collect())
}

pub(crate) fn check_query_dimension(
    handle: &VectorStoreHandle,
    embedding: &[f32],
) -> Result<(), VectorStoreError> {
    if embedding.len() != handle.dimension {
        return Err(VectorStoreError::VectorDimension {
            expected: handle.dimension,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Sorts by descending similarity and keeps the first `k`.
pub(crate) fn top_k(mut matches: Vec<QueryMatch>, k: usize) -> Vec<QueryMatch> {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(k);
    matches
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ProviderError;
    use tempfile::TempDir;

    /// Maps a text to the axis named by its first character.
    pub(crate) struct AxisProvider {
        pub dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(axis(self.dims, text))
        }
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            self.dims
        }
    }

    pub(crate) fn axis(dims: usize, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        let i = text.bytes().next().map(|b| b as usize % dims).unwrap_or(0);
        v[i] = 1.0;
        v
    }

    fn provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(AxisProvider { dims: 4 })
    }

    type Columns = (
        Vec<String>,
        Vec<Vec<f32>>,
        Vec<Option<String>>,
        Vec<Option<u32>>,
    );

    fn columns(texts: &[&str]) -> Columns {
        (
            texts.iter().map(|t| t.to_string()).collect(),
            texts.iter().map(|t| axis(4, t)).collect(),
            texts.iter().map(|_| None).collect(),
            texts.iter().map(|_| None).collect(),
        )
    }

    #[test]
    fn test_build_records_defaults() {
        let records = build_records(
            2,
            &["a".to_string()],
            &[vec![1.0, 0.0]],
            &[None],
            &[None],
        )
        .unwrap();
        assert_eq!(records[0].source, "n/a");
        assert_eq!(records[0].page, 0);
    }

    #[test]
    fn test_build_records_rejects_ragged_columns() {
        let err = build_records(2, &["a".to_string()], &[], &[None], &[None]).unwrap_err();
        assert!(matches!(err, VectorStoreError::LengthMismatch(_)));
        let err =
            build_records(2, &["a".to_string()], &[vec![1.0]], &[None], &[None]).unwrap_err();
        assert!(matches!(err, VectorStoreError::VectorDimension { .. }));
    }

    #[test]
    fn test_unknown_backend() {
        let err = create_vector_store("pinecone", provider()).err().unwrap();
        assert!(matches!(err, VectorStoreError::UnknownBackend(_)));
    }

    /// The same contract, checked against every backend.
    #[tokio::test]
    async fn test_backend_contract() {
        for backend in ["sqlite", "flat"] {
            let tmp = TempDir::new().unwrap();
            let mut store = create_vector_store(backend, provider()).unwrap();

            assert!(matches!(store.count().await, Err(VectorStoreError::NotOpen)));
            store.close().await.unwrap();

            store.open(tmp.path(), "chunks", 4).await.unwrap();
            store.open(tmp.path(), "chunks", 4).await.unwrap();
            assert_eq!(store.count().await.unwrap(), 0);

            let (texts, embeddings, sources, pages) = columns(&["apple", "banana", "cherry"]);
            assert_eq!(
                store.insert(&texts, &embeddings, &sources, &pages).await.unwrap(),
                3
            );
            // Replaying a batch appends again.
            store.insert(&texts, &embeddings, &sources, &pages).await.unwrap();
            assert_eq!(store.count().await.unwrap(), 6, "backend {backend}");

            let hits = store.query("bread", 2).await.unwrap();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].text, "banana");
            assert!(hits[0].similarity >= hits[1].similarity);
            assert_eq!(hits[0].source, "n/a");
            assert_eq!(hits[0].page, 0);

            let far = store.query("cucumber", 6).await.unwrap();
            assert_eq!(far[0].text, "cherry");
            assert!(far[0].similarity > far[5].similarity, "backend {backend}");

            store.close().await.unwrap();
            store.close().await.unwrap();
            assert!(store.handle().is_none());

            store.open(tmp.path(), "chunks", 4).await.unwrap();
            assert_eq!(store.count().await.unwrap(), 6, "backend {backend} reopen");
            assert_eq!(store.handle().unwrap().dimension, 4);

            let err = store.open(tmp.path(), "chunks", 8).await.unwrap_err();
            assert!(
                matches!(err, VectorStoreError::DimensionMismatch { .. }),
                "backend {backend}"
            );
        }
    }
}

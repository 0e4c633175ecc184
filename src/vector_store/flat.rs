//! Flat-file vector index.
//!
//! Records are kept in memory and written to `<path>/<collection>.json`
//! after every insert. Search is brute-force euclidean distance, reported as
//! similarity `1 / (1 + distance)`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    build_records, check_query_dimension, top_k, Metric, QueryMatch, VectorRecord, VectorStore,
    VectorStoreHandle,
};
use crate::embedding::EmbeddingProvider;
use crate::error::VectorStoreError;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    collection: String,
    dimension: usize,
    metric: Metric,
    records: Vec<VectorRecord>,
}

struct OpenCollection {
    file: PathBuf,
    handle: VectorStoreHandle,
    records: Vec<VectorRecord>,
}

pub struct FlatVectorStore {
    provider: Arc<dyn EmbeddingProvider>,
    open: Option<OpenCollection>,
}

impl FlatVectorStore {
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

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Writes the snapshot to a sibling temp file, then renames it into place.
async fn write_snapshot(file: &Path, snapshot: &Snapshot) -> Result<(), VectorStoreError> {
    let tmp = file.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec(snapshot)?).await?;
    tokio::fs::rename(&tmp, file).await?;
    Ok(())
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn open(
        &mut self,
        path: &Path,
        collection: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        self.close().await?;

        tokio::fs::create_dir_all(path).await?;
        let file = path.join(format!("{collection}.json"));
        let records = if tokio::fs::try_exists(&file).await? {
            let snapshot: Snapshot = serde_json::from_slice(&tokio::fs::read(&file).await?)?;
            if snapshot.dimension != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    existing: snapshot.dimension,
                    requested: dimension,
                });
            }
            snapshot.records
        } else {
            let snapshot = Snapshot {
                collection: collection.to_string(),
                dimension,
                metric: Metric::Euclidean,
                records: Vec::new(),
            };
            write_snapshot(&file, &snapshot).await?;
            snapshot.records
        };

        tracing::debug!(file = %file.display(), records = records.len(), "opened flat collection");
        self.open = Some(OpenCollection {
            file,
            handle: VectorStoreHandle {
                path: path.to_path_buf(),
                collection: collection.to_string(),
                dimension,
                metric: Metric::Euclidean,
            },
            records,
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
        let open = self.open.as_mut().ok_or(VectorStoreError::NotOpen)?;
        let new_records = build_records(open.handle.dimension, texts, embeddings, sources, pages)?;
        let added = new_records.len();

        let mut records = open.records.clone();
        records.extend(new_records);
        let snapshot = Snapshot {
            collection: open.handle.collection.clone(),
            dimension: open.handle.dimension,
            metric: open.handle.metric,
            records,
        };
        // Memory only changes once the snapshot is on disk.
        write_snapshot(&open.file, &snapshot).await?;
        open.records = snapshot.records;
        Ok(added)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.collection()?.records.len())
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let open = self.collection()?;
        check_query_dimension(&open.handle, embedding)?;

        let matches = open
            .records
            .iter()
            .map(|r| QueryMatch {
                text: r.text.clone(),
                similarity: 1.0 / (1.0 + euclidean_distance(embedding, &r.embedding)),
                source: r.source.clone(),
                page: r.page,
            })
            .collect();
        Ok(top_k(matches, k))
    }

    async fn close(&mut self) -> Result<(), VectorStoreError> {
        self.open = None;
        Ok(())
    }

    fn handle(&self) -> Option<&VectorStoreHandle> {
        self.open.as_ref().map(|o| &o.handle)
    }

    fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::tests::AxisProvider;
    use tempfile::TempDir;

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider { dims: 2 });

        let mut store = FlatVectorStore::new(provider.clone());
        store.open(tmp.path(), "notes", 2).await.unwrap();
        store
            .insert(
                &["near".to_string(), "far".to_string()],
                &[vec![1.0, 0.0], vec![-3.0, 0.0]],
                &[Some("/d/n.md".to_string()), None],
                &[None, Some(3)],
            )
            .await
            .unwrap();
        store.close().await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("notes.json")).unwrap();
        assert!(raw.contains("\"metric\":\"euclidean\""));

        let mut reopened = FlatVectorStore::new(provider);
        reopened.open(tmp.path(), "notes", 2).await.unwrap();
        let hits = reopened.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "near");
        assert_eq!(hits[0].similarity, 1.0);
        assert_eq!(hits[1].text, "far");
        assert_eq!(hits[1].similarity, 0.2);
        assert_eq!(hits[1].source, "n/a");
        assert_eq!(hits[1].page, 3);
    }
}

//! Stage C: copy embedded chunks into the vector index.
//!
//! Embedded rows not yet flagged `stored_in_vdb` are collected into batches.
//! Each full batch is inserted into the vector store and only then are its
//! chunk ids flagged, in one update. A crash between the two leaves the rows
//! unflagged, so the next run inserts them again; the vector store accepts
//! duplicates.

use std::fmt;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::staging::ChunkStore;
use crate::vector_store::VectorStore;

/// Rows fetched per chunk-table query.
const PAGE_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorizeOptions {
    /// Stop after this many rows.
    pub limit: Option<usize>,
    /// Overrides `[vector_store] batch_size`.
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeReport {
    pub inserted: usize,
    pub batches: usize,
    /// Records in the collection after this run.
    pub collection_count: usize,
}

impl fmt::Display for VectorizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vectorize")?;
        writeln!(f, "  inserted: {}", self.inserted)?;
        writeln!(f, "  batches: {}", self.batches)?;
        write!(f, "  collection count: {}", self.collection_count)
    }
}

/// The in-flight batch: insert columns plus the chunk ids they came from.
#[derive(Default)]
struct Batch {
    chunk_ids: Vec<i64>,
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    sources: Vec<Option<String>>,
    pages: Vec<Option<u32>>,
}

impl Batch {
    fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    /// Inserts the batch, then flags its rows. Returns the rows written.
    async fn flush(
        &mut self,
        vectors: &mut dyn VectorStore,
        store: &ChunkStore,
    ) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let written = vectors
            .insert(&self.texts, &self.embeddings, &self.sources, &self.pages)
            .await?;
        store.mark_vectorized(&self.chunk_ids).await?;
        tracing::debug!(rows = written, "flushed vector batch");
        *self = Batch::default();
        Ok(written)
    }
}

/// Runs stage C against the configured vector store.
pub async fn run_vectorize(
    pipeline: &Pipeline,
    options: VectorizeOptions,
) -> Result<VectorizeReport> {
    let batch_size = options
        .batch_size
        .unwrap_or(pipeline.config().vector_store.batch_size);
    if batch_size == 0 {
        return Err(Error::Config("batch size must be > 0".to_string()));
    }

    let mut vectors = pipeline.open_vector_store().await?;
    let result = match sync(pipeline.store(), vectors.as_mut(), batch_size, options.limit).await {
        Ok(mut report) => vectors.count().await.map_err(Error::from).map(|count| {
            report.collection_count = count;
            report
        }),
        Err(e) => Err(e),
    };
    vectors.close().await?;
    let report = result?;

    tracing::info!(
        inserted = report.inserted,
        batches = report.batches,
        collection_count = report.collection_count,
        "vectorize stage finished"
    );
    Ok(report)
}

async fn sync(
    store: &ChunkStore,
    vectors: &mut dyn VectorStore,
    batch_size: usize,
    limit: Option<usize>,
) -> Result<VectorizeReport> {
    let mut report = VectorizeReport::default();
    let mut batch = Batch::default();
    let mut taken = 0usize;
    let mut after = 0i64;

    loop {
        let budget = limit.map_or(PAGE_SIZE, |max| PAGE_SIZE.min(max.saturating_sub(taken)));
        if budget == 0 {
            break;
        }
        let page = store.pending_vectors(after, budget as i64).await?;
        if page.is_empty() {
            break;
        }

        for row in page {
            after = row.chunk_id;
            taken += 1;
            batch.chunk_ids.push(row.chunk_id);
            batch.texts.push(row.text);
            batch.embeddings.push(row.embedding);
            batch.sources.push(row.source);
            batch.pages.push(row.page);

            if batch.len() >= batch_size {
                report.inserted += batch.flush(vectors, store).await?;
                report.batches += 1;
            }
        }
    }

    if !batch.is_empty() {
        report.inserted += batch.flush(vectors, store).await?;
        report.batches += 1;
    }
    Ok(report)
}

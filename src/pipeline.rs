//! The ingestion context.
//!
//! A [`Pipeline`] bundles everything a stage needs: the loaded [`Config`],
//! the chunk staging store and the embedding provider. Every entry point
//! takes it explicitly; there is no process-wide state.
//!
//! Stages run in order A → B → C ([`ingest`](crate::ingest),
//! [`embed_cmd`](crate::embed_cmd), [`vectorize`](crate::vectorize)) and each
//! one may be re-run on its own at any time.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::discover;
use crate::embed_cmd::{self, EmbedReport};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::ingest::{self, SplitReport};
use crate::staging::ChunkStore;
use crate::vector_store::{self, QueryMatch, VectorStore};
use crate::vectorize::{self, VectorizeOptions, VectorizeReport};

/// Reports of a full A → B → C run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub split: SplitReport,
    pub embed: EmbedReport,
    pub vectorize: VectorizeReport,
}

pub struct Pipeline {
    config: Config,
    store: ChunkStore,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Pipeline {
    /// Opens the chunk store and builds the configured embedding provider.
    pub async fn open(config: Config) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        Self::with_provider(config, provider).await
    }

    /// Opens the chunk store with a caller-supplied embedding provider.
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = ChunkStore::open(&config).await?;
        Ok(Self {
            config,
            store,
            provider,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Builds the configured vector store and opens its collection.
    pub async fn open_vector_store(&self) -> Result<Box<dyn VectorStore>> {
        let store =
            vector_store::open_vector_store(&self.config.vector_store, self.provider.clone())
                .await?;
        Ok(store)
    }

    /// Documents under the root that have no chunk rows yet.
    pub async fn discover(&self) -> Result<Vec<PathBuf>> {
        let all = discover::scan_documents(&self.config.documents)?;
        let already = self.store.chunked_paths().await?;
        Ok(discover::pending_documents(all, &already))
    }

    /// Stage A.
    pub async fn split(&self, max_chunks: Option<usize>) -> Result<SplitReport> {
        ingest::run_split(self, max_chunks).await
    }

    /// Stage B.
    pub async fn embed(&self, limit: Option<usize>) -> Result<EmbedReport> {
        embed_cmd::run_embed(self, limit).await
    }

    /// Stage C.
    pub async fn vectorize(&self, options: VectorizeOptions) -> Result<VectorizeReport> {
        vectorize::run_vectorize(self, options).await
    }

    /// Runs stages A, B and C in order, stopping at the first error.
    pub async fn run_all(&self) -> Result<RunReport> {
        let split = self.split(None).await?;
        let embed = self.embed(None).await?;
        let vectorize = self.vectorize(VectorizeOptions::default()).await?;
        Ok(RunReport {
            split,
            embed,
            vectorize,
        })
    }

    /// Deletes every chunk row. Returns the number of rows removed.
    pub async fn clear(&self) -> Result<u64> {
        let removed = self.store.clear().await?;
        tracing::info!(removed, "cleared chunk table");
        Ok(removed)
    }

    /// Embeds `text` and returns the `k` nearest chunks from the vector index.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryMatch>> {
        let mut store = self.open_vector_store().await?;
        let matches = store.query(text, k).await;
        store.close().await?;
        Ok(matches?)
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

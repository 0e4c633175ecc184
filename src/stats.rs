//! Collection metrics.
//!
//! A read-only overview of where the collection stands: documents on disk
//! versus documents staged, and how many chunks have reached each stage.
//! Used by `ragit stats` to check that the stages are keeping up.

use std::fmt;

use crate::discover;
use crate::error::Result;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMetrics {
    pub name: String,
    pub documents_dir: String,
    /// Matching documents under the root.
    pub total_documents: usize,
    /// Documents with at least one chunk row.
    pub total_documents_in_db: i64,
    pub total_chunks: i64,
    pub with_embeddings: i64,
    pub without_embeddings: i64,
    pub inserted_to_vectordb: i64,
    pub to_insert_to_vectordb: i64,
}

/// Gathers the metrics with aggregate queries and a filesystem walk.
pub async fn collection_metrics(pipeline: &Pipeline) -> Result<CollectionMetrics> {
    let config = pipeline.config();
    let total_documents = discover::scan_documents(&config.documents)?.len();
    let counts = pipeline.store().counts().await?;

    Ok(CollectionMetrics {
        name: config.collection_name(),
        documents_dir: config.documents.root.display().to_string(),
        total_documents,
        total_documents_in_db: counts.documents,
        total_chunks: counts.total,
        with_embeddings: counts.with_embeddings,
        without_embeddings: counts.without_embeddings(),
        inserted_to_vectordb: counts.vectorized,
        to_insert_to_vectordb: counts.to_vectorize(),
    })
}

impl fmt::Display for CollectionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stats {}", self.name)?;
        writeln!(f, "  documents dir: {}", self.documents_dir)?;
        writeln!(f, "  documents: {}", self.total_documents)?;
        writeln!(f, "  documents in db: {}", self.total_documents_in_db)?;
        writeln!(f, "  chunks: {}", self.total_chunks)?;
        writeln!(
            f,
            "  with embeddings: {} / {} ({}%)",
            self.with_embeddings,
            self.total_chunks,
            percent(self.with_embeddings, self.total_chunks)
        )?;
        writeln!(f, "  without embeddings: {}", self.without_embeddings)?;
        writeln!(f, "  inserted to vectordb: {}", self.inserted_to_vectordb)?;
        write!(f, "  to insert to vectordb: {}", self.to_insert_to_vectordb)
    }
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        (part * 100) / total
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(4, 4), 100);
    }

    #[test]
    fn test_display_lines() {
        let metrics = CollectionMetrics {
            name: "dementia".to_string(),
            documents_dir: "/data/dementia/documents".to_string(),
            total_documents: 3,
            total_documents_in_db: 2,
            total_chunks: 10,
            with_embeddings: 5,
            without_embeddings: 5,
            inserted_to_vectordb: 4,
            to_insert_to_vectordb: 1,
        };
        let out = metrics.to_string();
        assert!(out.starts_with("stats dementia\n"));
        assert!(out.contains("  with embeddings: 5 / 10 (50%)"));
        assert!(out.ends_with("  to insert to vectordb: 1"));
    }
}

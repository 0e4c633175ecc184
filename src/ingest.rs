//! Stage A: discover and split.
//!
//! Walks the documents root, keeps only documents with no chunk rows yet,
//! then sanitizes, splits and stages each one. A document that fails to
//! sanitize or split is logged and skipped; the stage carries on with the
//! next one. Chunk-table errors still abort the stage.

use std::fmt;

use crate::chunk;
use crate::discover;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::sanitize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Documents found under the root.
    pub discovered: usize,
    /// Documents with no chunk rows before this run.
    pub pending: usize,
    pub documents_split: usize,
    pub chunks_inserted: usize,
    pub failed: usize,
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "split")?;
        writeln!(f, "  discovered: {}", self.discovered)?;
        writeln!(f, "  pending: {}", self.pending)?;
        writeln!(f, "  documents split: {}", self.documents_split)?;
        writeln!(f, "  chunks inserted: {}", self.chunks_inserted)?;
        write!(f, "  failed: {}", self.failed)
    }
}

/// Runs stage A. With `max_chunks`, no new document is started once that
/// many chunks have been inserted in this run.
pub async fn run_split(pipeline: &Pipeline, max_chunks: Option<usize>) -> Result<SplitReport> {
    let config = pipeline.config();
    let store = pipeline.store();

    let all = discover::scan_documents(&config.documents)?;
    let already = store.chunked_paths().await?;
    let discovered = all.len();
    let pending = discover::pending_documents(all, &already);

    let mut report = SplitReport {
        discovered,
        pending: pending.len(),
        ..Default::default()
    };
    tracing::info!(discovered, pending = report.pending, "discovered documents");

    for path in &pending {
        if max_chunks.is_some_and(|max| report.chunks_inserted >= max) {
            tracing::info!(inserted = report.chunks_inserted, "chunk cap reached");
            break;
        }

        let split = sanitize::sanitize(path)
            .map_err(Error::from)
            .and_then(|clean| {
                let chunks = chunk::split_document(&clean, config.chunking)?;
                Ok((clean, chunks))
            });
        let (clean, chunks) = match split {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping document");
                report.failed += 1;
                continue;
            }
        };

        let fullpath = clean.display().to_string();
        let inserted = store.insert_document_chunks(&fullpath, &chunks).await?;
        tracing::debug!(path = %fullpath, chunks = inserted, "staged document");
        report.documents_split += 1;
        report.chunks_inserted += inserted;
    }

    Ok(report)
}

//! Stage B: embed staged chunks.
//!
//! Every chunk row without an embedding is sent to the provider once and the
//! returned vector is written back. There is no per-chunk isolation: the
//! first provider error ends the stage, leaving earlier embeddings in place
//! so a re-run resumes where this one stopped.

use std::fmt;

use crate::error::Result;
use crate::pipeline::Pipeline;

/// Rows fetched per chunk-table query.
const PAGE_SIZE: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub embedded: usize,
    /// Rows that already had an embedding when written, left untouched.
    pub skipped: usize,
    /// Rows still without an embedding after this run.
    pub remaining: i64,
}

impl fmt::Display for EmbedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "embed")?;
        writeln!(f, "  embedded: {}", self.embedded)?;
        writeln!(f, "  skipped: {}", self.skipped)?;
        write!(f, "  remaining: {}", self.remaining)
    }
}

/// Runs stage B, embedding at most `limit` chunks when given.
pub async fn run_embed(pipeline: &Pipeline, limit: Option<usize>) -> Result<EmbedReport> {
    let store = pipeline.store();
    let provider = pipeline.provider();
    let mut report = EmbedReport::default();
    let mut after = 0i64;

    loop {
        let done = report.embedded + report.skipped;
        let budget = limit.map_or(PAGE_SIZE, |max| PAGE_SIZE.min(max.saturating_sub(done)));
        if budget == 0 {
            break;
        }

        let page = store.pending_embeddings(after, budget as i64).await?;
        if page.is_empty() {
            break;
        }

        for chunk in &page {
            let embedding = provider.embed(&chunk.text).await?;
            if store.set_embedding(chunk.chunk_id, &embedding).await? {
                report.embedded += 1;
            } else {
                report.skipped += 1;
            }
            after = chunk.chunk_id;
        }
        tracing::debug!(embedded = report.embedded, after, "embedded page");
    }

    report.remaining = store.counts().await?.without_embeddings();
    tracing::info!(
        embedded = report.embedded,
        remaining = report.remaining,
        model = provider.model_name(),
        "embed stage finished"
    );
    Ok(report)
}

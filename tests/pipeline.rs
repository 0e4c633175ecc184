//! Integration tests for the three ingestion stages.
//!
//! Every test runs against a fresh temp directory with a deterministic
//! in-process embedding provider, so no network is involved.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tempfile::TempDir;

use ragit::config::{self, Config, EMBEDDING_DIMENSION};
use ragit::embedding::EmbeddingProvider;
use ragit::error::{Error, ProviderError};
use ragit::pipeline::Pipeline;
use ragit::stats;
use ragit::vectorize::VectorizeOptions;

/// Spreads the bytes of a text over a 1536-wide vector.
struct HashProvider;

fn hash_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
    for (i, b) in text.bytes().enumerate() {
        v[(i * 31 + b as usize) % EMBEDDING_DIMENSION] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(hash_embedding(text))
    }
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Succeeds `ok` times, then fails every call.
struct FlakyProvider {
    ok: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok {
            return Err(ProviderError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(hash_embedding(text))
    }
    fn model_name(&self) -> &str {
        "flaky"
    }
    fn dims(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

struct Env {
    _tmp: TempDir,
    docs: PathBuf,
    config: Config,
}

fn setup(backend: &str) -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let docs = root.join("dementia").join("documents");
    fs::create_dir_all(&docs).unwrap();

    let config_path = root.join("ragit.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/chunks.sqlite"

[documents]
root = "{docs}"

[vector_store]
backend = "{backend}"
path = "{root}/vectordb"
batch_size = 2
"#,
            root = root.display(),
            docs = docs.display(),
        ),
    )
    .unwrap();

    let config = config::load_config(&config_path).unwrap();
    Env {
        _tmp: tmp,
        docs,
        config,
    }
}

async fn open(env: &Env) -> Pipeline {
    Pipeline::with_provider(env.config.clone(), Arc::new(HashProvider))
        .await
        .unwrap()
}

fn write_notes(docs: &Path, names: &[&str]) {
    for name in names {
        fs::write(
            docs.join(name),
            format!("# {name}\n\nFirst sentence of {name}. Second sentence.\n"),
        )
        .unwrap();
    }
}

/// Single-page PDF whose content stream draws `phrase`.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({phrase}) Tj ET");
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{body}</w:body></w:document>"
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// `(chunk text, metadata json)` of every row for `fullpath`, in index order.
async fn rows_for(pipeline: &Pipeline, fullpath: &Path) -> Vec<(String, serde_json::Value)> {
    let rows =
        sqlx::query("SELECT chunk, metadata FROM chunks WHERE fullpath = ? ORDER BY chunk_index")
            .bind(fullpath.display().to_string())
            .fetch_all(pipeline.store().pool())
            .await
            .unwrap();
    rows.iter()
        .map(|row| {
            let metadata: String = row.get("metadata");
            (row.get("chunk"), serde_json::from_str(&metadata).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn discovery_is_idempotent() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md", "c.md"]);
    let pipeline = open(&env).await;

    assert_eq!(pipeline.discover().await.unwrap().len(), 3);
    let report = pipeline.split(None).await.unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.documents_split, 3);
    assert_eq!(report.failed, 0);
    assert!(pipeline.discover().await.unwrap().is_empty());

    let again = pipeline.split(None).await.unwrap();
    assert_eq!(again.pending, 0);
    assert_eq!(again.chunks_inserted, 0);

    write_notes(&env.docs, &["d.md"]);
    let pending = pipeline.discover().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].file_name().unwrap(), "d.md");
}

#[tokio::test]
async fn split_renames_dirty_file_names() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["care plan (draft).md"]);
    let pipeline = open(&env).await;

    let report = pipeline.split(None).await.unwrap();
    assert_eq!(report.documents_split, 1);
    assert!(env.docs.join("care_plan_draft.md").exists());
    assert!(!env.docs.join("care plan (draft).md").exists());

    let paths = pipeline.store().chunked_paths().await.unwrap();
    assert!(paths.iter().all(|p| p.ends_with("/care_plan_draft.md")));
    // The renamed document is recognised on the next run.
    assert!(pipeline.discover().await.unwrap().is_empty());
}

#[tokio::test]
async fn split_skips_failing_documents() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["good.md"]);
    fs::write(env.docs.join("broken.docx"), b"not a zip").unwrap();
    fs::write(env.docs.join(".hidden.md"), "# Hidden\n").unwrap();
    let pipeline = open(&env).await;

    let report = pipeline.split(None).await.unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.documents_split, 1);
    assert_eq!(report.failed, 2);

    let paths = pipeline.store().chunked_paths().await.unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths.iter().next().unwrap().ends_with("/good.md"));
}

#[tokio::test]
async fn split_honours_chunk_cap() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md", "c.md"]);
    let pipeline = open(&env).await;

    let report = pipeline.split(Some(1)).await.unwrap();
    assert_eq!(report.documents_split, 1);
    assert_eq!(pipeline.discover().await.unwrap().len(), 2);

    pipeline.split(None).await.unwrap();
    assert!(pipeline.discover().await.unwrap().is_empty());
}

#[tokio::test]
async fn embed_leaves_no_chunk_without_embedding() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md", "c.md"]);
    let pipeline = open(&env).await;
    let split = pipeline.split(None).await.unwrap();

    let first = pipeline.embed(Some(1)).await.unwrap();
    assert_eq!(first.embedded, 1);
    assert_eq!(first.remaining, split.chunks_inserted as i64 - 1);

    let rest = pipeline.embed(None).await.unwrap();
    assert_eq!(rest.embedded, split.chunks_inserted - 1);
    assert_eq!(rest.remaining, 0);
    assert_eq!(pipeline.store().counts().await.unwrap().without_embeddings(), 0);

    let nothing = pipeline.embed(None).await.unwrap();
    assert_eq!(nothing.embedded, 0);
}

#[tokio::test]
async fn embed_stops_at_first_provider_error() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md", "c.md"]);
    let provider = Arc::new(FlakyProvider {
        ok: 2,
        calls: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::with_provider(env.config.clone(), provider)
        .await
        .unwrap();
    let split = pipeline.split(None).await.unwrap();
    assert!(split.chunks_inserted > 2);

    let err = pipeline.embed(None).await.unwrap_err();
    assert!(matches!(err, Error::Provider(ProviderError::Api { status: 503, .. })));

    // Embeddings written before the failure are kept.
    let counts = pipeline.store().counts().await.unwrap();
    assert_eq!(counts.with_embeddings, 2);

    let resumed = Pipeline::with_provider(env.config.clone(), Arc::new(HashProvider))
        .await
        .unwrap();
    let report = resumed.embed(None).await.unwrap();
    assert_eq!(report.embedded, split.chunks_inserted - 2);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn vectorize_keeps_index_in_sync() {
    for backend in ["sqlite", "flat"] {
        let env = setup(backend);
        write_notes(&env.docs, &["a.md", "b.md", "c.md", "d.md", "e.md"]);
        let pipeline = open(&env).await;
        pipeline.split(None).await.unwrap();
        pipeline.embed(None).await.unwrap();

        let report = pipeline
            .vectorize(VectorizeOptions::default())
            .await
            .unwrap();
        let counts = pipeline.store().counts().await.unwrap();
        assert_eq!(report.inserted as i64, counts.with_embeddings, "backend {backend}");
        assert_eq!(report.collection_count as i64, counts.with_embeddings);
        // batch_size = 2 in the test config.
        assert_eq!(report.batches, (report.inserted + 1) / 2);
        assert_eq!(counts.to_vectorize(), 0);

        let again = pipeline
            .vectorize(VectorizeOptions::default())
            .await
            .unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.batches, 0);
        assert_eq!(again.collection_count, report.collection_count);

        let vectors = pipeline.open_vector_store().await.unwrap();
        assert_eq!(vectors.count().await.unwrap() as i64, counts.with_embeddings);
    }
}

#[tokio::test]
async fn vectorize_reinserts_rows_left_unmarked() {
    for backend in ["sqlite", "flat"] {
        let env = setup(backend);
        write_notes(&env.docs, &["a.md", "b.md", "c.md"]);
        let pipeline = open(&env).await;
        pipeline.split(None).await.unwrap();
        pipeline.embed(None).await.unwrap();

        let first = pipeline
            .vectorize(VectorizeOptions::default())
            .await
            .unwrap();
        let embedded = pipeline.store().counts().await.unwrap().with_embeddings as usize;
        assert_eq!(first.inserted, embedded);

        // Vectors were inserted but the flags never landed.
        sqlx::query("UPDATE chunks SET stored_in_vdb = 0")
            .execute(pipeline.store().pool())
            .await
            .unwrap();

        let rerun = pipeline
            .vectorize(VectorizeOptions::default())
            .await
            .unwrap();
        assert_eq!(rerun.inserted, embedded, "backend {backend}");
        assert_eq!(rerun.collection_count, 2 * first.collection_count);
        let counts = pipeline.store().counts().await.unwrap();
        assert_eq!(counts.vectorized, counts.with_embeddings);
        assert_eq!(counts.to_vectorize(), 0);

        let settled = pipeline
            .vectorize(VectorizeOptions::default())
            .await
            .unwrap();
        assert_eq!(settled.inserted, 0);
        assert_eq!(settled.collection_count, rerun.collection_count);
    }
}

#[tokio::test]
async fn vectorize_only_takes_embedded_rows() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md", "c.md", "d.md", "e.md"]);
    let pipeline = open(&env).await;
    pipeline.split(None).await.unwrap();
    pipeline.embed(Some(3)).await.unwrap();

    let options = VectorizeOptions {
        limit: Some(2),
        batch_size: Some(10),
    };
    let report = pipeline.vectorize(options).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.batches, 1);

    let report = pipeline.vectorize(VectorizeOptions::default()).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.collection_count, 3);

    let counts = pipeline.store().counts().await.unwrap();
    assert_eq!(counts.vectorized, 3);
    assert!(counts.without_embeddings() > 0);
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let env = setup("sqlite");
    let pipeline = open(&env).await;
    let options = VectorizeOptions {
        limit: None,
        batch_size: Some(0),
    };
    let err = pipeline.vectorize(options).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn query_finds_the_embedded_chunk() {
    let env = setup("flat");
    write_notes(&env.docs, &["a.md", "b.md"]);
    let pipeline = open(&env).await;
    let report = pipeline.run_all().await.unwrap();
    assert_eq!(report.split.documents_split, 2);
    assert_eq!(report.embed.remaining, 0);

    let target = &rows_for(&pipeline, &env.docs.canonicalize().unwrap().join("b.md")).await[0].0;
    let hits = pipeline.query(target, 3).await.unwrap();
    assert_eq!(&hits[0].text, target);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert!(hits[0].source.ends_with("/b.md"));
    assert_eq!(hits[0].page, 0);
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[tokio::test]
async fn metrics_follow_the_stages() {
    let env = setup("sqlite");
    write_notes(&env.docs, &["a.md", "b.md"]);
    let pipeline = open(&env).await;

    let before = stats::collection_metrics(&pipeline).await.unwrap();
    assert_eq!(before.name, "dementia");
    assert_eq!(before.total_documents, 2);
    assert_eq!(before.total_documents_in_db, 0);
    assert_eq!(before.total_chunks, 0);

    pipeline.split(None).await.unwrap();
    pipeline.embed(Some(1)).await.unwrap();
    pipeline.vectorize(VectorizeOptions::default()).await.unwrap();

    let after = stats::collection_metrics(&pipeline).await.unwrap();
    assert_eq!(after.total_documents_in_db, 2);
    assert_eq!(after.with_embeddings, 1);
    assert_eq!(after.without_embeddings, after.total_chunks - 1);
    assert_eq!(after.inserted_to_vectordb, 1);
    assert_eq!(after.to_insert_to_vectordb, 0);

    assert_eq!(pipeline.clear().await.unwrap(), after.total_chunks as u64);
    assert_eq!(pipeline.discover().await.unwrap().len(), 2);
}

#[tokio::test]
async fn mixed_formats_end_to_end() {
    let env = setup("sqlite");
    let table = "| name | stage |\n| Ada | early |";
    fs::write(env.docs.join("a.pdf"), minimal_pdf("memory clinic referral")).unwrap();
    fs::write(
        env.docs.join("b.docx"),
        minimal_docx(&["Daily routine.", "Keep a diary."]),
    )
    .unwrap();
    fs::write(
        env.docs.join("c.md"),
        format!("# Title\n\nHello. World.\n\n{table}\n"),
    )
    .unwrap();
    let pipeline = open(&env).await;

    let report = pipeline.split(None).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.documents_split, 3);

    let root = env.docs.canonicalize().unwrap();
    let paths = pipeline.store().chunked_paths().await.unwrap();
    for name in ["a.pdf", "b.docx", "c.md"] {
        assert!(
            paths.contains(&root.join(name).display().to_string()),
            "no chunks for {name}: {paths:?}"
        );
    }

    let pdf = rows_for(&pipeline, &root.join("a.pdf")).await;
    assert_eq!(pdf[0].1["page"], 1);
    assert!(pdf[0].0.contains("memory clinic referral"));

    let docx = rows_for(&pipeline, &root.join("b.docx")).await;
    assert_eq!(docx[0].0, "Daily routine.\nKeep a diary.");
    assert_eq!(docx[0].1["chunk_index"], 1);
    assert_eq!(docx[0].1["chunk_size"], 500);
    assert_eq!(docx[0].1["chunk_overlap"], 40);

    let md = rows_for(&pipeline, &root.join("c.md")).await;
    let tables: Vec<_> = md.iter().filter(|(text, _)| text.contains("| Ada |")).collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].0, format!("Title\n{table}"));
    assert_eq!(tables[0].1["section"], "table");
    assert!(md
        .iter()
        .any(|(text, _)| text.starts_with("Title") && text.contains("Hello.")));
    assert!(md
        .iter()
        .all(|(_, meta)| meta["source"] == root.join("c.md").display().to_string()));
}

//! # ragit
//!
//! Turns a directory of documents (PDF, DOCX, markdown, Python) into an
//! embedded, searchable collection and keeps a vector index in step with it.
//!
//! Ingestion runs in three stages against one SQLite chunk table. Each stage
//! can be re-run on its own and resumes where the previous run stopped.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ documents/ │──▶│ A: discover  │──▶│   chunks   │──▶│ B: embed     │
//! │ pdf docx … │   │ sanitize     │   │  (SQLite)  │◀──│ (provider)   │
//! └────────────┘   │ split        │   └─────┬──────┘   └──────────────┘
//!                  └──────────────┘         │
//!                                           ▼
//!                                    ┌──────────────┐   ┌──────────────┐
//!                                    │ C: vectorize │──▶│ VectorStore  │
//!                                    └──────────────┘   │ sqlite/flat  │
//!                                                       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragit init                    # create the chunk table
//! ragit split                   # stage A
//! ragit embed                   # stage B
//! ragit vectorize               # stage C
//! ragit query "memory loss" -k 5
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`sanitize`] | File name normalisation and renaming |
//! | [`markdown`] | Markdown header/text/table tree |
//! | [`chunk`] | Per-type document splitting |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`staging`] | The chunk staging table |
//! | [`pipeline`] | The ingestion context and stage driver |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Vector index abstraction and backends |
//! | [`search`] | Nearest-chunk queries |
//! | [`stats`] | Collection metrics |

pub mod chunk;
pub mod config;
pub mod db;
pub mod discover;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod markdown;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod search;
pub mod staging;
pub mod stats;
pub mod vector_store;
pub mod vectorize;

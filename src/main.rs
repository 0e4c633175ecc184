//! # ragit CLI
//!
//! Drives the ingestion stages and queries the vector index.
//!
//! ## Usage
//!
//! ```bash
//! ragit --config ./config/ragit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragit init` | Create the chunk table |
//! | `ragit discover` | List documents that have not been split yet |
//! | `ragit split` | Stage A: sanitize, split and stage new documents |
//! | `ragit embed` | Stage B: embed staged chunks |
//! | `ragit vectorize` | Stage C: copy embedded chunks into the vector index |
//! | `ragit run` | Stages A, B and C in order |
//! | `ragit stats` | Collection metrics |
//! | `ragit query "<text>"` | Nearest chunks from the vector index |
//! | `ragit clear` | Delete every chunk row |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragit::config;
use ragit::embedding::DisabledProvider;
use ragit::logging;
use ragit::pipeline::Pipeline;
use ragit::search;
use ragit::stats;
use ragit::vectorize::VectorizeOptions;

/// ragit: document chunking, embedding and vector-index synchronisation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "ragit", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the chunk table. Safe to run repeatedly.
    Init,

    /// List documents under the root that have no chunks yet.
    Discover,

    /// Sanitize, split and stage every new document.
    ///
    /// A document that fails is logged and skipped.
    Split {
        /// Stop starting new documents once this many chunks were inserted.
        #[arg(long)]
        max_chunks: Option<usize>,
    },

    /// Embed staged chunks that have no embedding yet.
    ///
    /// Stops at the first provider error; re-run to resume.
    Embed {
        /// Maximum number of chunks to embed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Insert embedded chunks into the vector index.
    Vectorize {
        /// Maximum number of chunks to insert.
        #[arg(long)]
        limit: Option<usize>,

        /// Rows per insert; overrides `[vector_store] batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run split, embed and vectorize in order.
    Run,

    /// Show document and chunk counts per stage.
    Stats,

    /// Print the chunks nearest to a text.
    Query {
        /// The query text.
        text: String,

        /// Number of results.
        #[arg(short, long, default_value = "5")]
        k: usize,
    },

    /// Delete every chunk row before a re-ingest.
    Clear,
}

impl Commands {
    /// Whether the command calls the embedding provider.
    fn embeds(&self) -> bool {
        matches!(
            self,
            Commands::Embed { .. } | Commands::Run | Commands::Query { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    let pipeline = if cli.command.embeds() {
        Pipeline::open(cfg).await?
    } else {
        Pipeline::with_provider(cfg, Arc::new(DisabledProvider)).await?
    };

    match cli.command {
        Commands::Init => {
            println!("init");
            println!("  database: {}", pipeline.config().db.path.display());
        }
        Commands::Discover => {
            let pending = pipeline.discover().await?;
            println!("discover");
            for path in &pending {
                println!("  {}", path.display());
            }
            println!("  pending: {}", pending.len());
        }
        Commands::Split { max_chunks } => {
            println!("{}", pipeline.split(max_chunks).await?);
        }
        Commands::Embed { limit } => {
            println!("{}", pipeline.embed(limit).await?);
        }
        Commands::Vectorize { limit, batch_size } => {
            let options = VectorizeOptions { limit, batch_size };
            println!("{}", pipeline.vectorize(options).await?);
        }
        Commands::Run => {
            let report = pipeline.run_all().await?;
            println!("{}", report.split);
            println!("{}", report.embed);
            println!("{}", report.vectorize);
        }
        Commands::Stats => {
            println!("{}", stats::collection_metrics(&pipeline).await?);
        }
        Commands::Query { text, k } => {
            search::run_query(&pipeline, &text, k).await?;
            pipeline.close().await;
            return Ok(());
        }
        Commands::Clear => {
            let removed = pipeline.clear().await?;
            println!("clear");
            println!("  removed chunks: {}", removed);
        }
    }
    println!("ok");

    pipeline.close().await;
    Ok(())
}

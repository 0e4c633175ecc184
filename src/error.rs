//! Error types for the ingestion pipeline.
//!
//! Each component owns a small error enum describing its own failure
//! modes. Everything that crosses the [`Pipeline`](crate::pipeline::Pipeline)
//! boundary is wrapped into the single application-level [`Error`], which
//! keeps the original cause reachable through [`std::error::Error::source`].

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;

/// Result alias used by every pipeline entry point.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while walking the documents root.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("documents root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("documents root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("failed to walk documents root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Failure while normalising or renaming a document path.
#[derive(Debug, Error)]
pub enum SanitizationError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid character in directory '{0}'")]
    InvalidDirectory(String),

    #[error("hidden files are not supported: {0}")]
    HiddenFile(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Failure while turning one document into chunks.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("unsupported document type: '{0}'")]
    Unsupported(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("invalid chunking parameters: {0}")]
    Config(String),
}

/// Failure reported by the external embedding provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("{0} environment variable not set")]
    MissingApiKey(&'static str),

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failure inside a vector-store backend.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector collection is not open")]
    NotOpen,

    #[error("collection '{collection}' has dimension {existing}, requested {requested}")]
    DimensionMismatch {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error("vector has {actual} dimensions, collection expects {expected}")]
    VectorDimension { expected: usize, actual: usize },

    #[error("insert columns differ in length: {0}")]
    LengthMismatch(String),

    #[error("unknown vector store backend: '{0}'")]
    UnknownBackend(String),

    #[error("vector database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("vector store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector snapshot is corrupt: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("query embedding failed: {0}")]
    Provider(#[from] ProviderError),
}

/// The uniform error surface of the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("sanitization failed: {0}")]
    Sanitization(#[from] SanitizationError),

    #[error("split failed: {0}")]
    Split(#[from] SplitError),

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("vector store failed: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("chunk table error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

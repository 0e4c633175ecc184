//! Document splitter.
//!
//! Dispatches on file extension and turns one document into an ordered list
//! of [`DocumentChunk`]s:
//!
//! - **pdf, docx**: extracted text is cut into `chunk_size`-character windows
//!   overlapping by `chunk_overlap` characters. PDF chunks carry their page.
//! - **py**: same windows, but cuts prefer Python statement boundaries.
//! - **md**: structural splitting. Every table becomes exactly one chunk;
//!   text is cut after the period closest to `chunk_size`, falling back to a
//!   hard cut when a section has no periods. Chunks are prefixed with their
//!   header breadcrumb.
//!
//! Splitting is pure after the file read: the same bytes and parameters
//! always give the same chunks.

use std::path::Path;

use text_splitter::{Characters, ChunkConfig, CodeSplitter, TextSplitter};

use crate::config::ChunkingConfig;
use crate::error::SplitError;
use crate::extract;
use crate::markdown::{MarkdownTree, NodeKind};
use crate::models::{ChunkMetadata, DocumentChunk};

/// Extensions the splitter understands.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "md", "py"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Markdown,
    Python,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Result<Self, SplitError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "md" => Ok(Self::Markdown),
            "py" => Ok(Self::Python),
            _ => Err(SplitError::Unsupported(path.display().to_string())),
        }
    }
}

/// A chunk body before its metadata is completed.
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    text: String,
    page: Option<u32>,
    section: Option<&'static str>,
}

impl Piece {
    fn plain(text: String) -> Self {
        Self {
            text,
            page: None,
            section: None,
        }
    }
}

/// Reads `path` and splits it into chunks numbered from 1.
pub fn split_document(
    path: &Path,
    params: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, SplitError> {
    let kind = DocumentKind::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| SplitError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let pieces = split_bytes(kind, &bytes, params)?;
    let source = path.display().to_string();
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| DocumentChunk {
            text: piece.text,
            metadata: ChunkMetadata {
                source: source.clone(),
                chunk_index: i + 1,
                chunk_size: params.chunk_size,
                chunk_overlap: params.chunk_overlap,
                page: piece.page,
                section: piece.section.map(str::to_string),
            },
        })
        .collect())
}

fn split_bytes(
    kind: DocumentKind,
    bytes: &[u8],
    params: ChunkingConfig,
) -> Result<Vec<Piece>, SplitError> {
    match kind {
        DocumentKind::Pdf => {
            let mut pieces = Vec::new();
            for page in extract::extract_pdf_pages(bytes)? {
                let windows = text_windows(&page.text, params)?;
                pieces.extend(windows.into_iter().map(|text| Piece {
                    text,
                    page: Some(page.number),
                    section: None,
                }));
            }
            Ok(pieces)
        }
        DocumentKind::Docx => {
            let text = extract::extract_docx(bytes)?;
            Ok(text_windows(&text, params)?
                .into_iter()
                .map(Piece::plain)
                .collect())
        }
        DocumentKind::Python => {
            let source = String::from_utf8_lossy(bytes);
            Ok(code_windows(&source, params)?
                .into_iter()
                .map(Piece::plain)
                .collect())
        }
        DocumentKind::Markdown => {
            let source = String::from_utf8_lossy(bytes);
            Ok(markdown_pieces(&source, params.chunk_size))
        }
    }
}

fn window_config(params: ChunkingConfig) -> Result<ChunkConfig<Characters>, SplitError> {
    ChunkConfig::new(params.chunk_size)
        .with_overlap(params.chunk_overlap)
        .map_err(|e| SplitError::Config(e.to_string()))
}

fn text_windows(text: &str, params: ChunkingConfig) -> Result<Vec<String>, SplitError> {
    let splitter: TextSplitter<Characters> = TextSplitter::new(window_config(params)?);
    Ok(splitter.chunks(text).map(str::to_string).collect())
}

fn code_windows(source: &str, params: ChunkingConfig) -> Result<Vec<String>, SplitError> {
    let splitter: CodeSplitter<Characters> =
        CodeSplitter::new(tree_sitter_python::LANGUAGE, window_config(params)?)
            .map_err(|e| SplitError::Config(e.to_string()))?;
    Ok(splitter.chunks(source).map(str::to_string).collect())
}

fn markdown_pieces(source: &str, chunk_size: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for section in MarkdownTree::parse(source).sections() {
        let (label, bodies) = match section.kind {
            NodeKind::Table => {
                let table = section.text.trim();
                let bodies = if table.is_empty() {
                    Vec::new()
                } else {
                    vec![table.to_string()]
                };
                ("table", bodies)
            }
            _ => ("text", cut_sentences(&section.text, chunk_size)),
        };
        for body in bodies {
            let text = if section.breadcrumb.is_empty() {
                body
            } else {
                format!("{}\n{}", section.breadcrumb, body)
            };
            pieces.push(Piece {
                text,
                page: None,
                section: Some(label),
            });
        }
    }
    pieces
}

/// Replaces every run of newlines with a single newline.
fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_newline = false;
    for c in text.chars() {
        if c == '\n' {
            if prev_newline {
                continue;
            }
            prev_newline = true;
        } else {
            prev_newline = false;
        }
        out.push(c);
    }
    out
}

/// Index into `periods` of the position closest to `target`. On a tie the
/// earlier position wins.
fn closest_period(periods: &[usize], target: usize) -> usize {
    let insert_at = periods.partition_point(|&p| p < target);
    if insert_at == 0 {
        return 0;
    }
    if insert_at == periods.len() {
        return periods.len() - 1;
    }
    if periods[insert_at] - target < target - periods[insert_at - 1] {
        insert_at
    } else {
        insert_at - 1
    }
}

/// Cuts one markdown text section into chunks.
///
/// Each cut lands right after the period closest to `chunk_size` characters
/// into the remaining text. Text without periods is cut every `chunk_size`
/// characters. The remainder is trimmed before the next cut.
pub fn cut_sentences(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = collapse_newlines(text.trim()).chars().collect();
    let periods: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '.')
        .map(|(i, _)| i)
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let ahead = &periods[periods.partition_point(|&p| p < start)..];
        let cut = if ahead.is_empty() {
            start + chunk_size.min(chars.len() - start)
        } else {
            ahead[closest_period(ahead, start + chunk_size)] + 1
        };

        chunks.push(chars[start..cut].iter().collect());
        start = cut;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }
    chunks
}

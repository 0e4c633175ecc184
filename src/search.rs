//! Nearest-chunk lookup against the vector index.
//!
//! The read side of the collection: the query text is embedded with the
//! configured provider and matched against the vector store. The chunk
//! table is never touched.

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::vector_store::QueryMatch;

/// Longest excerpt printed per match, in characters.
const EXCERPT_CHARS: usize = 240;

/// Runs a query and prints the matches, closest first.
pub async fn run_query(pipeline: &Pipeline, text: &str, k: usize) -> Result<()> {
    let matches = pipeline.query(text, k).await?;
    tracing::debug!(k, found = matches.len(), "query finished");
    print!("{}", format_matches(&matches));
    Ok(())
}

/// Renders matches as numbered entries, or `No results.`.
pub fn format_matches(matches: &[QueryMatch]) -> String {
    if matches.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (i, m) in matches.iter().enumerate() {
        out.push_str(&format!("{}. [{:.2}] {}\n", i + 1, m.similarity, m.source));
        if m.page > 0 {
            out.push_str(&format!("    page: {}\n", m.page));
        }
        out.push_str(&format!("    excerpt: \"{}\"\n", excerpt(&m.text)));
        out.push('\n');
    }
    out
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, similarity: f32, page: u32) -> QueryMatch {
        QueryMatch {
            text: text.to_string(),
            similarity,
            source: "/docs/guide.pdf".to_string(),
            page,
        }
    }

    #[test]
    fn test_no_results() {
        assert_eq!(format_matches(&[]), "No results.\n");
    }

    #[test]
    fn test_matches_are_numbered() {
        let out = format_matches(&[hit("Care\nplans.", 0.912, 4), hit("Other", 0.5, 0)]);
        assert!(out.starts_with("1. [0.91] /docs/guide.pdf\n    page: 4\n"));
        assert!(out.contains("    excerpt: \"Care plans.\""));
        assert!(out.contains("2. [0.50] /docs/guide.pdf\n    excerpt"));
    }

    #[test]
    fn test_long_excerpt_is_cut() {
        let long = "word ".repeat(100);
        let cut = excerpt(&long);
        assert!(cut.ends_with('…'));
        assert!(cut.chars().count() <= EXCERPT_CHARS + 1);
    }
}

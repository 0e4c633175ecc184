//! File path normalisation.
//!
//! Every document is renamed to a conservative filename before its path is
//! recorded in the chunk table, so that downstream tools never have to quote
//! or escape a stored path. Directory names are never rewritten, only
//! validated.

use std::path::{Path, PathBuf};

use crate::error::SanitizationError;

/// Characters that may not appear in a directory name, nor open a filename.
const SPECIAL_CHARS: &[char] = &[
    '#', '%', '&', '{', '}', '\\', '<', '>', '*', '?', '/', ' ', '$', '!', '\'', '"', ':', '@',
    '+', '`', '|', '=', '😀', '🎉', '\u{2764}', '\u{fe0f}', '©', '®', '•', '€',
];

fn is_special(c: char) -> bool {
    SPECIAL_CHARS.contains(&c)
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Replaces every run of `c` with a single `c`.
fn collapse_runs(s: &str, c: char) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev = None;
    for ch in s.chars() {
        if ch == c && prev == Some(c) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

fn sanitize_filename(name: &str) -> Result<String, SanitizationError> {
    let name = name.replace(' ', "_");
    if name.starts_with('.') {
        return Err(SanitizationError::HiddenFile(name));
    }
    if name.chars().next().is_some_and(is_special) {
        return Err(SanitizationError::InvalidFilename(name));
    }

    let kept: String = name.chars().filter(|c| is_allowed(*c)).collect();
    let kept = kept.trim_matches('.');
    let clean = collapse_runs(&collapse_runs(kept, '.'), '_');
    if clean.is_empty() {
        return Err(SanitizationError::InvalidFilename(name));
    }
    if let Some(ext) = lost_extension(&name, &clean) {
        tracing::warn!(
            name = %name,
            sanitized = %clean,
            extension = ext,
            "sanitized name has no extension; the document will not be split"
        );
    }
    Ok(clean)
}

/// The extension of `before` when `after` no longer carries one.
fn lost_extension<'a>(before: &'a str, after: &str) -> Option<&'a str> {
    let ext = Path::new(before).extension()?.to_str()?;
    Path::new(after).extension().is_none().then_some(ext)
}

/// Computes the sanitized form of `path` without touching the filesystem.
///
/// Directory segments are validated and kept as they are; only the final
/// filename is rewritten.
pub fn sanitize_path(path: &str) -> Result<String, SanitizationError> {
    let (dirs, filename) = match path.rsplit_once('/') {
        Some((dirs, filename)) => (Some(dirs), filename),
        None => (None, path),
    };

    if let Some(dirs) = dirs {
        if let Some(bad) = dirs.split('/').find(|seg| seg.chars().any(is_special)) {
            return Err(SanitizationError::InvalidDirectory(bad.to_string()));
        }
    }

    let filename = sanitize_filename(filename)?;
    Ok(match dirs {
        Some(dirs) => format!("{dirs}/{filename}"),
        None => filename,
    })
}

/// Inserts `-{suffix}` between the file stem and its extension.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{suffix}"),
    };
    path.with_file_name(name)
}

/// Sanitizes `path` and renames the file on disk when its name changes.
///
/// Returns the path the document now lives at. An already-sanitized path is
/// returned unchanged and nothing is renamed. When the sanitized name is
/// already taken by another file, a short random suffix keeps it unique.
pub fn sanitize(path: &Path) -> Result<PathBuf, SanitizationError> {
    if !path.exists() {
        return Err(SanitizationError::NotFound(path.to_path_buf()));
    }

    let original = path.to_string_lossy();
    let sanitized = sanitize_path(&original)?;
    if sanitized == original {
        return Ok(path.to_path_buf());
    }

    let mut target = PathBuf::from(&sanitized);
    if target.exists() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        target = with_suffix(&target, &id[..8]);
    }

    std::fs::rename(path, &target).map_err(|source| SanitizationError::Rename {
        from: path.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    tracing::debug!(from = %path.display(), to = %target.display(), "renamed document");
    Ok(target)
}

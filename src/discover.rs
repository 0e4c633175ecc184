use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::DiscoveryError;

/// Walks the documents root and returns every file whose extension is in the
/// allow-list, as absolute paths in sorted order.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<PathBuf>, DiscoveryError> {
    let root = &config.root;
    if !root.exists() {
        return Err(DiscoveryError::MissingRoot(root.clone()));
    }
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.clone()));
    }
    let root = root
        .canonicalize()
        .map_err(|_| DiscoveryError::MissingRoot(root.clone()))?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let extensions: HashSet<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut paths = Vec::new();
    for entry in WalkDir::new(&root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }
        if !has_extension(path, &extensions) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

fn has_extension(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .map(|e| extensions.contains(&e.to_string_lossy().to_lowercase()))
        .unwrap_or(false)
}

/// Paths from `all` that have no chunk rows yet.
pub fn pending_documents(all: Vec<PathBuf>, already_chunked: &HashSet<String>) -> Vec<PathBuf> {
    all.into_iter()
        .filter(|p| !already_chunked.contains(&p.display().to_string()))
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

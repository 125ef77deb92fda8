//! Filesystem ingestion.
//!
//! Walks the ingest root, applies include/exclude globs, and reads each
//! matching file into a [`Document`]. Text files are read as UTF-8; PDFs go
//! through [`crate::extract`]. A file that cannot be read is recorded as a
//! [`SkippedFile`] and the walk continues.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use groundcheck_core::models::Document;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::extract;

/// A file the walk matched but could not turn into a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Documents sorted by source path.
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Scan `root` (or `config.root` when `None`) for documents.
///
/// # Errors
///
/// Fails only when the root does not exist or a glob is invalid; per-file
/// problems are reported in [`ScanOutcome::skipped`].
pub fn scan_directory(config: &IngestConfig, root: Option<&Path>) -> Result<ScanOutcome> {
    let root = root.unwrap_or(config.root.as_path());
    if !root.is_dir() {
        bail!("Ingest root does not exist or is not a directory: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut outcome = ScanOutcome::default();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(%path, error = %e, "skipping unreadable entry");
                outcome.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_document(path) {
            Ok(body) => {
                debug!(source = %rel_str, bytes = body.len(), "read document");
                outcome.documents.push(Document::new(rel_str, body));
            }
            Err(reason) => {
                warn!(source = %rel_str, %reason, "skipping file");
                outcome.skipped.push(SkippedFile {
                    path: rel_str,
                    reason,
                });
            }
        }
    }

    // Sort for deterministic ordering
    outcome.documents.sort_by(|a, b| a.source.cmp(&b.source));
    outcome.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(outcome)
}

fn read_document(path: &Path) -> std::result::Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read failed: {}", e))?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    if extract::is_binary(&extension) {
        extract::extract_text(&bytes, &extension).map_err(|e| e.to_string())
    } else {
        String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

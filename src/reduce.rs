//! Reduced-document construction.
//!
//! Builds a new PDF containing only the important pages, in ascending
//! order, by deleting the complement from a loaded copy and pruning the
//! orphaned objects. The artifact lives next to the source as
//! `<stem>_short.pdf` and is reused on reruns while it is still fresh,
//! which makes the pipeline idempotent and resumable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;

/// Errors that can occur while building the reduced document.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("No pages selected for reduction")]
    EmptySelection,

    #[error("Failed to save reduced PDF: {0}")]
    Save(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive the reduced-document path for a source PDF.
pub fn reduced_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    source.with_file_name(format!("{}_short.pdf", stem))
}

/// Whether a source PDF is already a reduction artifact.
pub fn is_reduced_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().ends_with("_short.pdf"))
        .unwrap_or(false)
}

/// Path-addressed cache for reduced documents.
///
/// An artifact is reused only while it is non-empty and at least as new
/// as its source; a source edited after reduction invalidates it.
pub struct ReducedCache;

impl ReducedCache {
    /// Check whether a fresh artifact exists for `source`.
    pub fn fresh_artifact(source: &Path) -> Option<PathBuf> {
        let artifact = reduced_path(source);
        let meta = std::fs::metadata(&artifact).ok()?;
        if meta.len() == 0 {
            return None;
        }

        // Stale-source check; if either mtime is unavailable, fall back
        // to the size-only check above.
        if let (Ok(artifact_mtime), Ok(source_mtime)) = (
            meta.modified(),
            std::fs::metadata(source).and_then(|m| m.modified()),
        ) {
            if artifact_mtime < source_mtime {
                tracing::info!(
                    "Discarding stale reduced PDF {} (source is newer)",
                    artifact.display()
                );
                return None;
            }
        }

        Some(artifact)
    }
}

/// Build the reduced document for `source` from the important-page set.
///
/// Indices at or beyond the page count are silently skipped. Returns
/// the artifact path on success.
pub fn reduce(source: &Path, page_set: &BTreeSet<u32>) -> Result<PathBuf, ReduceError> {
    let doc = Document::load(source).map_err(|e| ReduceError::Parse(e.to_string()))?;
    let page_count = doc.get_pages().len() as u32;

    // 1-based page numbers to keep, bounds-checked against the document.
    let keep: BTreeSet<u32> = page_set
        .iter()
        .filter(|&&idx| idx < page_count)
        .map(|&idx| idx + 1)
        .collect();

    if keep.is_empty() {
        return Err(ReduceError::EmptySelection);
    }

    let mut reduced = doc;

    // Delete in reverse order so earlier page numbers stay valid.
    let mut to_delete: Vec<u32> = (1..=page_count).filter(|p| !keep.contains(p)).collect();
    to_delete.reverse();
    for page_num in to_delete {
        reduced.delete_pages(&[page_num]);
    }

    // Drop orphaned objects left behind by the deleted pages.
    reduced.prune_objects();
    reduced.compress();

    let target = reduced_path(source);
    reduced
        .save(&target)
        .map_err(|e| ReduceError::Save(e.to_string()))?;

    tracing::info!(
        "Created reduced PDF {} ({} of {} pages)",
        target.display(),
        keep.len(),
        page_count
    );
    Ok(target)
}

//! Page importance scanning.
//!
//! Partitions a contract PDF into page chunks, scans each chunk on its
//! own blocking worker, and returns the sorted set of pages that match
//! a registered clause pattern (plus the mandatory leading pages).
//!
//! Each worker opens its own extractor and probes page count itself, so
//! no document handle is shared across workers. Workers return their
//! chunk's result; the coordinator performs the union, so chunk
//! completion order never affects the final set.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::ocr::{TextExtractor, OCR_FAILED_MARKER};

/// Default pages per scan chunk.
pub const DEFAULT_CHUNK_SIZE: u32 = 50;

/// A clause pattern to search for, with matching flags and the number
/// of following pages to retain on a match (a clause that starts near
/// the bottom of a page usually spills onto the next one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTerm {
    /// Regex pattern, matched case-insensitively.
    pub pattern: String,
    /// Whether `^`/`$` match line boundaries.
    #[serde(default)]
    pub multiline: bool,
    /// Following pages to include on a match.
    #[serde(default = "default_include_next")]
    pub include_next: u32,
}

fn default_include_next() -> u32 {
    1
}

impl SearchTerm {
    pub fn new(pattern: &str, multiline: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            multiline,
            include_next: default_include_next(),
        }
    }
}

/// The default registry: the clause anchors that mark the legally
/// material sections of a concession agreement.
pub fn default_search_terms() -> Vec<SearchTerm> {
    vec![
        SearchTerm::new(r"(?:This\s+)?Agreement\s+is\s+entered\s+into", false),
        SearchTerm::new(r"(?:\n|^)\s*SCHEDULE\s*[- ]*\s*J\s*(?:\n|$)", true),
        SearchTerm::new(r"(?:\n|^)\s*ARTICLE\s+19\s*(?:\n|$)", true),
        SearchTerm::new(r"(?:\n|^)\s*SCHEDULE\s*[- ]*\s*H\s*(?:\n|$)", true),
    ]
}

/// A compiled search term.
struct CompiledTerm {
    regex: Regex,
    include_next: u32,
}

/// The compiled, injected search-term registry.
pub struct SearchTermSet {
    terms: Vec<CompiledTerm>,
}

impl SearchTermSet {
    /// Compile a term registry. Invalid patterns are a configuration
    /// error, reported up front rather than mid-scan.
    pub fn compile(terms: &[SearchTerm]) -> anyhow::Result<Self> {
        let mut compiled = Vec::with_capacity(terms.len());
        for term in terms {
            let regex = RegexBuilder::new(&term.pattern)
                .case_insensitive(true)
                .multi_line(term.multiline)
                .build()
                .map_err(|e| anyhow::anyhow!("invalid search term '{}': {}", term.pattern, e))?;
            compiled.push(CompiledTerm {
                regex,
                include_next: term.include_next,
            });
        }
        Ok(Self { terms: compiled })
    }

    /// Largest neighbor count across all terms that match `text`.
    /// Returns None when nothing matches.
    fn match_reach(&self, text: &str) -> Option<u32> {
        self.terms
            .iter()
            .filter(|t| t.regex.is_match(text))
            .map(|t| t.include_next)
            .max()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Scans documents for important pages.
pub struct PageImportanceScanner {
    terms: Arc<SearchTermSet>,
    chunk_size: u32,
    workers: usize,
    min_chars: usize,
    ocr_lang: String,
}

impl PageImportanceScanner {
    pub fn new(terms: SearchTermSet) -> Self {
        Self {
            terms: Arc::new(terms),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            min_chars: 50,
            ocr_lang: "eng".to_string(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn with_ocr_language(mut self, lang: &str) -> Self {
        self.ocr_lang = lang.to_string();
        self
    }

    /// Scan a PDF and return the sorted set of important page indices.
    ///
    /// Always contains pages 0 and 1 when they exist. Chunks that fail
    /// are logged and excluded; partial results from the other chunks
    /// are still honored.
    pub async fn scan(&self, pdf_path: &Path) -> anyhow::Result<BTreeSet<u32>> {
        let extractor = TextExtractor::new();
        let page_count = extractor
            .get_pdf_page_count(pdf_path)
            .ok_or_else(|| anyhow::anyhow!("cannot read page count of {}", pdf_path.display()))?;

        tracing::info!(
            "Scanning {} pages of {} using {} workers",
            page_count,
            pdf_path.display(),
            self.workers
        );

        let mut important = seed_pages(page_count);

        let mut handles = Vec::new();
        for (start, end) in chunk_ranges(page_count, self.chunk_size) {
            let terms = self.terms.clone();
            let path: PathBuf = pdf_path.to_path_buf();
            let min_chars = self.min_chars;
            let lang = self.ocr_lang.clone();

            let handle = tokio::task::spawn_blocking(move || {
                scan_chunk(&path, start, end, &terms, min_chars, &lang)
            });
            handles.push(handle);

            // Bound in-flight chunks to the worker count.
            if handles.len() >= self.workers {
                for h in handles.drain(..) {
                    merge_chunk_result(&mut important, h.await);
                }
            }
        }

        for h in handles {
            merge_chunk_result(&mut important, h.await);
        }

        tracing::info!(
            "Finished scanning {}: {} important pages",
            pdf_path.display(),
            important.len()
        );
        Ok(important)
    }
}

/// Fold one chunk's outcome into the accumulated set. A failed chunk is
/// logged and skipped; the scan is best-effort, not all-or-nothing.
fn merge_chunk_result(
    important: &mut BTreeSet<u32>,
    result: Result<BTreeSet<u32>, tokio::task::JoinError>,
) {
    match result {
        Ok(pages) => important.extend(pages),
        Err(e) => tracing::warn!("Chunk scan failed: {}", e),
    }
}

/// The mandatory leading pages, restricted to pages that exist.
fn seed_pages(page_count: u32) -> BTreeSet<u32> {
    (0..page_count.min(2)).collect()
}

/// Partition `[0, page_count)` into contiguous `chunk_size` ranges.
fn chunk_ranges(page_count: u32, chunk_size: u32) -> Vec<(u32, u32)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < page_count {
        let end = (start + chunk_size).min(page_count);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// Scan one chunk of pages. Runs on a blocking worker with its own
/// extractor and its own page-count probe.
fn scan_chunk(
    pdf_path: &Path,
    start: u32,
    end: u32,
    terms: &SearchTermSet,
    min_chars: usize,
    ocr_lang: &str,
) -> BTreeSet<u32> {
    let mut local: BTreeSet<u32> = BTreeSet::new();
    let extractor = TextExtractor::new()
        .with_min_chars(min_chars)
        .with_language(ocr_lang);

    // Re-probe the page count on this worker's own handle so neighbor
    // inclusion never reaches past the end of the document.
    let page_count = extractor.get_pdf_page_count(pdf_path).unwrap_or(end);

    for page in start..end.min(page_count) {
        let text = extractor.page_text(pdf_path, page);
        if text == OCR_FAILED_MARKER {
            continue;
        }

        if let Some(reach) = terms.match_reach(&text) {
            tracing::debug!(
                "Match on page {} of {} (keeping {} following)",
                page + 1,
                pdf_path.display(),
                reach
            );
            local.insert(page);
            for offset in 1..=reach {
                let neighbor = page + offset;
                if neighbor < page_count {
                    local.insert(neighbor);
                }
            }
        }
    }

    local
}

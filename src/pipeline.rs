//! Per-document pipeline: scan, reduce, extract, post-process.
//!
//! Phases after the scan run strictly sequentially. Failures local to
//! one document never abort the batch; only missing global
//! preconditions (API key, schema file) do, and those are checked
//! before the first document.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;
use crate::llm::GeminiClient;
use crate::postprocess::{build_row, ExtractionResult};
use crate::reduce::{self, is_reduced_artifact, ReducedCache};
use crate::scan::{PageImportanceScanner, SearchTermSet};
use crate::schema::ExtractionSchema;

/// Outcome of processing one document.
pub struct DocumentOutcome {
    /// The output row, aligned with the schema's column set.
    pub row: Vec<String>,
    /// Whether a cached reduced PDF was reused.
    pub reused_cache: bool,
    /// Whether the model output parsed as structured data.
    pub parsed: bool,
}

/// The contract extraction pipeline.
pub struct Pipeline {
    config: Config,
    schema: ExtractionSchema,
    client: GeminiClient,
}

impl Pipeline {
    /// Build the pipeline, verifying global preconditions up front:
    /// the search-term registry compiles and the API key is present.
    pub fn new(config: Config, schema: ExtractionSchema) -> anyhow::Result<Self> {
        // Compile once to fail fast; workers compile their own copy.
        let terms = SearchTermSet::compile(&config.scan.terms)?;
        if terms.is_empty() {
            anyhow::bail!("no search terms configured");
        }

        let client = GeminiClient::from_env(config.llm.clone())?;
        Ok(Self {
            config,
            schema,
            client,
        })
    }

    pub fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }

    fn scanner(&self) -> anyhow::Result<PageImportanceScanner> {
        scanner_from_config(&self.config)
    }

    /// Process one contract PDF into an output row.
    ///
    /// A reduction failure is an error (the document is skipped); a
    /// model failure still yields a row, with the error message landing
    /// in the raw-response fallback column for manual review.
    pub async fn process_document(&self, pdf_path: &Path) -> anyhow::Result<DocumentOutcome> {
        let started = Instant::now();

        let (reduced_pdf, reused_cache) = match ReducedCache::fresh_artifact(pdf_path) {
            Some(artifact) => {
                tracing::info!("Reusing existing reduced PDF: {}", artifact.display());
                (artifact, true)
            }
            None => {
                let pages = self.scanner()?.scan(pdf_path).await?;
                tracing::info!(
                    "Identified {} important pages in {}",
                    pages.len(),
                    pdf_path.display()
                );
                (reduce::reduce(pdf_path, &pages)?, false)
            }
        };

        let raw = match self.client.extract_fields(&reduced_pdf, &self.schema).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", pdf_path.display(), e);
                format!("LLM Error: {}", e)
            }
        };

        let result = ExtractionResult::parse(&raw);
        let file_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf_path.display().to_string());
        let row = build_row(&self.schema, &file_name, &result);

        tracing::info!(
            "Processed {} in {:.2}s",
            pdf_path.display(),
            started.elapsed().as_secs_f64()
        );

        Ok(DocumentOutcome {
            row,
            reused_cache,
            parsed: result.is_parsed(),
        })
    }
}

/// Build a scanner from configuration (also used by the `scan`
/// subcommand, which runs without an API key).
pub fn scanner_from_config(config: &Config) -> anyhow::Result<PageImportanceScanner> {
    let terms = SearchTermSet::compile(&config.scan.terms)?;
    if terms.is_empty() {
        anyhow::bail!("no search terms configured");
    }
    Ok(PageImportanceScanner::new(terms)
        .with_chunk_size(config.scan.chunk_size)
        .with_workers(config.scan_workers())
        .with_min_chars(config.scan.min_chars)
        .with_ocr_language(&config.scan.ocr_language))
}

/// Discover contract PDFs in a directory, skipping reduction artifacts.
pub fn discover_pdfs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", dir.display(), e))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf && !is_reduced_artifact(&path) {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

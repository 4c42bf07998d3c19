//! Deployment configuration.
//!
//! Loaded from an optional `contriage.toml`; every section has
//! defaults, so a bare checkout runs with the built-in clause registry
//! and the standard thresholds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::llm::LlmConfig;
use crate::scan::{default_search_terms, SearchTerm, DEFAULT_CHUNK_SIZE};

/// Scan-phase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Pages per worker chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Worker count; 0 means available parallelism.
    #[serde(default)]
    pub workers: usize,
    /// Minimum stripped characters before a page falls back to OCR.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Tesseract language.
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    /// Clause patterns to anchor page selection.
    #[serde(default = "default_search_terms")]
    pub terms: Vec<SearchTerm>,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}
fn default_min_chars() -> usize {
    50
}
fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            workers: 0,
            min_chars: default_min_chars(),
            ocr_language: default_ocr_language(),
            terms: default_search_terms(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from a TOML file, or defaults when the file
    /// does not exist. A malformed file is an error, not a silent
    /// fallback.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("malformed config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Effective scan worker count.
    pub fn scan_workers(&self) -> usize {
        if self.scan.workers > 0 {
            self.scan.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.chunk_size, 50);
        assert_eq!(config.scan.min_chars, 50);
        assert_eq!(config.scan.terms.len(), 4);
        assert!(config.scan_workers() >= 1);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/contriage.toml")).unwrap();
        assert_eq!(config.scan.chunk_size, 50);
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contriage.toml");
        std::fs::write(
            &path,
            r#"
[scan]
chunk_size = 25
workers = 2

[[scan.terms]]
pattern = "FORCE\\s+MAJEURE"
multiline = true
include_next = 2

[llm]
model = "gemini-1.5-pro"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scan.chunk_size, 25);
        assert_eq!(config.scan_workers(), 2);
        assert_eq!(config.scan.terms.len(), 1);
        assert_eq!(config.scan.terms[0].include_next, 2);
        assert_eq!(config.llm.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contriage.toml");
        std::fs::write(&path, "[scan\nchunk_size = ").unwrap();

        assert!(Config::load(&path).is_err());
    }
}

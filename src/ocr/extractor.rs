//! Text extraction from PDF pages using pdftotext and Tesseract.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;

/// Marker returned when the OCR engine itself fails on a page.
///
/// Callers must treat this as "no usable text" and keep going; a single
/// unreadable page never aborts a scan.
pub const OCR_FAILED_MARKER: &str = "[OCR FAILED]";

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractionError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix, stderr
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Check command status, returning appropriate error on failure.
fn check_cmd_status(
    result: std::io::Result<std::process::ExitStatus>,
    tool_name: &str,
    error_msg: &str,
) -> Result<(), ExtractionError> {
    match result {
        Ok(s) if s.success() => Ok(()),
        Ok(_) => Err(ExtractionError::ExtractionFailed(error_msg.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text extractor that uses external Poppler and Tesseract tools.
pub struct TextExtractor {
    /// Minimum stripped characters before a page is considered scanned.
    min_chars_per_page: usize,
    /// Tesseract language setting.
    tesseract_lang: String,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            min_chars_per_page: 50,
            tesseract_lang: "eng".to_string(),
        }
    }
}

impl TextExtractor {
    /// Create a new text extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum characters per page threshold.
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars_per_page = min_chars;
        self
    }

    /// Set Tesseract language.
    pub fn with_language(mut self, lang: &str) -> Self {
        self.tesseract_lang = lang.to_string();
        self
    }

    /// Extract text from a single page (0-based index), falling back to
    /// OCR when the direct extraction is absent or too sparse.
    ///
    /// OCR engine failure yields [`OCR_FAILED_MARKER`] rather than an
    /// error so batch scans keep going past unreadable pages.
    pub fn page_text(&self, pdf_path: &Path, page_index: u32) -> String {
        let pdf_text = self
            .extract_pdf_page_text(pdf_path, page_index + 1)
            .unwrap_or_default();

        if pdf_text.trim().len() >= self.min_chars_per_page {
            return pdf_text;
        }

        // Sparse or empty text: raster just this page and OCR it.
        match self.ocr_pdf_page(pdf_path, page_index + 1) {
            Ok(ocr_text) => ocr_text,
            Err(e) => {
                tracing::debug!(
                    "OCR failed for page {} of {}: {}",
                    page_index + 1,
                    pdf_path.display(),
                    e
                );
                OCR_FAILED_MARKER.to_string()
            }
        }
    }

    /// Run pdftotext on a single page of a PDF file (1-based page number).
    pub fn extract_pdf_page_text(
        &self,
        file_path: &Path,
        page: u32,
    ) -> Result<String, ExtractionError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(file_path)
            .arg("-") // Output to stdout
            .output();

        handle_cmd_output(
            output,
            "pdftotext (install poppler-utils)",
            &format!("pdftotext failed on page {}", page),
        )
    }

    /// Get the page count of a PDF.
    pub fn get_pdf_page_count(&self, file_path: &Path) -> Option<u32> {
        let output = Command::new("pdfinfo").arg(file_path).output().ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if line.starts_with("Pages:") {
                return line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
            }
        }
        None
    }

    /// OCR a single page of a PDF file (1-based page number).
    ///
    /// Converts only the specified page to an image and runs Tesseract
    /// on it, so memory stays bounded when scanning long documents.
    pub fn ocr_pdf_page(&self, file_path: &Path, page: u32) -> Result<String, ExtractionError> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path();
        let output_prefix = temp_path.join("page");

        let page_str = page.to_string();
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
            .arg(file_path)
            .arg(&output_prefix)
            .status();

        check_cmd_status(
            status,
            "pdftoppm (install poppler-utils)",
            &format!("pdftoppm failed to convert page {}", page),
        )?;

        // Find the generated image
        if let Some(image_path) = self.find_page_image(temp_path, page) {
            self.run_tesseract(&image_path)
        } else {
            Err(ExtractionError::ExtractionFailed(format!(
                "No image generated for page {}",
                page
            )))
        }
    }

    /// Find the image file for a specific page number.
    fn find_page_image(&self, temp_path: &Path, page_num: u32) -> Option<std::path::PathBuf> {
        // pdftoppm names files like page-01.png, page-02.png, etc.
        // For documents with many pages, it may use more digits: page-001.png
        for digits in [1, 2, 3, 4] {
            let filename = format!("page-{:0width$}.png", page_num, width = digits);
            let path = temp_path.join(&filename);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Run Tesseract OCR on an image.
    fn run_tesseract(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.tesseract_lang])
            .output();

        handle_cmd_output(output, "tesseract (install tesseract-ocr)", "tesseract failed")
    }

    /// Check if required tools are available.
    pub fn check_tools() -> Vec<(String, bool)> {
        ["pdftotext", "pdftoppm", "pdfinfo", "tesseract"]
            .iter()
            .map(|tool| (tool.to_string(), check_binary(tool)))
            .collect()
    }
}

/// Check whether an external binary is on PATH.
fn check_binary(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|_| true)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tools() {
        let tools = TextExtractor::check_tools();
        assert!(!tools.is_empty());
        for (tool, available) in tools {
            println!("{}: {}", tool, if available { "found" } else { "missing" });
        }
    }

    #[test]
    fn test_marker_is_not_usable_text() {
        assert!(OCR_FAILED_MARKER.trim().len() < 50);
    }
}

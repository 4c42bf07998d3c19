//! Per-page text extraction with OCR fallback.
//!
//! Extracts text from contract PDFs using:
//! - pdftotext (Poppler) for direct PDF text extraction
//! - pdftoppm + Tesseract OCR for pages with sparse or missing text
//!
//! A page whose direct extraction yields fewer than the configured
//! minimum of non-whitespace-stripped characters is treated as scanned
//! and re-read through OCR, one page at a time.

mod extractor;

pub use extractor::{ExtractionError, TextExtractor, OCR_FAILED_MARKER};

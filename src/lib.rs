//! Contract PDF triage and structured field extraction.
//!
//! The pipeline runs per document: scan for important pages, reduce the
//! PDF to those pages, submit the reduced PDF to a generative model for
//! field extraction, and post-process the output into a CSV row.

pub mod cli;
pub mod config;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod postprocess;
pub mod reduce;
pub mod scan;
pub mod schema;
pub mod sink;

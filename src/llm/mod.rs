//! Generative-model client for structured field extraction.
//!
//! Submits the reduced contract PDF (inline base64 payload) together
//! with a schema-derived instruction to the Gemini API in one call.
//! Requires GEMINI_API_KEY in the environment.

mod client;

pub use client::{build_extraction_prompt, GeminiClient, LlmConfig, LlmError};

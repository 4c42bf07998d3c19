//! Gemini API client for contract field extraction.

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::schema::ExtractionSchema;

/// Configuration for the extraction model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model to use (default: gemini-1.5-flash).
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature (kept low for extraction).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in the response.
    #[serde(default = "default_max_tokens")]
    pub max_output_tokens: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Errors that can occur during model extraction.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/")]
    MissingApiKey,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    message: String,
}

/// Build the field-extraction instruction from a schema.
///
/// Enumerates every field with its description and ends with the
/// directive that the response must be a JSON object keyed exactly by
/// the field names.
pub fn build_extraction_prompt(schema: &ExtractionSchema) -> String {
    let mut prompt =
        String::from("From the provided contract PDF, extract the following information:\n");
    for field in schema.fields() {
        if field.description.is_empty() {
            prompt.push_str(&format!("- {}\n", field.name));
        } else {
            prompt.push_str(&format!("- {} ({})\n", field.name, field.description));
        }
    }
    prompt.push_str(
        "Format the output as a JSON object with keys matching the field names exactly.",
    );
    prompt
}

/// Client for the Gemini generateContent API.
pub struct GeminiClient {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client, reading the API key from the environment.
    ///
    /// A missing key is a precondition failure: the caller should abort
    /// the run before any scanning work is done.
    pub fn from_env(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Self::new(config, api_key)
    }

    pub fn new(config: LlmConfig, api_key: String) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Submit a reduced PDF plus the extraction prompt in one call and
    /// return the model's raw text output.
    pub async fn extract_fields(
        &self,
        pdf_path: &Path,
        schema: &ExtractionSchema,
    ) -> Result<String, LlmError> {
        let pdf_bytes = std::fs::read(pdf_path)?;
        let pdf_base64 = base64::engine::general_purpose::STANDARD.encode(&pdf_bytes);
        let prompt = build_extraction_prompt(schema);

        debug!(
            "Sending {} ({} bytes) to {}",
            pdf_path.display(),
            pdf_bytes.len(),
            self.config.model
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text { text: prompt },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: "application/pdf".to_string(),
                            data: pdf_base64,
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.config.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(error) = gemini_response.error {
            return Err(LlmError::Api(error.message));
        }

        gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| LlmError::Parse("model returned no candidates".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_enumerates_fields() {
        let schema = ExtractionSchema::builtin();
        let prompt = build_extraction_prompt(&schema);

        assert!(prompt.starts_with("From the provided contract PDF"));
        for field in schema.fields() {
            assert!(prompt.contains(&format!("- {}", field.name)));
        }
        assert!(prompt.contains("Project Duration (Duration of the project from Schedule J"));
        assert!(prompt.ends_with("keys matching the field names exactly."));
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = GeminiClient::new(LlmConfig::default(), String::new());
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "gemini-1.5-flash");
        assert!(config.temperature < 0.5);
        assert_eq!(config.timeout_secs, 300);
    }
}

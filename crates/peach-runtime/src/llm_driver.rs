//! [`OllamaGenerator`] – the text-generation collaborator.
//!
//! Talks to a locally-running [Ollama](https://ollama.com) server over its
//! `/api/generate` endpoint (`http://localhost:11434`).  Every request is
//! bounded by the client timeout; a slow or absent model surfaces as a
//! [`GenerationError`] and the memory core carries on without the text.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use peach_runtime::llm_driver::OllamaGenerator;
//!
//! let generator = OllamaGenerator::new("http://localhost:11434", "llama3", Duration::from_secs(20))
//!     .expect("http client");
//!
//! // Requires a running Ollama instance – skipped in unit tests.
//! // let tags = generator.complete("Tags for: a rainy walk home").unwrap();
//! ```

use std::time::Duration;

use peach_memory::collaborator::{GenerationError, TextGenerator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Request timeout used when the caller has no preference.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from generator operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be used.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Http(e) if e.is_timeout() => GenerationError::Timeout,
            LlmError::Http(e) => GenerationError::Unavailable(e.to_string()),
            LlmError::BadResponse(msg) => GenerationError::BadResponse(msg),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// OllamaGenerator
// ─────────────────────────────────────────────────────────────────────────────

/// A blocking client for Ollama's single-prompt generation endpoint.
///
/// Construct once and share behind an `Arc`; the underlying connection pool
/// is reused across requests.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaGenerator {
    /// Create a generator for `model` at `base_url` with a per-request
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Send `prompt` and return the trimmed completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails or times out, or
    /// [`LlmError::BadResponse`] if the model answers with nothing.
    pub fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        let text = response.response.trim();
        if text.is_empty() {
            return Err(LlmError::BadResponse("empty response".into()));
        }
        Ok(text.to_string())
    }
}

impl TextGenerator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, chars = prompt.len(), "generation request");
        self.complete(prompt).map_err(GenerationError::from)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_disables_streaming() {
        let body = GenerateRequest {
            model: "llama3",
            prompt: "hello",
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["prompt"], "hello");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn response_ignores_extra_fields() {
        let raw = r#"{"model":"llama3","response":" rain, home ","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response, " rain, home ");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let generator =
            OllamaGenerator::new("http://localhost:11434/", "llama3", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:11434/api/generate");
        assert_eq!(generator.model(), "llama3");
    }

    #[test]
    fn bad_response_maps_to_generation_error() {
        let err: GenerationError = LlmError::BadResponse("empty response".into()).into();
        assert!(matches!(err, GenerationError::BadResponse(_)));
    }

    #[test]
    fn unreachable_server_is_an_error_not_a_panic() {
        // Port 9 (discard) is closed on test hosts; the request fails fast.
        let generator =
            OllamaGenerator::new("http://127.0.0.1:9", "llama3", Duration::from_millis(500))
                .unwrap();
        let err = generator.generate("anything").unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unavailable(_) | GenerationError::Timeout
        ));
    }
}

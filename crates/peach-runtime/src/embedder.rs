//! [`OllamaEmbedder`] – remote sentence embeddings over `/api/embeddings`.
//!
//! A drop-in [`Embedder`] for the semantic index.  Requests are bounded by
//! the client timeout so a stalled model never blocks ingestion for long;
//! failures surface as [`EmbedError`] and are reported by the index.

use std::time::Duration;

use peach_memory::semantic::{EmbedError, Embedder};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Blocking client for an Ollama embedding model.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(http_error)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::Empty);
        }
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let response: EmbeddingResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?
            .json()
            .map_err(http_error)?;

        if response.embedding.is_empty() {
            return Err(EmbedError::DimensionMismatch);
        }
        Ok(response.embedding)
    }
}

fn http_error(err: reqwest::Error) -> EmbedError {
    if err.is_timeout() {
        EmbedError::Timeout
    } else {
        EmbedError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let body = EmbeddingRequest {
            model: "nomic-embed-text",
            prompt: "rain on the window",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"model":"nomic-embed-text","prompt":"rain on the window"}"#);
    }

    #[test]
    fn response_parses_vector() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"embedding":[0.5,-0.25,1.0]}"#).unwrap();
        assert_eq!(parsed.embedding, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn blank_text_is_rejected_locally() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:9", "nomic-embed-text", Duration::from_secs(1))
                .unwrap();
        assert!(matches!(embedder.embed("   "), Err(EmbedError::Empty)));
    }

    #[test]
    fn unreachable_server_reports_backend_error() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:9/", "nomic-embed-text", Duration::from_millis(500))
                .unwrap();
        assert_eq!(embedder.endpoint(), "http://127.0.0.1:9/api/embeddings");
        assert!(matches!(
            embedder.embed("rain on the window"),
            Err(EmbedError::Backend(_) | EmbedError::Timeout)
        ));
    }
}

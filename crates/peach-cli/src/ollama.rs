//! Ollama auto-discovery helpers.
//!
//! Pings the configured server and, if responsive, fetches the list of
//! locally downloaded models from the `/api/tags` endpoint.

use std::time::Duration;

use serde::Deserialize;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the Ollama server and return the list of available models.
pub fn fetch_models(base_url: &str, timeout: Duration) -> Result<Vec<OllamaModel>, reqwest::Error> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
    let tags: TagsResponse = client.get(&url).send()?.error_for_status()?.json()?;
    Ok(tags.models)
}

/// Whether `model` (with or without a `:tag` suffix) is installed.
pub fn has_model(models: &[OllamaModel], model: &str) -> bool {
    models
        .iter()
        .any(|m| m.name == model || m.name.split(':').next() == Some(model))
}

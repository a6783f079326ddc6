//! Seam to an external text-generation service.
//!
//! The memory core only ever asks for two things: extra tags for recent
//! records, and a spoken-aloud reflection.  Both are optional; any failure
//! is logged upstream and the core carries on without the text.

use thiserror::Error;

/// Errors a [`TextGenerator`] may report.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),
    #[error("Generation timed out")]
    Timeout,
    #[error("Malformed generator response: {0}")]
    BadResponse(String),
}

/// Prompt in, text out.  Implementations must bound their own latency.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Prompt asking for thematic tags for one memory.
pub fn tag_prompt(content: &str) -> String {
    format!(
        "Extract 3-5 emotional, symbolic, or thematic tags from the following memory:\n\
         '{content}'\nReply with a comma-separated list only.\nTags:"
    )
}

/// Parse a comma-separated tag reply into lower-case, trimmed tags.
pub fn parse_tags(response: &str) -> Vec<String> {
    response
        .split([',', '\n'])
        .map(|t| {
            t.trim()
                .trim_start_matches(['-', '*', '#'])
                .trim_end_matches('.')
                .trim()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty() && t.len() <= 32)
        .collect()
}

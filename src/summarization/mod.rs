//! Summarization capability and the providers shipped with papersum.
//!
//! The hierarchical summarizer only sees [`SummarizationClient`]: a batch of texts in, one
//! summary per text out. Concrete backends are an Ollama HTTP client and a deterministic
//! extractive client that needs no model runtime. Models are resolved through the
//! [`registry::ModelRegistry`].

mod extractive;
mod ollama;
pub mod registry;

pub use extractive::{ExtractiveSummarizationClient, extractive_summary};
pub use ollama::OllamaSummarizationClient;
pub use registry::{DefaultModelFactory, LoadedModel, ModelFactory, ModelLoadError, ModelRegistry};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced while generating summaries.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Provider was unreachable or refused the request.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Length bounds, in words, requested for a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryBounds {
    /// Upper bound.
    pub max_length: usize,
    /// Lower bound.
    pub min_length: usize,
}

impl SummaryBounds {
    /// Build bounds, lifting `max_length` to at least `min_length`.
    pub fn new(max_length: usize, min_length: usize) -> Self {
        Self {
            max_length: max_length.max(min_length),
            min_length,
        }
    }
}

/// Interface implemented by summarization backends.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Summarize every text in `texts`, returning exactly one summary per input in order.
    async fn summarize(
        &self,
        texts: &[String],
        bounds: SummaryBounds,
    ) -> Result<Vec<String>, SummarizationClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_never_invert() {
        let bounds = SummaryBounds::new(10, 30);
        assert_eq!(bounds.max_length, 30);
        assert_eq!(bounds.min_length, 30);
        assert_eq!(SummaryBounds::new(130, 30).max_length, 130);
    }
}

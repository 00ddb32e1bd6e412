//! Ollama-backed abstractive summarization.
//!
//! Ollama has no batch endpoint, so a batch is served by sequential `/api/generate` calls on
//! one pooled HTTP client.

use super::{SummarizationClient, SummarizationClientError, SummaryBounds};
use crate::config::Device;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Default Ollama endpoint.
pub(crate) const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Summarization client for a single Ollama model.
pub struct OllamaSummarizationClient {
    http: Client,
    base_url: String,
    model: String,
    device: Device,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaSummarizationClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        device: Device,
    ) -> Result<Self, SummarizationClientError> {
        let http = Client::builder()
            .user_agent("papersum/summary")
            .build()
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            device,
        })
    }

    /// Model identifier this client generates with.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url.trim_end_matches('/'))
    }

    /// Confirm the model is installed in the Ollama runtime.
    ///
    /// Returns `Ok(false)` when Ollama answers 404 for the model.
    pub async fn model_available(&self) -> Result<bool, SummarizationClientError> {
        let response = self
            .http
            .post(self.endpoint("show"))
            .json(&json!({ "model": self.model }))
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SummarizationClientError::GenerationFailed(format!(
                    "Ollama returned {status} for model lookup: {body}"
                )))
            }
        }
    }

    fn options(&self, bounds: SummaryBounds) -> Value {
        let mut options = Map::new();
        // Lower temperature for deterministic summaries.
        options.insert("temperature".into(), json!(0.1));
        // Words run a little over one token each; leave headroom for the upper bound.
        options.insert("num_predict".into(), json!(bounds.max_length.saturating_mul(2)));
        match self.device {
            Device::Cpu => {
                options.insert("num_gpu".into(), json!(0));
            }
            Device::Gpu(index) => {
                options.insert("main_gpu".into(), json!(index));
            }
        }
        Value::Object(options)
    }

    async fn generate(
        &self,
        text: &str,
        bounds: SummaryBounds,
    ) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": build_prompt(text, bounds),
            "stream": false,
            "options": self.options(bounds),
        });

        let response = self
            .http
            .post(self.endpoint("generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SummarizationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint("generate")
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(SummarizationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn summarize(
        &self,
        texts: &[String],
        bounds: SummaryBounds,
    ) -> Result<Vec<String>, SummarizationClientError> {
        let mut summaries = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                summaries.push(String::new());
                continue;
            }
            summaries.push(self.generate(text, bounds).await?);
        }
        tracing::debug!(
            model = %self.model,
            batch = texts.len(),
            "Generated summaries"
        );
        Ok(summaries)
    }
}

fn build_prompt(text: &str, bounds: SummaryBounds) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "System: You summarize passages from research papers into concise, factual prose. Prefer neutral tone. Avoid speculation. Use between {} and {} words. Output a single paragraph.\n\n",
        bounds.min_length, bounds.max_length
    ));
    prompt.push_str("Summarize the following passage:\n\n");
    prompt.push_str(text.trim());
    prompt.push('\n');
    prompt
}

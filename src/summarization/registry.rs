//! Process-wide cache of loaded summarization models.
//!
//! Loading a model is expensive (tokenizer tables, a runtime round-trip), so each model id is
//! constructed at most once and shared as `Arc<LoadedModel>`.

use super::ollama::DEFAULT_OLLAMA_URL;
use super::{
    ExtractiveSummarizationClient, OllamaSummarizationClient, SummarizationClient,
    SummarizationClientError,
};
use crate::config::{Config, Device, SummarizationProvider};
use crate::tokenizer::{Tokenizer, tokenizer_for_model};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Failures raised while loading a model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The provider does not know the requested model.
    #[error("Model not found: {0}")]
    NotFound(String),
    /// The provider failed while loading the model.
    #[error("Failed to load model {model}: {message}")]
    Provider {
        /// Requested model identifier.
        model: String,
        /// Provider diagnostic.
        message: String,
    },
}

/// A tokenizer and summarization capability pair bound to one model.
pub struct LoadedModel {
    /// Identifier the model was loaded under.
    pub model_id: String,
    /// Device requested on first load.
    pub device: Device,
    /// Tokenizer used to chunk text for this model.
    pub tokenizer: Arc<dyn Tokenizer>,
    /// Capability that generates summaries.
    pub client: Arc<dyn SummarizationClient>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Builds models on a registry cache miss.
#[async_trait]
pub trait ModelFactory: Send + Sync {
    /// Construct the tokenizer and capability for `model_id`.
    async fn load(&self, model_id: &str, device: Device) -> Result<LoadedModel, ModelLoadError>;
}

/// Factory that builds models for the configured provider.
#[derive(Debug, Clone)]
pub struct DefaultModelFactory {
    provider: SummarizationProvider,
    ollama_url: String,
}

impl DefaultModelFactory {
    /// Create a factory for a provider, with an optional Ollama base URL.
    pub fn new(provider: SummarizationProvider, ollama_url: Option<String>) -> Self {
        Self {
            provider,
            ollama_url: ollama_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        }
    }

    /// Create a factory from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.summarization_provider, config.ollama_url.clone())
    }

    async fn client_for(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Arc<dyn SummarizationClient>, ModelLoadError> {
        match self.provider {
            SummarizationProvider::Extractive => Ok(Arc::new(ExtractiveSummarizationClient::new())),
            SummarizationProvider::Ollama => {
                let provider_error = |error: SummarizationClientError| {
                    ModelLoadError::Provider {
                        model: model_id.to_string(),
                        message: error.to_string(),
                    }
                };
                let client = OllamaSummarizationClient::new(&self.ollama_url, model_id, device)
                    .map_err(provider_error)?;
                if !client.model_available().await.map_err(provider_error)? {
                    return Err(ModelLoadError::NotFound(model_id.to_string()));
                }
                Ok(Arc::new(client))
            }
        }
    }
}

#[async_trait]
impl ModelFactory for DefaultModelFactory {
    async fn load(&self, model_id: &str, device: Device) -> Result<LoadedModel, ModelLoadError> {
        let client = self.client_for(model_id, device).await?;

        let tokenizer_model = model_id.to_string();
        let tokenizer = tokio::task::spawn_blocking(move || tokenizer_for_model(&tokenizer_model))
            .await
            .map_err(|error| ModelLoadError::Provider {
                model: model_id.to_string(),
                message: format!("tokenizer construction panicked: {error}"),
            })?;

        Ok(LoadedModel {
            model_id: model_id.to_string(),
            device,
            tokenizer,
            client,
        })
    }
}

type ModelCell = Arc<OnceCell<Arc<LoadedModel>>>;

/// Keyed cache guaranteeing at most one construction per model id.
pub struct ModelRegistry {
    factory: Arc<dyn ModelFactory>,
    models: Mutex<HashMap<String, ModelCell>>,
}

impl ModelRegistry {
    /// Create an empty registry backed by `factory`.
    pub fn new(factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            factory,
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached model or load it.
    ///
    /// Concurrent callers for the same id wait on a single load. The device only matters for
    /// the first successful load of an id. A failed load is not cached and leaves no entry
    /// behind once its last waiter gives up.
    pub async fn get_or_load(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Arc<LoadedModel>, ModelLoadError> {
        let cell = {
            let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(models.entry(model_id.to_string()).or_default())
        };

        let loaded = cell
            .get_or_try_init(|| async {
                tracing::info!(model = model_id, device = ?device, "Loading summarization model");
                self.factory.load(model_id, device).await.map(Arc::new)
            })
            .await
            .map(Arc::clone);
        if loaded.is_err() {
            self.forget_failed(model_id, cell);
        }
        loaded
    }

    fn forget_failed(&self, model_id: &str, cell: ModelCell) {
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        // Another waiter still holding the cell will retry the load itself.
        let abandoned = models.get(model_id).is_some_and(|current| {
            Arc::ptr_eq(current, &cell) && !current.initialized() && Arc::strong_count(&cell) == 2
        });
        // Release our handle under the lock so the next waiter sees an exact count.
        drop(cell);
        if abandoned {
            models.remove(model_id);
            tracing::debug!(model = model_id, "Dropped registry entry after failed load");
        }
    }

    /// Return a model only if it has already been loaded.
    pub fn cached(&self, model_id: &str) -> Option<Arc<LoadedModel>> {
        let models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        models
            .get(model_id)
            .and_then(|cell| cell.get())
            .map(Arc::clone)
    }

    /// Number of successfully loaded models.
    pub fn len(&self) -> usize {
        let models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        models.values().filter(|cell| cell.initialized()).count()
    }

    /// Whether no model has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

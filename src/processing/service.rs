//! Hierarchical summarization and the end-to-end document pipeline.

use crate::{
    config::{Config, Device},
    extraction::{Document, ExtractionPipeline, ExtractionReport, TextSource, layout},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{ChunkWindow, chunk_with_window, determine_chunk_size},
        types::{BatchProgress, ChunkingError, DocumentSummary, ProcessingError},
    },
    summarization::{LoadedModel, ModelRegistry, SummaryBounds},
    tokenizer::Tokenizer,
};
use std::sync::Arc;

enum SummarizerState {
    Unloaded,
    Loaded(Arc<LoadedModel>),
}

/// Map/reduce summarizer over token chunks.
///
/// Starts unloaded; every summarization call fails with [`ProcessingError::ModelNotLoaded`]
/// until [`HierarchicalSummarizer::load_model`] succeeds.
pub struct HierarchicalSummarizer {
    registry: Arc<ModelRegistry>,
    state: SummarizerState,
}

impl HierarchicalSummarizer {
    /// Create an unloaded summarizer that resolves models through `registry`.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            state: SummarizerState::Unloaded,
        }
    }

    /// Load `model_id`, replacing the current model unless it is already loaded.
    pub async fn load_model(&mut self, model_id: &str, device: Device) -> Result<(), ProcessingError> {
        if self.model_id() == Some(model_id) {
            tracing::debug!(model = model_id, "Model already loaded");
            return Ok(());
        }
        let model = self.registry.get_or_load(model_id, device).await?;
        self.state = SummarizerState::Loaded(model);
        tracing::info!(model = model_id, device = ?device, "Summarization model ready");
        Ok(())
    }

    /// Identifier of the loaded model, if any.
    pub fn model_id(&self) -> Option<&str> {
        match &self.state {
            SummarizerState::Unloaded => None,
            SummarizerState::Loaded(model) => Some(&model.model_id),
        }
    }

    /// Tokenizer paired with the loaded model.
    pub fn tokenizer(&self) -> Result<Arc<dyn Tokenizer>, ProcessingError> {
        Ok(Arc::clone(&self.loaded()?.tokenizer))
    }

    fn loaded(&self) -> Result<&Arc<LoadedModel>, ProcessingError> {
        match &self.state {
            SummarizerState::Loaded(model) => Ok(model),
            SummarizerState::Unloaded => Err(ProcessingError::ModelNotLoaded),
        }
    }

    /// Summarize each chunk, submitting at most `batch_size` chunks per capability call.
    ///
    /// Returns exactly one trimmed summary per chunk, in input order.
    pub async fn summarize_chunks(
        &self,
        chunks: &[String],
        batch_size: usize,
        max_length: usize,
        min_length: usize,
    ) -> Result<Vec<String>, ProcessingError> {
        self.summarize_chunks_with_progress(chunks, batch_size, max_length, min_length, |_| {})
            .await
    }

    /// Like [`Self::summarize_chunks`], invoking `on_progress` after every batch.
    pub async fn summarize_chunks_with_progress<F>(
        &self,
        chunks: &[String],
        batch_size: usize,
        max_length: usize,
        min_length: usize,
        mut on_progress: F,
    ) -> Result<Vec<String>, ProcessingError>
    where
        F: FnMut(BatchProgress) + Send,
    {
        let model = self.loaded()?;
        let bounds = SummaryBounds::new(max_length, min_length);
        let batch_size = batch_size.max(1);
        let total = chunks.len();
        let mut summaries = Vec::with_capacity(total);

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            let results = model.client.summarize(batch, bounds).await?;
            if results.len() != batch.len() {
                return Err(ProcessingError::BatchMismatch {
                    expected: batch.len(),
                    actual: results.len(),
                });
            }
            summaries.extend(results.into_iter().map(|summary| summary.trim().to_string()));
            tracing::debug!(
                batch = batch_index,
                completed = summaries.len(),
                total,
                "Summarized batch"
            );
            on_progress(BatchProgress {
                batch_index,
                completed: summaries.len(),
                total,
            });
        }

        Ok(summaries)
    }

    /// Reduce chunk summaries into one final summary.
    ///
    /// Input that is already at most `final_min_length` words is returned as joined, without a
    /// capability call.
    pub async fn aggregate_summaries(
        &self,
        summaries: &[String],
        final_max_length: usize,
        final_min_length: usize,
    ) -> Result<String, ProcessingError> {
        if summaries.is_empty() {
            return Ok(String::new());
        }
        let model = self.loaded()?;

        let joined = summaries.join("\n\n");
        let words = joined.split_whitespace().count();
        if words <= final_min_length {
            tracing::debug!(words, final_min_length, "Chunk summaries already short; skipping reduce");
            return Ok(joined.trim().to_string());
        }

        let bounds = SummaryBounds::new(final_max_length, final_min_length);
        let mut results = model.client.summarize(&[joined], bounds).await?;
        if results.len() != 1 {
            return Err(ProcessingError::BatchMismatch {
                expected: 1,
                actual: results.len(),
            });
        }
        Ok(results.remove(0).trim().to_string())
    }
}

/// Tunables for one [`DocumentPipeline`] run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model used for tokenization and summarization.
    pub model: String,
    /// Device hint for the model.
    pub device: Device,
    /// Explicit chunk size; derived from the model when `None`.
    pub chunk_size: Option<usize>,
    /// Tokens shared by adjacent chunks.
    pub chunk_overlap: usize,
    /// Chunks per summarization call.
    pub batch_size: usize,
    /// Word bounds for each chunk summary.
    pub chunk_bounds: SummaryBounds,
    /// Word bounds for the final summary.
    pub final_bounds: SummaryBounds,
    /// Collapse whitespace and cut the references section before chunking.
    pub clean_text: bool,
}

impl PipelineSettings {
    /// Derive settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.summarization_model.clone(),
            device: config.device,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            batch_size: config.summary_batch_size,
            chunk_bounds: SummaryBounds::new(
                config.chunk_summary_max_length,
                config.chunk_summary_min_length,
            ),
            final_bounds: SummaryBounds::new(
                config.final_summary_max_length,
                config.final_summary_min_length,
            ),
            clean_text: config.clean_extracted_text,
        }
    }

    /// Effective chunk size for the configured model.
    pub fn resolved_chunk_size(&self) -> usize {
        determine_chunk_size(self.chunk_size, &self.model)
    }

    /// Validated token window for these settings.
    pub fn window(&self) -> Result<ChunkWindow, ChunkingError> {
        ChunkWindow::new(
            to_i64(self.resolved_chunk_size()),
            to_i64(self.chunk_overlap),
        )
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Extract, chunk, map and reduce a whole document.
pub struct DocumentPipeline {
    extraction: Arc<ExtractionPipeline>,
    summarizer: HierarchicalSummarizer,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

impl DocumentPipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        extraction: Arc<ExtractionPipeline>,
        registry: Arc<ModelRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extraction,
            summarizer: HierarchicalSummarizer::new(registry),
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Settings this pipeline runs with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Current metrics counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run extraction on the blocking pool.
    pub async fn extract(&self, document: Document) -> Result<ExtractionReport, ProcessingError> {
        let extraction = Arc::clone(&self.extraction);
        let mut report =
            tokio::task::spawn_blocking(move || extraction.extract_with_report(&document)).await??;
        if self.settings.clean_text && !report.text.is_empty() {
            report.text = layout::clean_text(&report.text);
        }
        Ok(report)
    }

    /// Split text into chunks with the configured model's tokenizer.
    ///
    /// An invalid window is rejected before the model is loaded.
    pub async fn chunk(&mut self, text: &str) -> Result<Vec<String>, ProcessingError> {
        let window = self.settings.window()?;
        self.chunk_in(text, window).await
    }

    async fn chunk_in(
        &mut self,
        text: &str,
        window: ChunkWindow,
    ) -> Result<Vec<String>, ProcessingError> {
        self.ensure_model().await?;
        let tokenizer = self.summarizer.tokenizer()?;
        Ok(chunk_with_window(text, tokenizer.as_ref(), window))
    }

    /// Summarize a document end to end.
    ///
    /// A document without extractable text yields an empty summary; the only fatal extraction
    /// outcome is an unavailable OCR backend. Chunk settings are checked before extraction.
    pub async fn summarize_document<F>(
        &mut self,
        document: Document,
        on_progress: F,
    ) -> Result<DocumentSummary, ProcessingError>
    where
        F: FnMut(BatchProgress) + Send,
    {
        let window = self.settings.window()?;
        let label = document.label();
        tracing::info!(document = %label, "Processing document");
        let extraction = self.extract(document).await?;
        let used_ocr = extraction.source == TextSource::Ocr;

        if extraction.text.is_empty() {
            tracing::warn!(document = %label, "No text could be extracted");
            self.metrics.record_document(0, used_ocr);
            return Ok(DocumentSummary {
                extraction,
                chunk_count: 0,
                chunk_summaries: Vec::new(),
                final_summary: String::new(),
            });
        }

        let chunks = self.chunk_in(&extraction.text, window).await?;
        let settings = &self.settings;
        let chunk_summaries = self
            .summarizer
            .summarize_chunks_with_progress(
                &chunks,
                settings.batch_size,
                settings.chunk_bounds.max_length,
                settings.chunk_bounds.min_length,
                on_progress,
            )
            .await?;
        let final_summary = self
            .summarizer
            .aggregate_summaries(
                &chunk_summaries,
                settings.final_bounds.max_length,
                settings.final_bounds.min_length,
            )
            .await?;

        self.metrics.record_document(chunks.len() as u64, used_ocr);
        tracing::info!(
            document = %label,
            chunks = chunks.len(),
            source = ?extraction.source,
            summary_words = final_summary.split_whitespace().count(),
            "Document summarized"
        );

        Ok(DocumentSummary {
            extraction,
            chunk_count: chunks.len(),
            chunk_summaries,
            final_summary,
        })
    }

    async fn ensure_model(&mut self) -> Result<(), ProcessingError> {
        let PipelineSettings { model, device, .. } = &self.settings;
        self.summarizer.load_model(model, *device).await
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

//! Core data types and error definitions for the processing pipeline.

use crate::extraction::{ExtractionError, ExtractionReport};
use crate::summarization::{ModelLoadError, SummarizationClientError};
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning text into token windows.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The window parameters cannot produce forward progress.
    #[error(
        "invalid chunk configuration: chunk_size={chunk_size}, overlap={overlap} (need chunk_size > 0 and 0 <= overlap < chunk_size)"
    )]
    InvalidChunkConfig {
        /// Requested window length in tokens.
        chunk_size: i64,
        /// Requested overlap in tokens.
        overlap: i64,
    },
}

/// Errors emitted by the summarization pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Summarization was requested before any model was loaded.
    #[error("No summarization model loaded; call load_model first")]
    ModelNotLoaded,
    /// Model resolution through the registry failed.
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    /// The summarization capability failed.
    #[error("Summarization failed: {0}")]
    Summarization(#[from] SummarizationClientError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Text extraction failed fatally.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The capability returned a different number of summaries than it was given texts.
    #[error("Summarizer returned {actual} summaries for a batch of {expected}")]
    BatchMismatch {
        /// Texts submitted in the batch.
        expected: usize,
        /// Summaries returned.
        actual: usize,
    },
    /// A blocking extraction task did not complete.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Progress notification emitted after every summarized batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Zero-based index of the batch that just finished.
    pub batch_index: usize,
    /// Chunks summarized so far.
    pub completed: usize,
    /// Total chunks in the run.
    pub total: usize,
}

/// Everything produced for one document by [`crate::processing::DocumentPipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Extraction outcome, including the text that was chunked.
    pub extraction: ExtractionReport,
    /// Number of chunks produced.
    pub chunk_count: usize,
    /// One summary per chunk, in document order.
    pub chunk_summaries: Vec<String>,
    /// Reduced summary of the whole document.
    pub final_summary: String,
}

//! Document processing pipeline: chunking, map/reduce summarization, and orchestration.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::{ChunkWindow, chunk_text, chunk_with_window, determine_chunk_size};
pub use service::{DocumentPipeline, HierarchicalSummarizer, PipelineSettings};
pub use types::{BatchProgress, ChunkingError, DocumentSummary, ProcessingError};

//! Token-window chunking and chunk-size heuristics.
//!
//! Text is encoded once, then cut into fixed windows of `chunk_size` tokens that advance by
//! `chunk_size - overlap`, so adjacent chunks share exactly `overlap` tokens. The last window is
//! clamped to the end of the sequence.

use super::types::ChunkingError;
use crate::tokenizer::Tokenizer;
use tiktoken_rs::model::get_context_size;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Validated window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkWindow {
    /// Validate raw parameters; fails unless `chunk_size > 0` and `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: i64, overlap: i64) -> Result<Self, ChunkingError> {
        if chunk_size <= 0 || overlap < 0 || overlap >= chunk_size {
            return Err(ChunkingError::InvalidChunkConfig {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size: chunk_size as usize,
            overlap: overlap as usize,
        })
    }

    /// Window length in tokens.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Tokens shared by adjacent windows.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between window starts; always at least one.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Split `text` into overlapping token windows.
///
/// Parameters are validated before any tokenization happens. Text that encodes to no tokens
/// yields an empty vector.
pub fn chunk_text(
    text: &str,
    tokenizer: &dyn Tokenizer,
    chunk_size: i64,
    overlap: i64,
) -> Result<Vec<String>, ChunkingError> {
    let window = ChunkWindow::new(chunk_size, overlap)?;
    Ok(chunk_with_window(text, tokenizer, window))
}

/// Split `text` with an already validated window.
pub fn chunk_with_window(text: &str, tokenizer: &dyn Tokenizer, window: ChunkWindow) -> Vec<String> {
    let tokens = tokenizer.encode(text);
    let total = tokens.len();
    if total == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(total.div_ceil(window.stride()));
    let mut start = 0;
    loop {
        let end = (start + window.chunk_size).min(total);
        chunks.push(tokenizer.decode(&tokens[start..end]).trim().to_string());
        if end == total {
            break;
        }
        start += window.stride();
    }

    tracing::debug!(
        tokens = total,
        chunks = chunks.len(),
        chunk_size = window.chunk_size,
        overlap = window.overlap,
        "Chunked text"
    );
    chunks
}

/// Determine the chunk size for a run, respecting an explicit override.
///
/// Precedence:
/// 1) An explicit override wins and is clamped at `>= 1`.
/// 2) Otherwise a quarter of the model's context window, clamped into `[256, 1024]`.
pub fn determine_chunk_size(override_size: Option<usize>, model: &str) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = summarization_context_window(model);
    (window / 4).clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

/// Estimate the context window of a summarization model, in tokens.
pub fn summarization_context_window(model: &str) -> usize {
    let normalized = model.trim().to_lowercase();
    let family = normalized.split(':').next().unwrap_or(&normalized);
    match family {
        value if value.starts_with("gpt-") || value.starts_with("o1") || value.starts_with("o3") => {
            get_context_size(value)
        }
        value if value.contains("bart") || value.contains("pegasus") => 1024,
        value if value.starts_with("t5") || value.contains("flan-t5") => 512,
        value if value.starts_with("llama3") || value.starts_with("gemma") => 8192,
        value if value.starts_with("mistral") || value.starts_with("qwen") => 32768,
        value if value.starts_with("phi") => 4096,
        _ => {
            tracing::trace!(model, "Using default summarization context window estimate");
            4096
        }
    }
}

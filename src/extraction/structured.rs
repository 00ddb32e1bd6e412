//! Structured extraction from the PDF text layer.

use super::{Document, ExtractError};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Backend that reads text directly from a PDF's text layer.
pub trait StructuredExtractor: Send + Sync {
    /// Extract text for every page in document order.
    ///
    /// The outer error means the document could not be opened at all; inner errors are
    /// per-page failures that the pipeline skips.
    fn extract_pages(
        &self,
        document: &Document,
    ) -> Result<Vec<Result<String, ExtractError>>, ExtractError>;
}

/// Pure-Rust structured extractor built on `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl StructuredExtractor for LopdfExtractor {
    fn extract_pages(
        &self,
        document: &Document,
    ) -> Result<Vec<Result<String, ExtractError>>, ExtractError> {
        tracing::info!(document = %document.label(), "Trying structured extraction");
        let bytes = document.read_bytes()?;
        let pdf = lopdf::Document::load_mem(&bytes)
            .map_err(|error| ExtractError::Open(error.to_string()))?;

        let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
        tracing::debug!(pages = page_numbers.len(), "Loaded PDF page tree");

        let pages = page_numbers
            .iter()
            .enumerate()
            .map(|(index, number)| {
                // lopdf panics on some malformed content streams.
                match catch_unwind(AssertUnwindSafe(|| pdf.extract_text(&[*number]))) {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(error)) => Err(ExtractError::Page {
                        page: index,
                        message: error.to_string(),
                    }),
                    Err(_) => Err(ExtractError::Page {
                        page: index,
                        message: "text extraction panicked".into(),
                    }),
                }
            })
            .collect();
        Ok(pages)
    }
}

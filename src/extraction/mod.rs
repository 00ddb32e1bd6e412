//! Text extraction with a deterministic fallback order.
//!
//! 1. Structured extraction straight from the PDF text layer.
//! 2. Layout repair when the structured text is suspiciously small.
//! 3. OCR over rasterized pages when the text is still below the threshold.
//!
//! Each stage only replaces the working text when its candidate is strictly longer. Stage
//! failures degrade to "produced nothing"; the only error surfaced to callers is
//! [`ExtractionError::OcrUnavailable`], raised when OCR is needed but cannot run at all.

pub mod layout;
mod ocr;
mod render;
mod structured;

pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use render::{PageRenderer, PageSource, PdftoppmRenderer};
pub use structured::{LopdfExtractor, StructuredExtractor};

use crate::config::Config;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// Default minimum number of characters before OCR is skipped.
pub const DEFAULT_OCR_THRESHOLD_CHARS: usize = 200;

/// Rasterization scale applied before OCR (2× the PDF's 72 dpi user space).
pub const OCR_ZOOM: f32 = 2.0;

/// A single PDF, either on disk or in memory.
#[derive(Debug, Clone)]
pub enum Document {
    /// PDF stored at a filesystem path.
    Path(PathBuf),
    /// PDF held in memory, e.g. an upload.
    Bytes(Vec<u8>),
}

impl Document {
    /// Reference a PDF on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Wrap an in-memory PDF.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Load the raw PDF bytes, borrowing when they are already in memory.
    pub fn read_bytes(&self) -> Result<Cow<'_, [u8]>, ExtractError> {
        match self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|error| ExtractError::Open(format!("{}: {error}", path.display()))),
        }
    }

    /// Short human-readable label used in logs.
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

/// Stage-internal failures. These never reach callers except as [`ExtractionError`].
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document could not be read or parsed.
    #[error("failed to open document: {0}")]
    Open(String),
    /// A single page failed; other pages are unaffected.
    #[error("page {page} failed: {message}")]
    Page {
        /// Zero-based page index.
        page: usize,
        /// Backend diagnostic.
        message: String,
    },
    /// The backend itself cannot run (missing binary, broken installation).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Fatal extraction errors surfaced to callers.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// OCR was the only remaining recovery path and its backend cannot run.
    #[error("OCR is required but unavailable: {0}")]
    OcrUnavailable(String),
}

/// Which stage produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// No stage produced any text.
    Empty,
    /// Text came straight from the PDF text layer.
    Structured,
    /// The layout heuristic produced a longer reflow of the structured text.
    LayoutRepaired,
    /// Text came from optical character recognition.
    Ocr,
}

/// Outcome of a full extraction run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExtractionReport {
    /// Final extracted text, trimmed.
    pub text: String,
    /// Stage that produced `text`.
    pub source: TextSource,
    /// Character count produced by structured extraction alone.
    pub structured_chars: usize,
    /// Whether the OCR stage ran.
    pub ocr_attempted: bool,
}

#[derive(Debug)]
struct Candidate {
    text: String,
    source: TextSource,
}

enum Stage {
    Structured,
    LayoutRepair(Candidate),
    Ocr(Candidate),
    Done(Candidate),
}

/// Orchestrates structured extraction, layout repair and OCR.
pub struct ExtractionPipeline {
    structured: Box<dyn StructuredExtractor>,
    renderer: Box<dyn PageRenderer>,
    ocr: Box<dyn OcrEngine>,
    ocr_threshold_chars: usize,
}

impl ExtractionPipeline {
    /// Assemble a pipeline from explicit backends with the default OCR threshold.
    pub fn new(
        structured: Box<dyn StructuredExtractor>,
        renderer: Box<dyn PageRenderer>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        Self {
            structured,
            renderer,
            ocr,
            ocr_threshold_chars: DEFAULT_OCR_THRESHOLD_CHARS,
        }
    }

    /// Build the default lopdf → pdftoppm → tesseract pipeline from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Box::new(LopdfExtractor::new()),
            Box::new(renderer_from_config(config)),
            Box::new(TesseractOcr::new(
                config.tesseract_cmd.clone(),
                config.ocr_language.clone(),
            )),
        )
        .with_ocr_threshold(config.ocr_threshold_chars)
    }

    /// Override the OCR trigger threshold (characters).
    pub fn with_ocr_threshold(mut self, ocr_threshold_chars: usize) -> Self {
        self.ocr_threshold_chars = ocr_threshold_chars;
        self
    }

    /// Current OCR trigger threshold.
    pub fn ocr_threshold_chars(&self) -> usize {
        self.ocr_threshold_chars
    }

    /// Extract plain text from a document.
    pub fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        self.extract_with_report(document).map(|report| report.text)
    }

    /// Extract plain text and report which stage produced it.
    pub fn extract_with_report(
        &self,
        document: &Document,
    ) -> Result<ExtractionReport, ExtractionError> {
        let mut structured_chars = 0;
        let mut ocr_attempted = false;
        let mut stage = Stage::Structured;

        loop {
            stage = match stage {
                Stage::Structured => {
                    let text = self.structured_text(document);
                    structured_chars = char_len(&text);
                    tracing::info!(chars = structured_chars, "Structured extraction finished");
                    Stage::LayoutRepair(Candidate {
                        text,
                        source: TextSource::Structured,
                    })
                }
                Stage::LayoutRepair(current) => {
                    let length = char_len(&current.text);
                    if length > 0 && length < self.ocr_threshold_chars.saturating_mul(2) {
                        tracing::info!(
                            chars = length,
                            "Extraction produced small text; applying layout heuristics"
                        );
                        let repaired = Candidate {
                            text: layout::normalize(&current.text),
                            source: TextSource::LayoutRepaired,
                        };
                        Stage::Ocr(prefer_longer(current, repaired))
                    } else {
                        Stage::Ocr(current)
                    }
                }
                Stage::Ocr(current) => {
                    let length = char_len(&current.text);
                    if current.text.is_empty() || length < self.ocr_threshold_chars {
                        tracing::info!(chars = length, "Falling back to OCR");
                        ocr_attempted = true;
                        let recognized = Candidate {
                            text: self.ocr_text(document)?,
                            source: TextSource::Ocr,
                        };
                        Stage::Done(prefer_longer(current, recognized))
                    } else {
                        Stage::Done(current)
                    }
                }
                Stage::Done(current) => {
                    let text = current.text.trim().to_string();
                    let source = if text.is_empty() {
                        TextSource::Empty
                    } else {
                        current.source
                    };
                    tracing::info!(
                        chars = char_len(&text),
                        source = ?source,
                        document = %document.label(),
                        "Final extracted text"
                    );
                    return Ok(ExtractionReport {
                        text,
                        source,
                        structured_chars,
                        ocr_attempted,
                    });
                }
            };
        }
    }

    fn structured_text(&self, document: &Document) -> String {
        let pages = match self.structured.extract_pages(document) {
            Ok(pages) => pages,
            Err(error) => {
                tracing::warn!(error = %error, "Structured extraction failed");
                return String::new();
            }
        };

        let mut parts = Vec::with_capacity(pages.len());
        for (index, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) if !text.trim().is_empty() => parts.push(text),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(page = index, error = %error, "Structured page extraction failed");
                }
            }
        }
        parts.join("\n\n").trim().to_string()
    }

    fn ocr_text(&self, document: &Document) -> Result<String, ExtractionError> {
        let source = match self.renderer.open(document) {
            Ok(source) => source,
            Err(ExtractError::Unavailable(message)) => {
                tracing::error!(error = %message, "Page renderer unavailable");
                return Err(ExtractionError::OcrUnavailable(message));
            }
            Err(error) => {
                tracing::warn!(error = %error, "OCR fallback could not open document");
                return Ok(String::new());
            }
        };

        let page_count = source.page_count();
        let mut parts = Vec::with_capacity(page_count.unwrap_or_default());
        let mut next_page = 0;
        while page_count.is_none_or(|count| next_page < count) {
            let page = next_page;
            next_page += 1;
            let image = match source.render_page(page, OCR_ZOOM) {
                Ok(image) => image,
                Err(ExtractError::Unavailable(message)) => {
                    return Err(ExtractionError::OcrUnavailable(message));
                }
                Err(error) if page_count.is_none() => {
                    tracing::debug!(page, error = %error, "Stopping at first unrenderable page");
                    break;
                }
                Err(error) => {
                    tracing::warn!(page, error = %error, "Page rendering failed; skipping");
                    continue;
                }
            };
            match self.ocr.recognize(&image) {
                Ok(text) => {
                    tracing::debug!(page, chars = char_len(&text), "OCR page finished");
                    parts.push(text);
                }
                Err(OcrError::Unavailable(message)) => {
                    tracing::error!(error = %message, "OCR engine unavailable");
                    return Err(ExtractionError::OcrUnavailable(message));
                }
                Err(OcrError::Recognition(message)) => {
                    tracing::warn!(page, error = %message, "OCR recognition failed; skipping");
                }
            }
        }

        let combined = parts.join("\n\n").trim().to_string();
        tracing::info!(chars = char_len(&combined), pages = ?page_count, "OCR extracted text");
        Ok(combined)
    }
}

fn renderer_from_config(config: &Config) -> PdftoppmRenderer {
    let renderer = PdftoppmRenderer::new(config.pdftoppm_cmd.clone());
    match &config.pdfinfo_cmd {
        Some(pdfinfo) => renderer.with_pdfinfo(pdfinfo.clone()),
        None => renderer,
    }
}

/// Keep `current` unless `candidate` is strictly longer.
fn prefer_longer(current: Candidate, candidate: Candidate) -> Candidate {
    if char_len(&candidate.text) > char_len(&current.text) {
        tracing::debug!(
            from = ?current.source,
            to = ?candidate.source,
            "Replacing working text with longer candidate"
        );
        candidate
    } else {
        current
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

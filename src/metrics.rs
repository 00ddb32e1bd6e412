use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    chunks_summarized: AtomicU64,
    ocr_fallbacks: AtomicU64,
    empty_extractions: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of chunks summarized for it.
    pub fn record_document(&self, chunk_count: u64, used_ocr: bool) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_summarized
            .fetch_add(chunk_count, Ordering::Relaxed);
        if used_ocr {
            self.ocr_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if chunk_count == 0 {
            self.empty_extractions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_summarized: self.chunks_summarized.load(Ordering::Relaxed),
            ocr_fallbacks: self.ocr_fallbacks.load(Ordering::Relaxed),
            empty_extractions: self.empty_extractions.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that went through the full pipeline.
    pub documents_processed: u64,
    /// Total chunk count summarized across all documents.
    pub chunks_summarized: u64,
    /// Documents whose final text came from OCR.
    pub ocr_fallbacks: u64,
    /// Documents that produced no text at all.
    pub empty_extractions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(2, false);
        metrics.record_document(3, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.chunks_summarized, 5);
        assert_eq!(snapshot.ocr_fallbacks, 1);
        assert_eq!(snapshot.empty_extractions, 0);
    }

    #[test]
    fn empty_documents_are_counted() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(0, true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.empty_extractions, 1);
        assert_eq!(snapshot.chunks_summarized, 0);
    }
}

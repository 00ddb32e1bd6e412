use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::DynamicImage;
use papersum::config::Device;
use papersum::extraction::{
    Document, ExtractError, ExtractionError, ExtractionPipeline, OcrEngine, OcrError,
    PageRenderer, PageSource, StructuredExtractor, TextSource,
};
use papersum::processing::{
    BatchProgress, ChunkingError, DocumentPipeline, HierarchicalSummarizer, PipelineSettings,
    ProcessingError, chunk_text,
};
use papersum::summarization::{
    LoadedModel, ModelFactory, ModelLoadError, ModelRegistry, SummarizationClient,
    SummarizationClientError, SummaryBounds,
};
use papersum::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// Returns a fixed three-word summary per text and records batch sizes.
#[derive(Default)]
struct SpySummarizer {
    batches: Mutex<Vec<usize>>,
    bounds: Mutex<Vec<SummaryBounds>>,
}

impl SpySummarizer {
    fn calls(&self) -> usize {
        self.batches.lock().expect("lock").len()
    }
}

#[async_trait]
impl SummarizationClient for SpySummarizer {
    async fn summarize(
        &self,
        texts: &[String],
        bounds: SummaryBounds,
    ) -> Result<Vec<String>, SummarizationClientError> {
        self.batches.lock().expect("lock").push(texts.len());
        self.bounds.lock().expect("lock").push(bounds);
        Ok(texts.iter().map(|_| " key finding here ".to_string()).collect())
    }
}

/// Loses one summary from every batch.
struct LossySummarizer;

#[async_trait]
impl SummarizationClient for LossySummarizer {
    async fn summarize(
        &self,
        texts: &[String],
        _bounds: SummaryBounds,
    ) -> Result<Vec<String>, SummarizationClientError> {
        Ok(texts.iter().skip(1).cloned().collect())
    }
}

struct SpyFactory {
    client: Arc<dyn SummarizationClient>,
    loads: AtomicUsize,
}

impl SpyFactory {
    fn new(client: Arc<dyn SummarizationClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelFactory for SpyFactory {
    async fn load(&self, model_id: &str, device: Device) -> Result<LoadedModel, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedModel {
            model_id: model_id.to_string(),
            device,
            tokenizer: Arc::new(WhitespaceTokenizer::new()),
            client: Arc::clone(&self.client),
        })
    }
}

struct FixedText(String);

impl StructuredExtractor for FixedText {
    fn extract_pages(
        &self,
        _document: &Document,
    ) -> Result<Vec<Result<String, ExtractError>>, ExtractError> {
        Ok(vec![Ok(self.0.clone())])
    }
}

struct BlankRenderer;

struct BlankSource;

impl PageRenderer for BlankRenderer {
    fn open<'a>(
        &'a self,
        _document: &'a Document,
    ) -> Result<Box<dyn PageSource + 'a>, ExtractError> {
        Ok(Box::new(BlankSource))
    }
}

impl PageSource for BlankSource {
    fn page_count(&self) -> Option<usize> {
        Some(1)
    }

    fn render_page(&self, _page: usize, _zoom: f32) -> Result<DynamicImage, ExtractError> {
        Ok(DynamicImage::new_luma8(1, 1))
    }
}

struct Ocr(Result<String, ()>);

impl OcrEngine for Ocr {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        self.0
            .clone()
            .map_err(|()| OcrError::Unavailable("tesseract missing".into()))
    }
}

fn extraction(text: &str, ocr: Result<String, ()>) -> Arc<ExtractionPipeline> {
    Arc::new(
        ExtractionPipeline::new(
            Box::new(FixedText(text.to_string())),
            Box::new(BlankRenderer),
            Box::new(Ocr(ocr)),
        )
        .with_ocr_threshold(10),
    )
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        model: "spy-model".into(),
        device: Device::Cpu,
        chunk_size: Some(256),
        chunk_overlap: 32,
        batch_size: 4,
        chunk_bounds: SummaryBounds::new(40, 5),
        final_bounds: SummaryBounds::new(60, 10),
        clean_text: false,
    }
}

fn document() -> Document {
    Document::from_bytes(Vec::new())
}

#[tokio::test]
async fn summarizes_a_document_end_to_end() {
    let spy = Arc::new(SpySummarizer::default());
    let factory = SpyFactory::new(spy.clone());
    let registry = Arc::new(ModelRegistry::new(factory.clone()));
    let mut pipeline = DocumentPipeline::new(
        extraction(&"a ".repeat(1200), Err(())),
        registry,
        settings(),
    );

    let mut progress: Vec<BatchProgress> = Vec::new();
    let summary = pipeline
        .summarize_document(document(), |update| progress.push(update))
        .await
        .expect("summary");

    assert_eq!(summary.extraction.source, TextSource::Structured);
    assert_eq!(summary.chunk_count, 6);
    assert_eq!(summary.chunk_summaries.len(), 6);
    assert!(summary.chunk_summaries.iter().all(|s| s == "key finding here"));
    // 18 words exceed the final minimum of 10, so the reduce step runs once.
    assert_eq!(summary.final_summary, "key finding here");
    assert_eq!(*spy.batches.lock().expect("lock"), vec![4, 2, 1]);
    assert_eq!(
        spy.bounds.lock().expect("lock").last().copied(),
        Some(SummaryBounds::new(60, 10))
    );
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[1].completed, 6);
    assert_eq!(factory.loads.load(Ordering::SeqCst), 1);

    let metrics = pipeline.metrics_snapshot();
    assert_eq!(metrics.documents_processed, 1);
    assert_eq!(metrics.chunks_summarized, 6);
    assert_eq!(metrics.empty_extractions, 0);
}

#[tokio::test]
async fn short_documents_skip_the_reduce_call() {
    let spy = Arc::new(SpySummarizer::default());
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(spy.clone())));
    let mut settings = settings();
    settings.final_bounds = SummaryBounds::new(60, 50);
    let mut pipeline = DocumentPipeline::new(
        extraction("a short but sufficient abstract", Err(())),
        registry,
        settings,
    );

    let summary = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect("summary");

    assert_eq!(summary.chunk_count, 1);
    assert_eq!(summary.final_summary, "key finding here");
    assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn empty_document_yields_empty_summary_without_loading() {
    let spy = Arc::new(SpySummarizer::default());
    let factory = SpyFactory::new(spy.clone());
    let registry = Arc::new(ModelRegistry::new(factory.clone()));
    let mut pipeline = DocumentPipeline::new(extraction("", Ok(String::new())), registry, settings());

    let summary = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect("summary");

    assert_eq!(summary.extraction.source, TextSource::Empty);
    assert_eq!(summary.chunk_count, 0);
    assert!(summary.chunk_summaries.is_empty());
    assert_eq!(summary.final_summary, "");
    assert_eq!(spy.calls(), 0);
    assert_eq!(factory.loads.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.metrics_snapshot().empty_extractions, 1);
}

#[tokio::test]
async fn unavailable_ocr_is_fatal() {
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(Arc::new(
        SpySummarizer::default(),
    ))));
    let mut pipeline = DocumentPipeline::new(extraction("", Err(())), registry, settings());

    let error = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect_err("ocr unavailable");
    assert!(matches!(
        error,
        ProcessingError::Extraction(ExtractionError::OcrUnavailable(_))
    ));
}

#[tokio::test]
async fn ocr_text_is_summarized() {
    let spy = Arc::new(SpySummarizer::default());
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(spy.clone())));
    let mut pipeline = DocumentPipeline::new(
        extraction("", Ok("recognized scanned page text".into())),
        registry,
        settings(),
    );

    let summary = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect("summary");
    assert_eq!(summary.extraction.source, TextSource::Ocr);
    assert_eq!(summary.chunk_count, 1);
    assert_eq!(pipeline.metrics_snapshot().ocr_fallbacks, 1);
}

#[tokio::test]
async fn clean_text_drops_references_before_chunking() {
    let spy = Arc::new(SpySummarizer::default());
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(spy)));
    let mut settings = settings();
    settings.clean_text = true;
    let mut pipeline = DocumentPipeline::new(
        extraction("Body   text of the paper.\nReferences\n[1] A. Author", Err(())),
        registry,
        settings,
    );

    let summary = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect("summary");
    assert_eq!(summary.extraction.text, "Body text of the paper.");
}

#[tokio::test]
async fn invalid_window_is_rejected_before_any_work() {
    let factory = SpyFactory::new(Arc::new(SpySummarizer::default()));
    let registry = Arc::new(ModelRegistry::new(factory.clone()));
    let mut settings = settings();
    settings.chunk_size = Some(16);
    settings.chunk_overlap = 16;
    // OCR would be needed and is unavailable, so reaching extraction would fail differently.
    let mut pipeline = DocumentPipeline::new(extraction("", Err(())), registry, settings);

    let error = pipeline
        .summarize_document(document(), |_| {})
        .await
        .expect_err("invalid window");
    assert!(matches!(
        error,
        ProcessingError::Chunking(ChunkingError::InvalidChunkConfig {
            chunk_size: 16,
            overlap: 16
        })
    ));

    let error = pipeline
        .chunk("some text to split")
        .await
        .expect_err("invalid window");
    assert!(matches!(error, ProcessingError::Chunking(_)));
    assert_eq!(factory.loads.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.metrics_snapshot().documents_processed, 0);
}

#[tokio::test]
async fn mismatched_batch_is_an_error() {
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(Arc::new(LossySummarizer))));
    let mut summarizer = HierarchicalSummarizer::new(registry);
    summarizer
        .load_model("lossy", Device::Cpu)
        .await
        .expect("load");

    let chunks = vec!["one".to_string(), "two".to_string()];
    let error = summarizer
        .summarize_chunks(&chunks, 2, 10, 1)
        .await
        .expect_err("mismatch");
    assert!(matches!(
        error,
        ProcessingError::BatchMismatch {
            expected: 2,
            actual: 1
        }
    ));
}

#[tokio::test]
async fn summary_count_matches_chunk_count_for_any_batch_size() {
    let spy = Arc::new(SpySummarizer::default());
    let registry = Arc::new(ModelRegistry::new(SpyFactory::new(spy)));
    let mut summarizer = HierarchicalSummarizer::new(registry);
    summarizer
        .load_model("spy-model", Device::Cpu)
        .await
        .expect("load");

    let tokenizer = WhitespaceTokenizer::new();
    let text = (0..97).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let chunks = chunk_text(&text, &tokenizer, 10, 3).expect("chunks");
    for batch_size in [0, 1, 2, 3, 5, 8, 100] {
        let summaries = summarizer
            .summarize_chunks(&chunks, batch_size, 20, 5)
            .await
            .expect("summaries");
        assert_eq!(summaries.len(), chunks.len(), "batch_size={batch_size}");
    }
}

#[test]
fn successive_chunks_overlap_by_exactly_the_overlap() {
    let tokenizer = WhitespaceTokenizer::new();
    let text = (0..50).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
    let overlap = 4;
    let chunks = chunk_text(&text, &tokenizer, 12, overlap as i64).expect("chunks");

    for pair in chunks.windows(2) {
        let previous = tokenizer.encode(&pair[0]);
        let next = tokenizer.encode(&pair[1]);
        assert_eq!(previous[previous.len() - overlap..], next[..overlap]);
    }
}

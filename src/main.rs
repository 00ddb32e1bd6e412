use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use papersum::{
    config::{self, Config, Device, SummarizationProvider},
    extraction::{Document, ExtractionPipeline, TextSource},
    logging::{self, LogSettings},
    processing::{BatchProgress, DocumentPipeline, PipelineSettings},
    summarization::{DefaultModelFactory, ModelRegistry},
};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "papersum",
    version,
    about = "Extract text from PDFs and produce hierarchical summaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the text extracted from a PDF.
    Extract {
        pdf: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Print the token chunks a PDF is split into.
    Chunk {
        pdf: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Summarize a PDF.
    Summarize {
        pdf: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Write the result to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Emit JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PipelineArgs {
    /// Summarization backend (`extractive` or `ollama`).
    #[arg(long)]
    provider: Option<String>,
    /// Model identifier.
    #[arg(long)]
    model: Option<String>,
    /// Device hint (`cpu`, `gpu`, `gpu:N`).
    #[arg(long)]
    device: Option<String>,
    /// Run OCR when extracted text is shorter than this many characters.
    #[arg(long)]
    ocr_threshold: Option<usize>,
    /// Chunk size in tokens.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Token overlap between chunks.
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// Chunks per summarization call.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Maximum words per chunk summary.
    #[arg(long)]
    chunk_max_length: Option<usize>,
    /// Minimum words per chunk summary.
    #[arg(long)]
    chunk_min_length: Option<usize>,
    /// Maximum words in the final summary.
    #[arg(long)]
    final_max_length: Option<usize>,
    /// Minimum words in the final summary.
    #[arg(long)]
    final_min_length: Option<usize>,
    /// Collapse whitespace and drop the references section before chunking.
    #[arg(long)]
    clean: bool,
}

impl PipelineArgs {
    fn apply(&self, base: &Config) -> Result<Config> {
        let mut config = base.clone();
        if let Some(provider) = &self.provider {
            config.summarization_provider = provider
                .parse::<SummarizationProvider>()
                .map_err(|()| anyhow!("unknown provider '{provider}'"))?;
        }
        if let Some(model) = &self.model {
            config.summarization_model = model.clone();
        }
        if let Some(device) = &self.device {
            config.device = device
                .parse::<Device>()
                .map_err(|()| anyhow!("unknown device '{device}'"))?;
        }
        if let Some(threshold) = self.ocr_threshold {
            anyhow::ensure!(threshold > 0, "--ocr-threshold must be greater than zero");
            config.ocr_threshold_chars = threshold;
        }
        config.chunk_size = self.chunk_size.or(config.chunk_size);
        config.chunk_overlap = self.chunk_overlap.unwrap_or(config.chunk_overlap);
        config.summary_batch_size = self.batch_size.unwrap_or(config.summary_batch_size);
        config.chunk_summary_max_length = self
            .chunk_max_length
            .unwrap_or(config.chunk_summary_max_length);
        config.chunk_summary_min_length = self
            .chunk_min_length
            .unwrap_or(config.chunk_summary_min_length);
        config.final_summary_max_length = self
            .final_max_length
            .unwrap_or(config.final_summary_max_length);
        config.final_summary_min_length = self
            .final_min_length
            .unwrap_or(config.final_summary_min_length);
        config.clean_extracted_text |= self.clean;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let base = config::init_config().context("failed to load configuration")?;
    logging::init_tracing(&LogSettings::from_config(base)).context("failed to set up logging")?;
    base.log_loaded();

    match cli.command {
        Command::Extract {
            pdf,
            output,
            pipeline,
        } => {
            let config = pipeline.apply(base)?;
            let pipeline = build_pipeline(&config);
            let report = pipeline.extract(open_document(&pdf)?).await?;
            if report.source == TextSource::Empty {
                warn_no_text(&pdf);
            }
            let rendered = if output.json {
                serde_json::to_string_pretty(&report)?
            } else {
                report.text
            };
            emit(&output, &rendered)
        }
        Command::Chunk {
            pdf,
            output,
            pipeline,
        } => {
            let config = pipeline.apply(base)?;
            let mut pipeline = build_pipeline(&config);
            pipeline.settings().window()?;
            let report = pipeline.extract(open_document(&pdf)?).await?;
            if report.text.is_empty() {
                warn_no_text(&pdf);
            }
            let chunks = if report.text.is_empty() {
                Vec::new()
            } else {
                pipeline.chunk(&report.text).await?
            };
            let rendered = if output.json {
                serde_json::to_string_pretty(&json!({
                    "chunk_size": pipeline.settings().resolved_chunk_size(),
                    "chunk_overlap": pipeline.settings().chunk_overlap,
                    "chunks": chunks,
                }))?
            } else {
                chunks.join("\n\n---\n\n")
            };
            emit(&output, &rendered)
        }
        Command::Summarize {
            pdf,
            output,
            pipeline,
        } => {
            let config = pipeline.apply(base)?;
            let mut pipeline = build_pipeline(&config);
            let summary = pipeline
                .summarize_document(open_document(&pdf)?, report_progress)
                .await?;
            if summary.extraction.text.is_empty() {
                warn_no_text(&pdf);
            }
            let rendered = if output.json {
                serde_json::to_string_pretty(&json!({
                    "summary": summary,
                    "metrics": pipeline.metrics_snapshot(),
                }))?
            } else {
                summary.final_summary
            };
            emit(&output, &rendered)
        }
    }
}

fn build_pipeline(config: &Config) -> DocumentPipeline {
    let extraction = Arc::new(ExtractionPipeline::from_config(config));
    let registry = Arc::new(ModelRegistry::new(Arc::new(
        DefaultModelFactory::from_config(config),
    )));
    DocumentPipeline::new(extraction, registry, PipelineSettings::from_config(config))
}

fn open_document(path: &Path) -> Result<Document> {
    anyhow::ensure!(path.is_file(), "{} is not a readable file", path.display());
    Ok(Document::from_path(path))
}

fn report_progress(progress: BatchProgress) {
    tracing::info!(
        completed = progress.completed,
        total = progress.total,
        "Summarized chunks"
    );
}

fn warn_no_text(path: &Path) {
    tracing::warn!(document = %path.display(), "No text could be extracted; output is empty");
}

fn emit(output: &OutputArgs, rendered: &str) -> Result<()> {
    match &output.output {
        Some(path) => fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}").context("failed to write to stdout")
        }
    }
}

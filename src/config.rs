use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the papersum pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend used to produce chunk and final summaries.
    pub summarization_provider: SummarizationProvider,
    /// Model identifier handed to the provider and used for tokenizer lookup.
    pub summarization_model: String,
    /// Optional base URL of the Ollama runtime.
    pub ollama_url: Option<String>,
    /// Device hint forwarded when a model is loaded.
    pub device: Device,
    /// Structured text shorter than this triggers the OCR fallback.
    pub ocr_threshold_chars: usize,
    /// Tesseract language pack passed as `-l`.
    pub ocr_language: String,
    /// Executable used for optical character recognition.
    pub tesseract_cmd: String,
    /// Executable used to rasterize PDF pages.
    pub pdftoppm_cmd: String,
    /// Executable used to count PDF pages; defaults to the `pdfinfo` beside `pdftoppm_cmd`.
    pub pdfinfo_cmd: Option<String>,
    /// Optional override for the automatic chunk size selection.
    pub chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of chunks submitted per summarization call.
    pub summary_batch_size: usize,
    /// Upper length bound for each chunk summary.
    pub chunk_summary_max_length: usize,
    /// Lower length bound for each chunk summary.
    pub chunk_summary_min_length: usize,
    /// Upper length bound for the final summary.
    pub final_summary_max_length: usize,
    /// Lower length bound for the final summary; also the short-circuit word count.
    pub final_summary_min_length: usize,
    /// Collapse whitespace and drop the references section before chunking.
    pub clean_extracted_text: bool,
    /// File that log events are appended to in addition to stderr.
    pub log_file: Option<PathBuf>,
}

/// Supported summarization backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationProvider {
    /// Deterministic leading-sentence summaries; needs no model runtime.
    #[default]
    Extractive,
    /// Local Ollama runtime.
    Ollama,
}

impl FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractive" | "none" => Ok(Self::Extractive),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Where model inference should run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum Device {
    /// Force CPU inference.
    #[default]
    Cpu,
    /// Prefer the GPU with the given index.
    Gpu(u32),
}

impl FromStr for Device {
    type Err = ();

    /// Accepts `cpu`, `gpu`, `gpu:N`, `cuda:N` and the numeric form where `-1` means CPU.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "cpu" | "-1" => return Ok(Self::Cpu),
            "gpu" | "cuda" => return Ok(Self::Gpu(0)),
            _ => {}
        }
        let index = normalized
            .strip_prefix("gpu:")
            .or_else(|| normalized.strip_prefix("cuda:"))
            .unwrap_or(&normalized);
        index.parse::<u32>().map(Self::Gpu).map_err(|_| ())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            summarization_provider: SummarizationProvider::Extractive,
            summarization_model: DEFAULT_MODEL.to_string(),
            ollama_url: None,
            device: Device::Cpu,
            ocr_threshold_chars: 200,
            ocr_language: "eng".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            pdftoppm_cmd: "pdftoppm".to_string(),
            pdfinfo_cmd: None,
            chunk_size: None,
            chunk_overlap: 64,
            summary_batch_size: 4,
            chunk_summary_max_length: 130,
            chunk_summary_min_length: 30,
            final_summary_max_length: 200,
            final_summary_min_length: 50,
            clean_extracted_text: false,
            log_file: None,
        }
    }
}

/// Model used when `SUMMARIZATION_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "llama3.2";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// Every variable is optional; unset values fall back to [`Config::default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            summarization_provider: match load_env_optional("SUMMARIZATION_PROVIDER") {
                Some(value) => value.parse().map_err(|()| {
                    ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".to_string())
                })?,
                None => defaults.summarization_provider,
            },
            summarization_model: load_env_optional("SUMMARIZATION_MODEL")
                .unwrap_or(defaults.summarization_model),
            ollama_url: load_env_optional("OLLAMA_URL"),
            device: match load_env_optional("DEVICE") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("DEVICE".to_string()))?,
                None => defaults.device,
            },
            ocr_threshold_chars: parse_env("OCR_THRESHOLD_CHARS")?
                .unwrap_or(defaults.ocr_threshold_chars),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or(defaults.ocr_language),
            tesseract_cmd: load_env_optional("TESSERACT_CMD").unwrap_or(defaults.tesseract_cmd),
            pdftoppm_cmd: load_env_optional("PDFTOPPM_CMD").unwrap_or(defaults.pdftoppm_cmd),
            pdfinfo_cmd: load_env_optional("PDFINFO_CMD"),
            chunk_size: parse_env("CHUNK_SIZE")?,
            chunk_overlap: parse_env("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            summary_batch_size: parse_env("SUMMARY_BATCH_SIZE")?
                .unwrap_or(defaults.summary_batch_size),
            chunk_summary_max_length: parse_env("CHUNK_SUMMARY_MAX_LENGTH")?
                .unwrap_or(defaults.chunk_summary_max_length),
            chunk_summary_min_length: parse_env("CHUNK_SUMMARY_MIN_LENGTH")?
                .unwrap_or(defaults.chunk_summary_min_length),
            final_summary_max_length: parse_env("FINAL_SUMMARY_MAX_LENGTH")?
                .unwrap_or(defaults.final_summary_max_length),
            final_summary_min_length: parse_env("FINAL_SUMMARY_MIN_LENGTH")?
                .unwrap_or(defaults.final_summary_min_length),
            clean_extracted_text: load_env_optional("CLEAN_EXTRACTED_TEXT")
                .map(|value| {
                    parse_bool(&value)
                        .ok_or_else(|| ConfigError::InvalidValue("CLEAN_EXTRACTED_TEXT".into()))
                })
                .transpose()?
                .unwrap_or(defaults.clean_extracted_text),
            log_file: load_env_optional("PAPERSUM_LOG_FILE").map(PathBuf::from),
        };

        if config.ocr_threshold_chars == 0 {
            return Err(ConfigError::InvalidValue("OCR_THRESHOLD_CHARS".into()));
        }
        Ok(config)
    }

    /// Emit the effective settings at debug level.
    ///
    /// Call after tracing is initialised; events emitted before a subscriber exists are dropped.
    pub fn log_loaded(&self) {
        tracing::debug!(
            provider = ?self.summarization_provider,
            model = %self.summarization_model,
            device = ?self.device,
            ocr_threshold_chars = self.ocr_threshold_chars,
            chunk_size = ?self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            log_file = ?self.log_file,
            "Loaded configuration"
        );
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load `.env` and the environment, then install the result in the global cache.
///
/// `.env` is applied to the process environment here, so it must run before tracing reads
/// `RUST_LOG`.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

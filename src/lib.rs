#![deny(missing_docs)]

//! Core library for papersum: PDF text extraction and hierarchical summarization.

/// Environment-driven configuration management.
pub mod config;
/// Structured, OCR-backed PDF text extraction.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking and map/reduce summarization.
pub mod processing;
/// Summarization capability, providers and model registry.
pub mod summarization;
/// Tokenizers used to cut text into token windows.
pub mod tokenizer;

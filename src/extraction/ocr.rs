//! Optical character recognition over rendered pages.

use image::{DynamicImage, ImageFormat};
use std::io;
use std::process::Command;
use thiserror::Error;

/// Failures raised by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine cannot run at all; fatal for the extraction pipeline.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    /// Recognition failed for this image only.
    #[error("OCR recognition failed: {0}")]
    Recognition(String),
}

/// Interface implemented by OCR backends.
pub trait OcrEngine: Send + Sync {
    /// Recognize the text on a single page image.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Stderr fragments tesseract prints when its installation, not the image, is broken.
const BROKEN_INSTALL_MARKERS: &[&str] = &[
    "Failed loading language",
    "Error opening data file",
    "Could not initialize tesseract",
];

/// OCR engine that shells out to the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    /// Use the given executable and language pack.
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let workdir = tempfile::tempdir()
            .map_err(|error| OcrError::Recognition(format!("failed to create scratch dir: {error}")))?;
        let input = workdir.path().join("page.png");
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|error| OcrError::Recognition(format!("failed to encode page: {error}")))?;

        let output = Command::new(&self.command)
            .arg(&input)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .map_err(|error| self.spawn_error(error))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if BROKEN_INSTALL_MARKERS
                .iter()
                .any(|marker| stderr.contains(marker))
            {
                return Err(OcrError::Unavailable(format!(
                    "{} cannot load language '{}': {stderr}",
                    self.command, self.language
                )));
            }
            return Err(OcrError::Recognition(format!(
                "{} exited with {}: {stderr}",
                self.command, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TesseractOcr {
    fn spawn_error(&self, error: io::Error) -> OcrError {
        if error.kind() == io::ErrorKind::NotFound {
            OcrError::Unavailable(format!(
                "{} not found; install Tesseract OCR and ensure it is on PATH",
                self.command
            ))
        } else {
            OcrError::Unavailable(format!("failed to run {}: {error}", self.command))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_reported_as_unavailable() {
        let engine = TesseractOcr::new("papersum-no-such-tesseract", "eng");
        let image = DynamicImage::new_rgb8(4, 4);
        let error = engine.recognize(&image).expect_err("engine should be unavailable");
        assert!(matches!(error, OcrError::Unavailable(message) if message.contains("not found")));
    }
}

//! Page rasterization for the OCR fallback.
//!
//! Rendering shells out to poppler's `pdftoppm`, one page at a time, into a scratch directory
//! that lives as long as the opened [`PageSource`]. Pages are counted with poppler's `pdfinfo`,
//! falling back to lopdf, so a document whose cross-reference table lopdf rejects still renders.

use super::{Document, ExtractError};
use image::DynamicImage;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// PDF user space is 72 units per inch.
const BASE_DPI: f32 = 72.0;

/// Backend able to rasterize the pages of a document.
pub trait PageRenderer: Send + Sync {
    /// Prepare a document for rendering.
    ///
    /// Returns [`ExtractError::Unavailable`] when the renderer cannot run at all and
    /// [`ExtractError::Open`] when this particular document cannot be read.
    fn open<'a>(&'a self, document: &'a Document) -> Result<Box<dyn PageSource + 'a>, ExtractError>;
}

/// An opened document ready to be rendered page by page.
pub trait PageSource {
    /// Number of pages in the document, or `None` when it could not be determined.
    ///
    /// Uncounted documents are rendered in order until the first page that fails to render.
    fn page_count(&self) -> Option<usize>;

    /// Rasterize one zero-based page at the given zoom factor.
    fn render_page(&self, page: usize, zoom: f32) -> Result<DynamicImage, ExtractError>;
}

/// Renderer backed by the `pdftoppm` command-line tool.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    command: String,
    pdfinfo: String,
}

impl PdftoppmRenderer {
    /// Use the given executable name or path.
    ///
    /// Pages are counted with the `pdfinfo` that sits next to `command`, or the one on `PATH`.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let pdfinfo = sibling_command(&command, "pdfinfo");
        Self { command, pdfinfo }
    }

    /// Count pages with a specific `pdfinfo` executable.
    pub fn with_pdfinfo(mut self, pdfinfo: impl Into<String>) -> Self {
        self.pdfinfo = pdfinfo.into();
        self
    }

    fn count_pages(&self, document: &Document, input: &Path) -> Option<usize> {
        match self.pdfinfo_pages(input) {
            Ok(count) => return Some(count),
            Err(reason) => tracing::debug!(reason = %reason, "pdfinfo could not count pages"),
        }
        let bytes = document.read_bytes().ok()?;
        match lopdf::Document::load_mem(&bytes) {
            Ok(pdf) => Some(pdf.get_pages().len()),
            Err(error) => {
                tracing::debug!(error = %error, "lopdf could not count pages; rendering until a page fails");
                None
            }
        }
    }

    fn pdfinfo_pages(&self, input: &Path) -> Result<usize, String> {
        let output = Command::new(&self.pdfinfo)
            .arg(input)
            .output()
            .map_err(|error| format!("failed to run {}: {error}", self.pdfinfo))?;
        if !output.status.success() {
            return Err(format!("{} exited with {}", self.pdfinfo, output.status));
        }
        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| format!("{} printed no page count", self.pdfinfo))
    }

    fn ensure_available(&self) -> Result<(), ExtractError> {
        // Only spawnability matters; exit codes for `-v` differ between poppler releases.
        Command::new(&self.command)
            .arg("-v")
            .output()
            .map(|_| ())
            .map_err(|error| spawn_error(&self.command, error))
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn open<'a>(&'a self, document: &'a Document) -> Result<Box<dyn PageSource + 'a>, ExtractError> {
        self.ensure_available()?;

        let workdir = tempfile::tempdir()
            .map_err(|error| ExtractError::Open(format!("failed to create scratch dir: {error}")))?;
        let input = match document {
            Document::Path(path) => path.clone(),
            Document::Bytes(bytes) => {
                let path = workdir.path().join("input.pdf");
                std::fs::write(&path, bytes)
                    .map_err(|error| ExtractError::Open(format!("failed to stage PDF: {error}")))?;
                path
            }
        };
        if !input.is_file() {
            return Err(ExtractError::Open(format!("{} is not readable", input.display())));
        }

        let page_count = self.count_pages(document, &input);
        tracing::debug!(pages = ?page_count, input = %input.display(), "Prepared document for rendering");
        Ok(Box::new(PdftoppmSource {
            command: &self.command,
            input,
            page_count,
            workdir,
        }))
    }
}

struct PdftoppmSource<'a> {
    command: &'a str,
    input: PathBuf,
    page_count: Option<usize>,
    workdir: TempDir,
}

impl PageSource for PdftoppmSource<'_> {
    fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    fn render_page(&self, page: usize, zoom: f32) -> Result<DynamicImage, ExtractError> {
        let number = (page + 1).to_string();
        let dpi = (BASE_DPI * zoom).round().max(1.0) as u32;
        let prefix = self.workdir.path().join(format!("page-{number}"));

        let output = Command::new(self.command)
            .args(["-f", &number, "-l", &number])
            .args(["-r", &dpi.to_string()])
            .args(["-png", "-singlefile"])
            .arg(&self.input)
            .arg(&prefix)
            .output()
            .map_err(|error| spawn_error(self.command, error))?;

        if !output.status.success() {
            return Err(ExtractError::Page {
                page,
                message: format!(
                    "{} exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let png = prefix.with_extension("png");
        let image = load_png(&png, page);
        let _ = std::fs::remove_file(&png);
        image
    }
}

fn load_png(path: &Path, page: usize) -> Result<DynamicImage, ExtractError> {
    image::open(path).map_err(|error| ExtractError::Page {
        page,
        message: format!("failed to decode rendered page: {error}"),
    })
}

/// Read the `Pages:` line of `pdfinfo` output.
fn parse_pdfinfo_pages(report: &str) -> Option<usize> {
    report.lines().find_map(|line| {
        line.strip_prefix("Pages:")
            .and_then(|count| count.trim().parse().ok())
    })
}

fn sibling_command(command: &str, tool: &str) -> String {
    let path = Path::new(command);
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(tool).to_string_lossy().into_owned(),
        _ => tool.to_string(),
    }
}

fn spawn_error(command: &str, error: io::Error) -> ExtractError {
    if error.kind() == io::ErrorKind::NotFound {
        ExtractError::Unavailable(format!(
            "{command} not found; install poppler-utils or set PDFTOPPM_CMD"
        ))
    } else {
        ExtractError::Unavailable(format!("failed to run {command}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_reported_as_unavailable() {
        let renderer = PdftoppmRenderer::new("papersum-no-such-pdftoppm");
        let document = Document::from_bytes(b"irrelevant".to_vec());
        let error = match renderer.open(&document) {
            Ok(_) => panic!("renderer should not open"),
            Err(error) => error,
        };
        assert!(matches!(error, ExtractError::Unavailable(message) if message.contains("not found")));
    }

    /// One page whose `startxref` points past the end of the file.
    fn broken_xref_pdf() -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        pdf.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        pdf.extend_from_slice(
            b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj\n",
        );
        pdf.extend_from_slice(b"trailer << /Root 1 0 R /Size 4 >>\nstartxref\n999999\n%%EOF\n");
        pdf
    }

    #[test]
    fn document_lopdf_rejects_still_opens_for_rendering() {
        let bytes = broken_xref_pdf();
        assert!(lopdf::Document::load_mem(&bytes).is_err());

        let renderer = PdftoppmRenderer::new("true").with_pdfinfo("true");
        let document = Document::from_bytes(bytes);
        let source = match renderer.open(&document) {
            Ok(source) => source,
            Err(error) => panic!("renderer should open an unparseable document: {error}"),
        };
        assert_eq!(source.page_count(), None);
    }

    #[test]
    fn unreadable_path_is_an_open_error() {
        let renderer = PdftoppmRenderer::new("true");
        let document = Document::from_path("/definitely/not/here.pdf");
        assert!(matches!(renderer.open(&document), Err(ExtractError::Open(_))));
    }

    #[test]
    fn pdfinfo_page_line_is_parsed() {
        let report = "Producer:       pdfTeX\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_pages(report), Some(12));
        assert_eq!(parse_pdfinfo_pages("Title: Pages: none\n"), None);
    }

    #[test]
    fn pdfinfo_is_looked_up_next_to_pdftoppm() {
        assert_eq!(
            PdftoppmRenderer::new("/opt/poppler/bin/pdftoppm").pdfinfo,
            "/opt/poppler/bin/pdfinfo"
        );
        assert_eq!(PdftoppmRenderer::new("pdftoppm").pdfinfo, "pdfinfo");
    }
}

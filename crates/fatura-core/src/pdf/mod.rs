//! PDF processing module.

mod extractor;
mod renderer;

pub use extractor::{LopdfTextExtractor, PdfExtractTextExtractor};
pub use renderer::PopplerRenderer;

use std::path::{Path, PathBuf};

use image::DynamicImage;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// A bill to extract text from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Location of the PDF on disk.
    pub path: PathBuf,
    /// Human-readable name used in logs and reports.
    pub name: String,
}

impl Document {
    /// Create a document named after its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    /// Create a document with an explicit display name.
    pub fn with_name(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// Pulls an embedded text layer out of a PDF.
pub trait NativeTextExtractor: Send + Sync {
    /// Short identifier used in logs and extraction reports.
    fn name(&self) -> &'static str;

    /// Extract the text layer, one entry per page where the library exposes pages.
    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>>;
}

/// Rasterizes PDF pages for OCR.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Render a page (1-indexed) at the given resolution.
    fn render_page(&self, path: &Path, page: u32, dpi: u32) -> Result<DynamicImage>;
}

/// Join page texts with a space and collapse whitespace runs.
pub fn normalize_pages(pages: &[String]) -> String {
    normalize_whitespace(&pages.join(" "))
}

/// Collapse every run of whitespace into a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Load a PDF with lopdf, decrypting it with the empty password when needed.
///
/// The flag is true when the document had to be decrypted.
pub(crate) fn load_document(data: &[u8]) -> Result<(lopdf::Document, bool)> {
    let mut doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let encrypted = doc.is_encrypted();
    if encrypted {
        if doc.decrypt("").is_err() {
            return Err(PdfError::Encrypted);
        }
        tracing::debug!("Decrypted PDF with empty password");
    }

    if doc.get_pages().is_empty() {
        return Err(PdfError::NoPages);
    }

    Ok((doc, encrypted))
}

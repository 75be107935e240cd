//! Error types for the fatura-core library.

use thiserror::Error;

/// Main error type for the fatura library.
///
/// Only configuration-level faults reach callers of the extraction
/// pipeline; data-dependent failures degrade to empty text or `null` fields.
/// [`PdfError`] and [`OcrError`] stay inside their layer and are recorded on
/// the extraction attempt instead.
#[derive(Error, Debug)]
pub enum FaturaError {
    /// Field rule table error.
    #[error("rule table error: {0}")]
    Rules(#[from] RuleError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to rasterize a page.
    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// I/O error while reading the file or running an external tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models or locate the engine binary.
    #[error("failed to load engine: {0}")]
    ModelLoad(String),

    /// The engine was built out of this binary.
    #[error("engine not available in this build: {0}")]
    Unsupported(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors related to loading field extraction rule tables.
#[derive(Error, Debug)]
pub enum RuleError {
    /// The rule table could not be parsed.
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] toml::de::Error),

    /// A pattern does not compile.
    #[error("invalid pattern for {category}.{field}: {source}")]
    InvalidPattern {
        category: String,
        field: String,
        #[source]
        source: regex::Error,
    },

    /// A pattern refers to a capture group it does not define.
    #[error("pattern for {category}.{field} has no capture group {group}")]
    MissingGroup {
        category: String,
        field: String,
        group: usize,
    },

    /// The same category is declared twice.
    #[error("duplicate category: {0}")]
    DuplicateCategory(String),

    /// The table declares a version this build does not understand.
    #[error("unsupported rule table version: {0}")]
    UnsupportedVersion(u32),

    /// I/O error when reading a rule table file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the fatura library.
pub type Result<T> = std::result::Result<T, FaturaError>;

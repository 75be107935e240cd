//! Embedded text-layer extraction using pdf-extract and lopdf.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, trace};

use super::{load_document, NativeTextExtractor, Result};
use crate::error::PdfError;

/// Whole-document text extraction via `pdf-extract`.
///
/// This is the first layer of the pipeline: it handles most generated bills
/// and is the cheapest path when it works.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractTextExtractor;

impl PdfExtractTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl NativeTextExtractor for PdfExtractTextExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        // pdf-extract does not decrypt; hand it a decrypted copy when lopdf can open one.
        let decrypted = match load_document(data) {
            Ok((mut doc, true)) => {
                let mut buffer = Vec::new();
                doc.save_to(&mut buffer)
                    .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
                Some(buffer)
            }
            Ok(_) => None,
            Err(PdfError::Encrypted) => return Err(PdfError::Encrypted),
            Err(e) => {
                trace!("lopdf could not pre-load document: {}", e);
                None
            }
        };
        let bytes = decrypted.as_deref().unwrap_or(data);

        // pdf-extract panics on some malformed content streams.
        let text = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
            .map_err(|_| PdfError::TextExtraction("pdf-extract panicked".to_string()))?
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

        debug!("pdf-extract returned {} chars", text.len());
        Ok(vec![text])
    }
}

/// Per-page text extraction via lopdf's content-stream text operators.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextExtractor;

impl LopdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl NativeTextExtractor for LopdfTextExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        let (doc, _) = load_document(data)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        let mut pages = Vec::with_capacity(page_numbers.len());
        for page in page_numbers {
            match doc.extract_text(&[page]) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    trace!("lopdf failed on page {}: {}", page, e);
                    pages.push(String::new());
                }
            }
        }

        debug!("lopdf extracted text from {} pages", pages.len());
        Ok(pages)
    }
}

//! Layered text recovery: native text layers first, OCR as the last resort.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{FaturaConfig, OcrConfig, PdfConfig};
use crate::error::{FaturaError, Result};
use crate::ocr::{ImagePreprocessor, OcrContext};
use crate::pdf::{
    normalize_pages, Document, LopdfTextExtractor, NativeTextExtractor, PageRenderer,
    PdfExtractTextExtractor, PopplerRenderer,
};

/// Method identifier recorded for the OCR layer.
pub const OCR_METHOD: &str = "ocr";

/// Outcome of one extraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionAttempt {
    /// `pdf-extract`, `lopdf` or `ocr`.
    pub method: String,
    pub text: String,
    /// Character count of `text`.
    pub quality: usize,
    /// Whether the text passed this layer's gate.
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ExtractionAttempt {
    fn scored(method: &str, text: String, threshold: impl Fn(usize) -> bool) -> Self {
        let quality = text.chars().count();
        Self {
            method: method.to_string(),
            accepted: !text.is_empty() && threshold(quality),
            text,
            quality,
            failure: None,
        }
    }

    fn failed(method: &str, reason: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            text: String::new(),
            quality: 0,
            accepted: false,
            failure: Some(reason.into()),
        }
    }
}

/// Every layer tried for a document, in order, and the text that won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub document: String,
    /// Recovered text; empty when every layer failed.
    pub text: String,
    /// Method of the accepted attempt.
    pub method: Option<String>,
    pub attempts: Vec<ExtractionAttempt>,
    pub processing_time_ms: u64,
}

impl ExtractionReport {
    fn new(document: &Document) -> Self {
        Self {
            document: document.name.clone(),
            text: String::new(),
            method: None,
            attempts: Vec::new(),
            processing_time_ms: 0,
        }
    }

    /// Record an attempt; returns true when it was accepted.
    fn push(&mut self, attempt: ExtractionAttempt) -> bool {
        let accepted = attempt.accepted;
        if accepted {
            self.text = attempt.text.clone();
            self.method = Some(attempt.method.clone());
        }
        self.attempts.push(attempt);
        accepted
    }
}

/// Recovers the text of a bill PDF.
///
/// Layers run in order and the first one whose output passes its quality
/// gate wins:
///
/// 1. each native extractor (`pdf-extract`, then `lopdf`), normalized and
///    accepted when longer than `pdf.min_text_length` characters;
/// 2. OCR over every rendered page, accepted when at least
///    `ocr.min_text_length` characters were recognized.
///
/// Only configuration faults are errors. Anything that goes wrong with the
/// document itself degrades to "no text from this layer", and a document
/// nothing can read yields an empty string.
pub struct TextExtractionPipeline {
    native: Vec<Box<dyn NativeTextExtractor>>,
    renderer: Box<dyn PageRenderer>,
    preprocessor: ImagePreprocessor,
    ocr: Arc<OcrContext>,
    pdf_config: PdfConfig,
    ocr_config: OcrConfig,
}

/// Builder for [`TextExtractionPipeline`]; unset parts come from configuration.
pub struct TextExtractionPipelineBuilder {
    config: FaturaConfig,
    native: Option<Vec<Box<dyn NativeTextExtractor>>>,
    renderer: Option<Box<dyn PageRenderer>>,
    preprocessor: Option<ImagePreprocessor>,
    ocr: Option<Arc<OcrContext>>,
}

impl TextExtractionPipelineBuilder {
    pub fn new(config: FaturaConfig) -> Self {
        Self {
            config,
            native: None,
            renderer: None,
            preprocessor: None,
            ocr: None,
        }
    }

    /// Replace the native extractors (tried in the given order).
    pub fn with_native_extractors(mut self, extractors: Vec<Box<dyn NativeTextExtractor>>) -> Self {
        self.native = Some(extractors);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Share an OCR context with other pipelines.
    pub fn with_ocr_context(mut self, ocr: Arc<OcrContext>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn build(self) -> Result<TextExtractionPipeline> {
        let preprocessor = match self.preprocessor {
            Some(preprocessor) => preprocessor,
            None => ImagePreprocessor::from_config(&self.config.ocr)?,
        };
        if self.config.pdf.render_dpi == 0 {
            return Err(FaturaError::Config("render_dpi must be positive".to_string()));
        }

        let native = self.native.unwrap_or_else(|| {
            vec![
                Box::new(PdfExtractTextExtractor::new()) as Box<dyn NativeTextExtractor>,
                Box::new(LopdfTextExtractor::new()),
            ]
        });
        let renderer = self.renderer.unwrap_or_else(|| {
            Box::new(PopplerRenderer::new().with_binary(self.config.pdf.pdftoppm_path.clone()))
        });
        let ocr = self
            .ocr
            .unwrap_or_else(|| Arc::new(OcrContext::from_config(&self.config.ocr)));

        Ok(TextExtractionPipeline {
            native,
            renderer,
            preprocessor,
            ocr,
            pdf_config: self.config.pdf,
            ocr_config: self.config.ocr,
        })
    }
}

impl TextExtractionPipeline {
    pub fn builder(config: FaturaConfig) -> TextExtractionPipelineBuilder {
        TextExtractionPipelineBuilder::new(config)
    }

    /// Pipeline with the default extractors, renderer and OCR engines.
    pub fn from_config(config: FaturaConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// The OCR context, for status reporting and sharing.
    pub fn ocr_context(&self) -> &Arc<OcrContext> {
        &self.ocr
    }

    /// Recover the document's text; empty when nothing could be read.
    pub fn extract(&self, document: &Document) -> Result<String> {
        Ok(self.extract_with_report(document)?.text)
    }

    /// Recover the document's text along with every attempt made.
    pub fn extract_with_report(&self, document: &Document) -> Result<ExtractionReport> {
        let start = Instant::now();
        let mut report = ExtractionReport::new(document);
        info!("Extracting text from {}", document.name);

        let data = std::fs::read(&document.path).map_err(|e| {
            warn!("Cannot read {}: {}", document.path.display(), e);
            e.to_string()
        });

        let mut accepted = false;
        for extractor in &self.native {
            let attempt = match &data {
                Ok(bytes) => self.run_native(extractor.as_ref(), bytes),
                Err(reason) => ExtractionAttempt::failed(extractor.name(), reason.clone()),
            };
            if report.push(attempt) {
                accepted = true;
                break;
            }
        }

        if !accepted {
            if self.ocr_config.enabled {
                let attempt = self.run_ocr(document)?;
                report.push(attempt);
            } else {
                debug!("OCR disabled, skipping");
            }
        }

        report.processing_time_ms = start.elapsed().as_millis() as u64;
        match &report.method {
            Some(method) => info!(
                "Recovered {} chars from {} via {} in {}ms",
                report.text.chars().count(),
                document.name,
                method,
                report.processing_time_ms
            ),
            None => error!("No text recovered from {}", document.name),
        }

        Ok(report)
    }

    fn run_native(&self, extractor: &dyn NativeTextExtractor, data: &[u8]) -> ExtractionAttempt {
        let threshold = self.pdf_config.min_text_length;
        match extractor.extract_pages(data) {
            Ok(pages) => {
                let attempt = ExtractionAttempt::scored(extractor.name(), normalize_pages(&pages), |n| {
                    n > threshold
                });
                if attempt.accepted {
                    info!("{} extracted {} chars", extractor.name(), attempt.quality);
                } else {
                    debug!(
                        "{} returned {} chars (need more than {})",
                        extractor.name(),
                        attempt.quality,
                        threshold
                    );
                }
                attempt
            }
            Err(e) => {
                warn!("{} failed: {}", extractor.name(), e);
                ExtractionAttempt::failed(extractor.name(), e.to_string())
            }
        }
    }

    fn run_ocr(&self, document: &Document) -> Result<ExtractionAttempt> {
        let mode = self.ocr_config.arbitration;
        if !self.ocr.initialize(mode) {
            let reasons = self.ocr.failures().join("; ");
            if self.ocr_config.required {
                return Err(FaturaError::Config(format!(
                    "OCR is required but no engine is available: {}",
                    reasons
                )));
            }
            warn!("No OCR engine available: {}", reasons);
            return Ok(ExtractionAttempt::failed(
                OCR_METHOD,
                format!("no OCR engine available: {}", reasons),
            ));
        }

        let page_count = match self.renderer.page_count(&document.path) {
            Ok(count) => count,
            Err(e) => {
                warn!("Cannot count pages of {}: {}", document.name, e);
                return Ok(ExtractionAttempt::failed(OCR_METHOD, e.to_string()));
            }
        };
        let max_pages = self.pdf_config.max_pages;
        let pages = if max_pages > 0 {
            page_count.min(max_pages)
        } else {
            page_count
        };
        debug!("Running OCR on {} of {} pages", pages, page_count);

        let mut outputs = Vec::new();
        for page in 1..=pages {
            let image = match self
                .renderer
                .render_page(&document.path, page, self.pdf_config.render_dpi)
            {
                Ok(image) => image,
                Err(e) => {
                    warn!("Skipping page {}: {}", page, e);
                    continue;
                }
            };
            let binary = match self.preprocessor.prepare(&image) {
                Ok(binary) => binary,
                Err(e) => {
                    warn!("Skipping page {}: {}", page, e);
                    continue;
                }
            };
            drop(image);

            let text = self.ocr.recognize(&binary, mode);
            if text.is_empty() {
                debug!("Page {} produced no text", page);
            } else {
                debug!("Page {}: {} chars", page, text.chars().count());
                outputs.push(text);
            }
        }

        let threshold = self.ocr_config.min_text_length;
        Ok(ExtractionAttempt::scored(OCR_METHOD, outputs.join("\n"), |n| {
            n >= threshold
        }))
    }
}

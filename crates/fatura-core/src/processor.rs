//! End-to-end bill processing: recover text, classify, extract fields.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::FaturaError;
use crate::fields::{ExtractedFields, StructuredFieldExtractor};
use crate::pdf::Document;
use crate::pipeline::TextExtractionPipeline;

lazy_static! {
    static ref NON_LETTERS: Regex = Regex::new(r"[^\p{L}\s]+").unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
}

/// Category assigned to a bill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: String,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// Assigns a category to normalized bill text.
pub trait Classifier: Send + Sync {
    fn classify(&self, normalized_text: &str) -> Result<Classification, String>;
}

/// Produces classifier input from recovered text.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Lowercases and keeps only letters, with whitespace collapsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LowercaseNormalizer;

impl TextNormalizer for LowercaseNormalizer {
    fn normalize(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let letters = NON_LETTERS.replace_all(&lower, " ");
        SPACES.replace_all(&letters, " ").trim().to_string()
    }
}

/// Always answers with the same category, at full confidence.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    category: String,
}

impl FixedClassifier {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _normalized_text: &str) -> Result<Classification, String> {
        Ok(Classification {
            category: self.category.clone(),
            confidence: 1.0,
        })
    }
}

/// Why a bill could not be processed.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// No layer recovered any text from the document.
    #[error("could not extract text from {document}{}", ocr_suffix(.ocr_failure))]
    ExtractionFailed {
        document: String,
        ocr_failure: Option<String>,
    },

    /// Text was recovered but nothing survived normalization.
    #[error("text is empty after normalization")]
    EmptyAfterNormalization,

    /// Empty text was submitted.
    #[error("no text provided")]
    EmptyText,

    #[error("classification failed: {0}")]
    Classifier(String),

    #[error(transparent)]
    Fatura(#[from] FaturaError),
}

fn ocr_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" (OCR unavailable: {})", r))
        .unwrap_or_default()
}

/// Result of processing one bill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub category: String,
    pub confidence: f32,
    pub details: ExtractedFields,
    /// Extraction layer that produced the text; absent for text input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Recover, normalize, classify, then extract fields from the raw text.
pub struct BillProcessor {
    pipeline: TextExtractionPipeline,
    normalizer: Box<dyn TextNormalizer>,
    classifier: Arc<dyn Classifier>,
    extractor: StructuredFieldExtractor,
}

impl BillProcessor {
    pub fn new(
        pipeline: TextExtractionPipeline,
        classifier: Arc<dyn Classifier>,
        extractor: StructuredFieldExtractor,
    ) -> Self {
        Self {
            pipeline,
            normalizer: Box::new(LowercaseNormalizer),
            classifier,
            extractor,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn TextNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn pipeline(&self) -> &TextExtractionPipeline {
        &self.pipeline
    }

    pub fn extractor(&self) -> &StructuredFieldExtractor {
        &self.extractor
    }

    /// Process a PDF from disk.
    pub fn process_document(&self, document: &Document) -> Result<ProcessOutcome, ProcessError> {
        let report = self.pipeline.extract_with_report(document)?;
        if report.text.is_empty() {
            let failures = self.pipeline.ocr_context().failures();
            let ocr_failure = (!failures.is_empty()).then(|| failures.join("; "));
            warn!("Extraction failed for {}", document.name);
            return Err(ProcessError::ExtractionFailed {
                document: document.name.clone(),
                ocr_failure,
            });
        }

        let mut outcome = self.classify_and_extract(&report.text)?;
        outcome.method = report.method;
        Ok(outcome)
    }

    /// Process already-recovered text.
    pub fn process_text(&self, text: &str) -> Result<ProcessOutcome, ProcessError> {
        if text.trim().is_empty() {
            return Err(ProcessError::EmptyText);
        }
        self.classify_and_extract(text)
    }

    fn classify_and_extract(&self, text: &str) -> Result<ProcessOutcome, ProcessError> {
        let normalized = self.normalizer.normalize(text);
        if normalized.is_empty() {
            return Err(ProcessError::EmptyAfterNormalization);
        }

        let Classification {
            category,
            confidence,
        } = self
            .classifier
            .classify(&normalized)
            .map_err(ProcessError::Classifier)?;

        let details = self.extractor.extract(text, &category);
        info!(
            "Classified as '{}' ({:.2}), {}/{} fields found",
            category,
            confidence,
            details.found(),
            details.len()
        );

        Ok(ProcessOutcome {
            category,
            confidence,
            details,
            method: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaturaConfig;
    use crate::error::{OcrError, PdfError};
    use crate::fields::{FieldValue, RuleSet};
    use crate::ocr::{OcrContext, OcrReaderHandle};
    use crate::pdf::{self, NativeTextExtractor, PageRenderer};
    use image::DynamicImage;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    struct StaticText(&'static str);

    impl NativeTextExtractor for StaticText {
        fn name(&self) -> &'static str {
            "static"
        }

        fn extract_pages(&self, _data: &[u8]) -> pdf::Result<Vec<String>> {
            Ok(vec![self.0.to_string()])
        }
    }

    struct NoPages;

    impl PageRenderer for NoPages {
        fn page_count(&self, _path: &Path) -> pdf::Result<u32> {
            Ok(0)
        }

        fn render_page(&self, _path: &Path, page: u32, _dpi: u32) -> pdf::Result<DynamicImage> {
            Err(PdfError::InvalidPage(page))
        }
    }

    struct Refusing;

    impl Classifier for Refusing {
        fn classify(&self, _normalized_text: &str) -> Result<Classification, String> {
            Err("model not loaded".to_string())
        }
    }

    fn processor(native_text: &'static str, classifier: Arc<dyn Classifier>) -> BillProcessor {
        let ocr = Arc::new(OcrContext::new(
            OcrReaderHandle::new("onnx", || {
                Err(OcrError::ModelLoad("missing det.onnx".to_string()))
            }),
            None,
        ));
        let pipeline = TextExtractionPipeline::builder(FaturaConfig::default())
            .with_native_extractors(vec![Box::new(StaticText(native_text))])
            .with_renderer(Box::new(NoPages))
            .with_ocr_context(ocr)
            .build()
            .unwrap();
        BillProcessor::new(
            pipeline,
            classifier,
            StructuredFieldExtractor::new(RuleSet::builtin().unwrap()),
        )
    }

    fn bill_file() -> (tempfile::TempDir, Document) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conta.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        (dir, Document::from_path(path))
    }

    #[test]
    fn test_normalizer_keeps_letters_only() {
        assert_eq!(
            LowercaseNormalizer.normalize("TOTAL A PAGAR: R$ 87,10\nÁgua"),
            "total a pagar r água"
        );
        assert_eq!(LowercaseNormalizer.normalize("12/09 - 45,00"), "");
    }

    #[test]
    fn test_process_document() {
        let (_dir, document) = bill_file();
        let processor = processor(
            "SANEAMENTO BASICO DO ESTADO TOTAL A PAGAR R$ 87,10 VENCIMENTO 10/10/2025",
            Arc::new(FixedClassifier::new("agua")),
        );

        let outcome = processor.process_document(&document).unwrap();
        assert_eq!(outcome.category, "agua");
        assert_eq!(outcome.confidence, 1.0);
        assert_eq!(outcome.method.as_deref(), Some("static"));
        assert_eq!(
            outcome.details.get("valor"),
            Some(&FieldValue::Amount("87.10".parse().unwrap()))
        );
    }

    #[test]
    fn test_extraction_failure_carries_ocr_reason() {
        let (_dir, document) = bill_file();
        let processor = processor("", Arc::new(FixedClassifier::new("agua")));

        match processor.process_document(&document).unwrap_err() {
            ProcessError::ExtractionFailed {
                document,
                ocr_failure,
            } => {
                assert_eq!(document, "conta.pdf");
                assert!(ocr_failure.unwrap().contains("missing det.onnx"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_after_normalization() {
        let (_dir, document) = bill_file();
        let processor = processor(
            "0000 1111 2222 3333 4444 5555 6666 7777 8888 9999 0000 1111 2222",
            Arc::new(FixedClassifier::new("agua")),
        );

        assert!(matches!(
            processor.process_document(&document),
            Err(ProcessError::EmptyAfterNormalization)
        ));
    }

    #[test]
    fn test_process_text() {
        let processor = processor("", Arc::new(FixedClassifier::new("telefone")));

        let outcome = processor
            .process_text("Vencimento: 05/11/2025 Total a Pagar R$ 59,90")
            .unwrap();
        assert_eq!(outcome.method, None);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "category": "telefone",
                "confidence": 1.0,
                "details": {"valor": 59.9, "data_vencimento": "2025-11-05", "numero": null}
            })
        );

        assert!(matches!(processor.process_text("  "), Err(ProcessError::EmptyText)));
    }

    #[test]
    fn test_classifier_failure() {
        let processor = processor("", Arc::new(Refusing));
        assert!(matches!(
            processor.process_text("conta de luz"),
            Err(ProcessError::Classifier(msg)) if msg == "model not loaded"
        ));
    }
}

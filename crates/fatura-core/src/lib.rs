//! Core library for utility-bill processing.
//!
//! This crate provides:
//! - Layered text recovery from bill PDFs (embedded text, then OCR)
//! - OCR engines behind lazily-initialized, shared handles
//! - Category-driven field extraction from a declarative rule table
//! - An end-to-end bill processor around a pluggable classifier

pub mod config;
pub mod error;
pub mod fields;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod processor;

pub use config::{ArbitrationMode, EngineKind, FaturaConfig};
pub use error::{FaturaError, Result};
pub use fields::{ExtractedFields, FieldValue, RuleSet, StructuredFieldExtractor};
pub use ocr::{HealthReport, OcrContext, OcrStatus};
pub use pdf::Document;
pub use pipeline::{ExtractionAttempt, ExtractionReport, TextExtractionPipeline};
pub use processor::{
    BillProcessor, Classification, Classifier, FixedClassifier, LowercaseNormalizer,
    ProcessError, ProcessOutcome, TextNormalizer,
};

//! OCR layer: page preprocessing, engines, and the shared engine context.

mod handle;
mod preprocessing;
#[cfg(feature = "onnx")]
mod pure_engine;
mod tesseract;

pub use handle::{EngineState, HealthReport, OcrContext, OcrReaderHandle, OcrStatus};
pub use preprocessing::{ImagePreprocessor, ThresholdMethod};
#[cfg(feature = "onnx")]
pub use pure_engine::PureOcrEngine;
pub use tesseract::TesseractEngine;

use image::GrayImage;

use crate::config::{EngineKind, OcrConfig};
use crate::error::OcrError;

/// An OCR backend that turns a preprocessed page into text.
///
/// Engines are not assumed to be reentrant; [`OcrReaderHandle`] serializes
/// calls into each one.
pub trait TextRecognizer: Send {
    /// Engine name used in logs.
    fn name(&self) -> &str;

    /// Recognize all text on the page, in reading order.
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;
}

/// Construct the engine of the given kind. This is the expensive step the
/// handles defer until first use.
pub fn create_engine(
    kind: EngineKind,
    config: &OcrConfig,
) -> Result<Box<dyn TextRecognizer>, OcrError> {
    match kind {
        EngineKind::Tesseract => Ok(Box::new(TesseractEngine::from_config(&config.tesseract)?)),
        #[cfg(feature = "onnx")]
        EngineKind::Onnx => Ok(Box::new(PureOcrEngine::from_dir(
            &config.model_dir,
            config.strip_unknown,
        )?)),
        #[cfg(not(feature = "onnx"))]
        EngineKind::Onnx => Err(OcrError::Unsupported(
            "onnx (built without the `onnx` feature)".to_string(),
        )),
    }
}

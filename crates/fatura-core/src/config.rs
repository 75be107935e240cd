//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::FaturaError;

/// Main configuration for the fatura pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaturaConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Native text must be longer than this (in characters) to be accepted.
    pub min_text_length: usize,

    /// Maximum pages to OCR (0 = unlimited).
    pub max_pages: u32,

    /// Path to the `pdftoppm` binary.
    pub pdftoppm_path: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            min_text_length: 50,
            max_pages: 0,
            pdftoppm_path: "pdftoppm".to_string(),
        }
    }
}

/// Which OCR backend a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// ONNX text detection + recognition models.
    Onnx,
    /// The Tesseract command-line engine.
    Tesseract,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Onnx => write!(f, "onnx"),
            EngineKind::Tesseract => write!(f, "tesseract"),
        }
    }
}

/// How per-page output is chosen when two engines are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbitrationMode {
    /// Primary engine only.
    Single,
    /// Run both engines, keep the longer output (ties go to primary).
    Longest,
    /// Run the secondary engine only when the primary returns nothing.
    Fallback,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run the OCR layer when native extraction fails.
    pub enabled: bool,

    /// Treat an unavailable OCR engine as a fatal configuration fault.
    pub required: bool,

    /// Primary engine (wins ties).
    pub primary: EngineKind,

    /// Secondary engine for arbitration.
    pub secondary: Option<EngineKind>,

    /// Per-page arbitration mode.
    pub arbitration: ArbitrationMode,

    /// Minimum OCR output length (in characters) to accept the result.
    pub min_text_length: usize,

    /// Apply a median filter before thresholding.
    pub denoise: bool,

    /// Adaptive threshold window (odd, in pixels).
    pub threshold_block_size: u32,

    /// Constant subtracted from the local mean.
    pub threshold_bias: i32,

    /// Directory containing `det.onnx`, `latin_rec.onnx` and `latin_dict.txt`.
    pub model_dir: PathBuf,

    /// Replace `[UNK]` tokens emitted by the ONNX recognizer with spaces.
    pub strip_unknown: bool,

    /// Tesseract settings.
    pub tesseract: TesseractConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            primary: EngineKind::Onnx,
            secondary: Some(EngineKind::Tesseract),
            arbitration: ArbitrationMode::Longest,
            min_text_length: 1,
            denoise: false,
            threshold_block_size: 11,
            threshold_bias: 2,
            model_dir: PathBuf::from("models"),
            strip_unknown: true,
            tesseract: TesseractConfig::default(),
        }
    }
}

/// Tesseract command-line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Path to the `tesseract` binary.
    pub path: String,

    /// Language packs, `+`-separated.
    pub languages: String,

    /// Page segmentation mode.
    pub psm: Option<u8>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            path: "tesseract".to_string(),
            languages: "por+eng".to_string(),
            psm: None,
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rule table to load instead of the built-in one.
    pub rules_path: Option<PathBuf>,
}

impl FaturaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, FaturaError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| FaturaError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), FaturaError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| FaturaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let config = FaturaConfig::default();
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.pdf.min_text_length, 50);
        assert_eq!(config.ocr.arbitration, ArbitrationMode::Longest);
        assert_eq!(config.ocr.threshold_block_size, 11);
        assert_eq!(config.ocr.threshold_bias, 2);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "ocr": { "arbitration": "fallback", "secondary": null } }"#;
        let config: FaturaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ocr.arbitration, ArbitrationMode::Fallback);
        assert_eq!(config.ocr.secondary, None);
        assert_eq!(config.ocr.primary, EngineKind::Onnx);
        assert_eq!(config.pdf.min_text_length, 50);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = FaturaConfig::default();
        config.ocr.enabled = false;
        config.save(&path).unwrap();

        let loaded = FaturaConfig::from_file(&path).unwrap();
        assert!(!loaded.ocr.enabled);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FaturaConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, FaturaError::Config(_)));
    }
}

//! Tesseract OCR through its command-line interface.

use std::process::Command;

use image::GrayImage;
use tracing::{debug, info};

use crate::config::TesseractConfig;
use crate::error::OcrError;

use super::TextRecognizer;

/// Runs the `tesseract` binary on a temporary PNG and reads text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    languages: String,
    psm: Option<u8>,
}

impl TesseractEngine {
    /// Verify the binary runs and build an engine from configuration.
    pub fn from_config(config: &TesseractConfig) -> Result<Self, OcrError> {
        let output = Command::new(&config.path)
            .arg("--version")
            .output()
            .map_err(|e| OcrError::ModelLoad(format!("failed to run {}: {}", config.path, e)))?;

        if !output.status.success() {
            return Err(OcrError::ModelLoad(format!(
                "{} --version exited with {}",
                config.path,
                output.status.code().unwrap_or(-1)
            )));
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        info!(
            "Found {} (languages: {})",
            banner.lines().next().unwrap_or("tesseract").trim(),
            config.languages
        );

        Ok(Self {
            binary: config.path.clone(),
            languages: config.languages.clone(),
            psm: config.psm,
        })
    }

    fn command(&self, input: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(input).arg("stdout").arg("-l").arg(&self.languages);
        if let Some(psm) = self.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd
    }
}

impl TextRecognizer for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| OcrError::Recognition(format!("failed to create temp dir: {}", e)))?;
        let input = temp_dir.path().join("page.png");
        image
            .save(&input)
            .map_err(|e| OcrError::Recognition(format!("failed to write page image: {}", e)))?;

        let output = self
            .command(&input)
            .output()
            .map_err(|e| OcrError::Recognition(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(OcrError::Recognition(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} chars", text.len());
        Ok(text)
    }
}

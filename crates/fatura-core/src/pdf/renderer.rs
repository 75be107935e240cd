//! Page rasterization through Poppler's `pdftoppm`.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, trace};

use super::{load_document, PageRenderer, Result};
use crate::error::PdfError;

/// Renders pages by shelling out to `pdftoppm`, one page per call.
///
/// Each call writes a single PNG into a fresh temporary directory which is
/// removed as soon as the bitmap has been decoded.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    binary: String,
}

impl PopplerRenderer {
    /// Create a renderer that uses `pdftoppm` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: "pdftoppm".to_string(),
        }
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for PopplerRenderer {
    fn page_count(&self, path: &Path) -> Result<u32> {
        let data = std::fs::read(path)?;
        let (doc, _) = load_document(&data)?;
        Ok(doc.get_pages().len() as u32)
    }

    fn render_page(&self, path: &Path, page: u32, dpi: u32) -> Result<DynamicImage> {
        if page == 0 {
            return Err(PdfError::InvalidPage(page));
        }

        let temp_dir = tempfile::tempdir()?;
        let prefix = temp_dir.path().join("page");

        trace!("Rendering page {} of {} at {} dpi", page, path.display(), dpi);

        let output = Command::new(&self.binary)
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|e| PdfError::Render {
                page,
                reason: format!("failed to run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PdfError::Render {
                page,
                reason: format!(
                    "{} exited with {}: {}",
                    self.binary,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        let png = prefix.with_extension("png");
        let image = image::open(&png).map_err(|e| PdfError::Render {
            page,
            reason: format!("failed to decode {}: {}", png.display(), e),
        })?;

        debug!("Rendered page {}: {}x{}", page, image.width(), image.height());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_zero_is_invalid() {
        let renderer = PopplerRenderer::new();
        let err = renderer
            .render_page(Path::new("/nonexistent.pdf"), 0, 300)
            .unwrap_err();
        assert!(matches!(err, PdfError::InvalidPage(0)));
    }

    #[test]
    fn test_missing_binary_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("bill.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let renderer = PopplerRenderer::new().with_binary("/nonexistent/pdftoppm");
        let err = renderer.render_page(&pdf, 1, 300).unwrap_err();
        assert!(matches!(err, PdfError::Render { page: 1, .. }));
    }

    #[test]
    fn test_page_count_of_missing_file_is_io_error() {
        let renderer = PopplerRenderer::new();
        let err = renderer.page_count(Path::new("/nonexistent/bill.pdf")).unwrap_err();
        assert!(matches!(err, PdfError::Io(_)));
    }
}

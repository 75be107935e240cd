//! Image preprocessing for OCR.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{box_filter, median_filter, separable_filter_equal};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::{FaturaError, OcrError};

/// How the local threshold around each pixel is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMethod {
    /// Gaussian-weighted neighbourhood mean.
    Gaussian,
    /// Plain box mean.
    Mean,
}

/// Turns a rendered page into a binary image for the OCR engines.
///
/// Grayscale conversion, optional median denoise, then adaptive
/// thresholding: a pixel becomes white when it is brighter than its local
/// mean minus `bias`, black otherwise. Dimensions never change.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Threshold window in pixels (odd).
    block_size: u32,
    /// Constant subtracted from the local mean.
    bias: i32,
    /// Apply a 3x3 median filter before thresholding.
    denoise: bool,
    method: ThresholdMethod,
}

impl ImagePreprocessor {
    /// Create a preprocessor tuned for 300 dpi scans.
    pub fn new() -> Self {
        Self {
            block_size: 11,
            bias: 2,
            denoise: false,
            method: ThresholdMethod::Gaussian,
        }
    }

    /// Build from OCR configuration, rejecting unusable window sizes.
    pub fn from_config(config: &OcrConfig) -> Result<Self, FaturaError> {
        let block_size = config.threshold_block_size;
        if block_size < 3 || block_size % 2 == 0 {
            return Err(FaturaError::Config(format!(
                "threshold_block_size must be odd and at least 3, got {}",
                block_size
            )));
        }

        Ok(Self::new()
            .with_block_size(block_size)
            .with_bias(config.threshold_bias)
            .with_denoise(config.denoise))
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_bias(mut self, bias: i32) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_denoise(mut self, denoise: bool) -> Self {
        self.denoise = denoise;
        self
    }

    pub fn with_method(mut self, method: ThresholdMethod) -> Self {
        self.method = method;
        self
    }

    /// Produce the binary image handed to the OCR engines.
    pub fn prepare(&self, image: &DynamicImage) -> Result<GrayImage, OcrError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::InvalidImage(format!(
                "empty image {}x{}",
                image.width(),
                image.height()
            )));
        }

        let mut gray = image.to_luma8();
        if self.denoise {
            gray = median_filter(&gray, 1, 1);
        }

        let binary = self.adaptive_threshold(&gray);
        debug!(
            "Preprocessed {}x{} image (block={}, bias={}, denoise={})",
            binary.width(),
            binary.height(),
            self.block_size,
            self.bias,
            self.denoise
        );
        Ok(binary)
    }

    fn adaptive_threshold(&self, image: &GrayImage) -> GrayImage {
        let local_mean = match self.method {
            ThresholdMethod::Gaussian => {
                separable_filter_equal(image, &gaussian_kernel(self.block_size))
            }
            ThresholdMethod::Mean => {
                let radius = self.block_size / 2;
                box_filter(image, radius, radius)
            }
        };

        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let threshold = local_mean.get_pixel(x, y)[0] as i32 - self.bias;
            if image.get_pixel(x, y)[0] as i32 > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized 1-D Gaussian weights for a window of `size` pixels.
///
/// Sigma follows the usual derivation from the window size,
/// `0.3 * ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page_with_text_block() -> DynamicImage {
        // Light paper with a dark 10x4 "glyph" in the middle.
        let mut img = RgbImage::from_pixel(40, 20, Rgb([230, 230, 225]));
        for y in 8..12 {
            for x in 15..25 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_prepare_preserves_dimensions() {
        let preprocessor = ImagePreprocessor::new();
        let binary = preprocessor.prepare(&page_with_text_block()).unwrap();
        assert_eq!(binary.dimensions(), (40, 20));
    }

    #[test]
    fn test_prepare_outputs_only_black_and_white() {
        let preprocessor = ImagePreprocessor::new().with_denoise(true);
        let binary = preprocessor.prepare(&page_with_text_block()).unwrap();
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_dark_text_becomes_black_and_paper_white() {
        for method in [ThresholdMethod::Gaussian, ThresholdMethod::Mean] {
            let preprocessor = ImagePreprocessor::new().with_method(method);
            let binary = preprocessor.prepare(&page_with_text_block()).unwrap();
            assert_eq!(binary.get_pixel(16, 9)[0], 0, "{:?}", method);
            assert_eq!(binary.get_pixel(2, 2)[0], 255, "{:?}", method);
        }
    }

    #[test]
    fn test_uniform_image_is_all_white() {
        // Every pixel equals its local mean, which is above mean - bias.
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([128])));
        let binary = ImagePreprocessor::new().prepare(&img).unwrap();
        assert!(binary.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(matches!(
            ImagePreprocessor::new().prepare(&img),
            Err(OcrError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(11);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((kernel[0] - kernel[10]).abs() < 1e-6);
        assert!(kernel[5] > kernel[4]);
    }

    #[test]
    fn test_from_config_rejects_even_block_size() {
        let mut config = OcrConfig::default();
        config.threshold_block_size = 10;
        assert!(ImagePreprocessor::from_config(&config).is_err());

        config.threshold_block_size = 15;
        assert!(ImagePreprocessor::from_config(&config).is_ok());
    }
}

//! Image preprocessing: raw encoded bytes to a normalized model input tensor.

use crate::config::{ModelConfig, TensorLayout};
use crate::error::ClassifierError;
use image::imageops::FilterType;

/// Dense `f32` input tensor for a single image (batch size 1)
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

/// Converts encoded images into model input tensors.
///
/// Every image is resized to the model's input size, scaled to [0, 1] and
/// normalized per channel with the configured mean and standard deviation.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
    layout: TensorLayout,
}

impl ImagePreprocessor {
    pub fn new(width: u32, height: u32, mean: [f32; 3], std: [f32; 3], layout: TensorLayout) -> Self {
        Self {
            width,
            height,
            mean,
            std,
            layout,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.input_width,
            config.input_height,
            config.mean,
            config.std,
            config.layout,
        )
    }

    /// Decode and preprocess an image. The format is detected from the bytes.
    pub fn process(&self, bytes: &[u8]) -> Result<ImageTensor, ClassifierError> {
        const NORM_SCALE: f32 = 1. / 255.;

        let rgb = image::load_from_memory(bytes)
            .map_err(|e| ClassifierError::inference(format!("failed to decode image: {e}")))?
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();

        let (w, h) = (self.width as usize, self.height as usize);
        let plane = w * h;
        let mut data = vec![0f32; plane * 3];

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = (pixel[c] as f32 * NORM_SCALE - self.mean[c]) / self.std[c];
                let offset = match self.layout {
                    TensorLayout::Nchw => c * plane + y * w + x,
                    TensorLayout::Nhwc => (y * w + x) * 3 + c,
                };
                data[offset] = value;
            }
        }

        Ok(ImageTensor {
            shape: self.shape(),
            data,
        })
    }

    /// Shape of the tensors this preprocessor produces
    pub fn shape(&self) -> Vec<i64> {
        let (w, h) = (self.width as i64, self.height as i64);
        match self.layout {
            TensorLayout::Nchw => vec![1, 3, h, w],
            TensorLayout::Nhwc => vec![1, h, w, 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_nchw_shape_and_values() {
        let preprocessor =
            ImagePreprocessor::new(4, 2, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0], TensorLayout::Nchw);

        let tensor = preprocessor.process(&solid_png(8, 8, [255, 0, 51])).unwrap();

        assert_eq!(tensor.shape, vec![1, 3, 2, 4]);
        assert_eq!(tensor.data.len(), 3 * 2 * 4);
        // First plane is red, then green, then blue.
        assert!(tensor.data[..8].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(tensor.data[8..16].iter().all(|&v| v.abs() < 1e-6));
        assert!(tensor.data[16..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_nhwc_interleaves_channels() {
        let preprocessor =
            ImagePreprocessor::new(2, 2, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0], TensorLayout::Nhwc);

        let tensor = preprocessor.process(&solid_png(3, 3, [255, 0, 51])).unwrap();

        assert_eq!(tensor.shape, vec![1, 2, 2, 3]);
        for pixel in tensor.data.chunks(3) {
            assert!((pixel[0] - 1.0).abs() < 1e-6);
            assert!(pixel[1].abs() < 1e-6);
            assert!((pixel[2] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalization() {
        let preprocessor =
            ImagePreprocessor::new(1, 1, [0.5, 0.5, 0.5], [0.5, 0.5, 0.5], TensorLayout::Nchw);

        let tensor = preprocessor.process(&solid_png(1, 1, [255, 0, 255])).unwrap();

        assert!((tensor.data[0] - 1.0).abs() < 1e-6);
        assert!((tensor.data[1] + 1.0).abs() < 1e-6);
        assert!((tensor.data[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_undecodable_bytes() {
        let preprocessor = ImagePreprocessor::from_config(&ModelConfig::default());
        let err = preprocessor.process(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ClassifierError::InferenceFailure(_)));
    }
}

//! Image preprocessing: raw upload bytes to a `1 x 3 x S x S` tensor

use crate::model_config::InputConfig;
use candle_core::{Device, Tensor};
use dermascan_core::{Error, Result};
use image::imageops::FilterType;
use image::ImageFormat;

/// Converts uploaded bytes into the tensor the classifier expects.
///
/// Pure and deterministic: the same bytes always produce the same tensor.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    size: u32,
    mean: Option<[f32; 3]>,
    std: Option<[f32; 3]>,
    device: Device,
}

impl ImagePreprocessor {
    /// Create a preprocessor for a square input resolution, values in [0, 1]
    pub fn new(size: usize) -> Self {
        Self {
            size: size as u32,
            mean: None,
            std: None,
            device: Device::Cpu,
        }
    }

    /// Create a preprocessor from a schema's input section
    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            size: config.size as u32,
            mean: config.mean,
            std: config.std,
            device: Device::Cpu,
        }
    }

    /// Apply per-channel normalization after scaling
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = Some(mean);
        self.std = Some(std);
        self
    }

    /// Place produced tensors on a specific device
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Square input resolution
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Decode, resize, scale to [0, 1], and add the batch dimension
    pub fn transform(&self, bytes: &[u8]) -> Result<Tensor> {
        if bytes.is_empty() {
            return Err(Error::invalid_image("image data is empty"));
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| Error::invalid_image(format!("could not decode image: {}", e)))?;
        let rgb = decoded.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);

        let side = self.size as usize;
        let plane = side * side;
        let mut data = vec![0f32; 3 * plane];

        // HWC interleaved pixels to CHW planes
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                let mut value = pixel.0[c] as f32 / 255.0;
                if let (Some(mean), Some(std)) = (self.mean, self.std) {
                    value = (value - mean[c]) / std[c];
                }
                data[c * plane + i] = value;
            }
        }

        Tensor::from_vec(data, (1, 3, side, side), &self.device)
            .map_err(|e| Error::internal(format!("failed to build input tensor: {}", e)))
    }
}

/// Identify the image format from its leading bytes
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

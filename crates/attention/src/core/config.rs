//! Construction-time configuration for the fused attention step.

use candle_core::{DType, Device};

/// Dimensions and placement of the attention projections.
#[derive(Debug, Clone)]
pub struct Config {
    /// Width of the embedding space shared with the encoder outputs.
    pub emb_dim: usize,
    /// Width of the decoder convolution channels.
    pub hid_dim: usize,
    /// Storage dtype for the projection parameters.
    pub dtype: DType,
    pub device: Device,
}

impl Config {
    pub fn new(emb_dim: usize, hid_dim: usize, dtype: DType, device: Device) -> Self {
        Self {
            emb_dim,
            hid_dim,
            dtype,
            device,
        }
    }
}

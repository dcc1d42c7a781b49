use std::{fs, path::Path};

use candle_core::{DType, Device, Error, Result as CandleResult};
use embedding::DEFAULT_MAX_POSITIONS;
use serde::{Deserialize, Serialize};

use crate::{
    device::DeviceSpec,
    errors::{ModelError, Result},
};

/// Storage precision of the parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Bf16,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Precision::Fp32 => DType::F32,
            Precision::Fp16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

fn default_max_positions() -> usize {
    DEFAULT_MAX_POSITIONS
}

/// File-level description of a convolutional sequence-to-sequence model.
///
/// The architectural fields and `device` are required; `max_positions`,
/// `precision` and `seed` fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seq2SeqConfig {
    pub input_vocab_size: usize,
    pub output_vocab_size: usize,
    pub emb_dim: usize,
    pub hid_dim: usize,
    pub n_layers: usize,
    /// Odd, so the encoder can pad symmetrically.
    pub kernel_size: usize,
    pub dropout_p: f32,
    /// Fill value of the decoder's causal padding.
    pub pad_token_id: u32,
    pub device: DeviceSpec,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default)]
    pub precision: Precision,
    /// Base seed for dropout masks.
    #[serde(default)]
    pub seed: u64,
}

impl Seq2SeqConfig {
    /// Loads a TOML (`.toml`, `.tml` or no extension) or JSON (`.json`) file and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Seq2SeqConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(ModelError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reports every violated invariant at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("input_vocab_size", self.input_vocab_size),
            ("output_vocab_size", self.output_vocab_size),
            ("emb_dim", self.emb_dim),
            ("hid_dim", self.hid_dim),
            ("n_layers", self.n_layers),
            ("kernel_size", self.kernel_size),
            ("max_positions", self.max_positions),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            }
        }
        if self.kernel_size % 2 == 0 {
            errors.push(format!(
                "kernel_size must be odd, got {}",
                self.kernel_size
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_p) {
            errors.push(format!(
                "dropout_p must be in [0, 1), got {}",
                self.dropout_p
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(errors))
        }
    }

    fn dropout(&self) -> Option<f32> {
        (self.dropout_p > 0.0).then_some(self.dropout_p)
    }

    /// Runtime configuration of the encoder on `device`.
    pub fn encoder_config(&self, device: &Device) -> EncoderConfig {
        EncoderConfig {
            input_vocab_size: self.input_vocab_size,
            emb_dim: self.emb_dim,
            hid_dim: self.hid_dim,
            n_layers: self.n_layers,
            kernel_size: self.kernel_size,
            dropout_p: self.dropout(),
            max_positions: self.max_positions,
            dtype: self.precision.dtype(),
            device: device.clone(),
            seed: self.seed,
        }
    }

    /// Runtime configuration of the decoder on `device`.
    pub fn decoder_config(&self, device: &Device) -> DecoderConfig {
        DecoderConfig {
            output_vocab_size: self.output_vocab_size,
            emb_dim: self.emb_dim,
            hid_dim: self.hid_dim,
            n_layers: self.n_layers,
            kernel_size: self.kernel_size,
            dropout_p: self.dropout(),
            pad_token_id: self.pad_token_id,
            max_positions: self.max_positions,
            dtype: self.precision.dtype(),
            device: device.clone(),
            seed: self.seed.wrapping_add(1),
        }
    }
}

/// Runtime configuration for the [`Encoder`](crate::Encoder).
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub input_vocab_size: usize,
    pub emb_dim: usize,
    pub hid_dim: usize,
    pub n_layers: usize,
    pub kernel_size: usize,
    pub dropout_p: Option<f32>,
    pub max_positions: usize,
    pub dtype: DType,
    pub device: Device,
    pub seed: u64,
}

impl EncoderConfig {
    pub fn validate(&self) -> CandleResult<()> {
        check_common(
            "encoder",
            self.input_vocab_size,
            self.emb_dim,
            self.hid_dim,
            self.n_layers,
            self.kernel_size,
            self.max_positions,
            self.dropout_p,
        )?;
        if self.kernel_size % 2 == 0 {
            return Err(Error::Msg(format!(
                "encoder kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        Ok(())
    }
}

/// Runtime configuration for the [`Decoder`](crate::Decoder).
///
/// The decoder pads on the left only, so any `kernel_size >= 1` is accepted.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub output_vocab_size: usize,
    pub emb_dim: usize,
    pub hid_dim: usize,
    pub n_layers: usize,
    pub kernel_size: usize,
    pub dropout_p: Option<f32>,
    pub pad_token_id: u32,
    pub max_positions: usize,
    pub dtype: DType,
    pub device: Device,
    pub seed: u64,
}

impl DecoderConfig {
    pub fn validate(&self) -> CandleResult<()> {
        check_common(
            "decoder",
            self.output_vocab_size,
            self.emb_dim,
            self.hid_dim,
            self.n_layers,
            self.kernel_size,
            self.max_positions,
            self.dropout_p,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn check_common(
    side: &str,
    vocab_size: usize,
    emb_dim: usize,
    hid_dim: usize,
    n_layers: usize,
    kernel_size: usize,
    max_positions: usize,
    dropout_p: Option<f32>,
) -> CandleResult<()> {
    for (name, value) in [
        ("vocab_size", vocab_size),
        ("emb_dim", emb_dim),
        ("hid_dim", hid_dim),
        ("n_layers", n_layers),
        ("kernel_size", kernel_size),
        ("max_positions", max_positions),
    ] {
        if value == 0 {
            return Err(Error::Msg(format!(
                "{side} {name} must be greater than zero"
            )));
        }
    }
    if let Some(p) = dropout_p {
        if !(0.0..1.0).contains(&p) {
            return Err(Error::Msg(format!(
                "{side} dropout_p must be in [0, 1), got {p}"
            )));
        }
    }
    Ok(())
}

//! Parameter initialisation policies shared by projections and convolutions.
//!
//! Fan-in and fan-out are supplied by the caller: `in_dim` / `out_dim` for a
//! dense layer, `in_channels * kernel` / `out_channels * kernel` for a 1-D
//! convolution. [`Init::default_uniform`] reproduces the usual framework
//! default (Kaiming uniform with negative slope `sqrt(5)`, i.e. a bound of
//! `1 / sqrt(fan_in)`).

use candle_core::{DType, Device, Result, Shape, Tensor, Var};

use crate::checks;

/// Weight initialisation policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
    /// Kaiming/He uniform initialisation.
    KaimingUniform { negative_slope: f64 },
    /// Kaiming/He normal initialisation.
    KaimingNormal { negative_slope: f64 },
    /// Scales another policy.
    Scaled { base: Box<Init>, scale: f64 },
}

impl Init {
    /// Kaiming uniform with `a = sqrt(5)`.
    pub fn default_uniform() -> Self {
        Init::KaimingUniform {
            negative_slope: 5f64.sqrt(),
        }
    }

    /// Convenience helper to scale an existing policy.
    pub fn scaled(base: Init, scale: f64) -> Self {
        Self::Scaled {
            base: Box::new(base),
            scale,
        }
    }

    /// Samples an `f32` tensor of `shape` and casts it to `dtype`.
    pub fn sample<S: Into<Shape>>(
        &self,
        shape: S,
        fan_in: usize,
        fan_out: usize,
        device: &Device,
        dtype: DType,
    ) -> Result<Tensor> {
        let shape = shape.into();
        let (fan_in, fan_out) = (fan_in as f64, fan_out as f64);
        let sampled = match self {
            Init::XavierUniform => {
                let bound = (6.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)?
            }
            Init::XavierNormal => {
                let std = (2.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::randn(0f32, std as f32, shape, device)?
            }
            Init::KaimingUniform { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                let bound = 3f64.sqrt() * gain / fan_in.sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)?
            }
            Init::KaimingNormal { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                let std = gain / fan_in.sqrt();
                Tensor::randn(0f32, std as f32, shape, device)?
            }
            Init::Scaled { base, scale } => base
                .sample(shape, fan_in as usize, fan_out as usize, device, DType::F32)?
                .affine(*scale, 0.0)?,
        };
        into_dtype("init.sample", sampled, dtype)
    }
}

/// How bias vectors are initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasInit {
    Zeros,
    /// Uniform in `±1 / sqrt(fan_in)`.
    FanInUniform,
}

impl BiasInit {
    pub fn sample(&self, len: usize, fan_in: usize, device: &Device, dtype: DType) -> Result<Tensor> {
        match self {
            BiasInit::Zeros => Tensor::zeros(len, dtype, device),
            BiasInit::FanInUniform => {
                let bound = if fan_in == 0 {
                    0.0
                } else {
                    1.0 / (fan_in as f64).sqrt()
                };
                let sampled = Tensor::rand(-bound as f32, bound as f32, len, device)?;
                into_dtype("init.bias", sampled, dtype)
            }
        }
    }
}

/// Wraps a freshly sampled tensor in a trainable [`Var`].
pub fn trainable(tensor: Tensor) -> Result<Var> {
    Var::from_tensor(&tensor)
}

fn into_dtype(name: &str, tensor: Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor)
    } else {
        checks::ensure_cast_supported(name, tensor.dtype(), dtype)?;
        tensor.to_dtype(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(tensor: &Tensor) -> Result<(f64, f64, f64)> {
        let values = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let n = values.len() as f64;
        let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|v| (f64::from(*v) - mean).powi(2))
            .sum::<f64>()
            / n;
        let max_abs = values.iter().fold(0f64, |acc, v| acc.max(f64::from(v.abs())));
        Ok((mean, var.sqrt(), max_abs))
    }

    #[test]
    fn default_uniform_is_bounded_by_inverse_sqrt_fan_in() -> Result<()> {
        let weight = Init::default_uniform().sample((64, 48), 48, 64, &Device::Cpu, DType::F32)?;
        let (_, _, max_abs) = stats(&weight)?;
        assert!(max_abs <= 1.0 / 48f64.sqrt() + 1e-6);
        Ok(())
    }

    #[test]
    fn glorot_normal_stats_are_reasonable() -> Result<()> {
        let weight = Init::XavierNormal.sample((64, 128), 128, 64, &Device::Cpu, DType::F32)?;
        let (mean, std, _) = stats(&weight)?;
        let expected = (2.0f64 / (128.0 + 64.0)).sqrt();
        assert!(mean.abs() < 5e-3);
        assert!((std - expected).abs() < expected * 0.25);
        Ok(())
    }

    #[test]
    fn scaled_policy_shrinks_spread() -> Result<()> {
        let init = Init::scaled(Init::KaimingUniform { negative_slope: 0.0 }, 0.5);
        let weight = init.sample((256, 256), 256, 256, &Device::Cpu, DType::F32)?;
        let (_, std, _) = stats(&weight)?;
        let expected = (2.0f64 / 256.0).sqrt() * 0.5;
        assert!((std - expected).abs() < expected * 0.25);
        Ok(())
    }

    #[test]
    fn fan_in_bias_respects_bound_and_dtype() -> Result<()> {
        let bias = BiasInit::FanInUniform.sample(32, 16, &Device::Cpu, DType::BF16)?;
        assert_eq!(bias.dtype(), DType::BF16);
        let (_, _, max_abs) = stats(&bias)?;
        assert!(max_abs <= 0.25 + 2e-2);
        Ok(())
    }
}

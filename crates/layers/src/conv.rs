//! One-dimensional convolutions over channel-first sequences.
//!
//! Inputs are shaped `(batch, in_channels, len)` and outputs
//! `(batch, out_channels, len)`. Two padding schemes keep the sequence length
//! unchanged:
//!
//! * [`ConvPadding::Same`] pads `(kernel - 1) / 2` zeros on both sides and
//!   therefore requires an odd kernel.
//! * [`ConvPadding::Causal`] prepends `kernel - 1` columns filled with a fixed
//!   value and adds nothing on the right, so output position `t` only sees
//!   input positions `<= t`.

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::{
    checks,
    dtypes::PrecisionPolicy,
    init::{trainable, BiasInit, Init},
};

/// Padding applied before the convolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvPadding {
    /// Symmetric zero padding of `(kernel - 1) / 2` on each side.
    Same,
    /// Left-only padding of `kernel - 1` columns filled with `fill`.
    Causal { fill: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conv1dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: ConvPadding,
}

impl Conv1dConfig {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: ConvPadding,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(Error::Msg("conv1d channels must be non-zero".into()));
        }
        if self.kernel_size == 0 {
            return Err(Error::Msg("conv1d kernel_size must be non-zero".into()));
        }
        if self.padding == ConvPadding::Same && self.kernel_size % 2 == 0 {
            return Err(Error::Msg(format!(
                "same-length conv1d requires an odd kernel_size, got {}",
                self.kernel_size
            )));
        }
        Ok(())
    }

    fn fan_in(&self) -> usize {
        self.in_channels * self.kernel_size
    }

    fn fan_out(&self) -> usize {
        self.out_channels * self.kernel_size
    }
}

/// Biased 1-D convolution with `Var` parameters.
#[derive(Debug, Clone)]
pub struct Conv1d {
    config: Conv1dConfig,
    weight: Var,
    bias: Var,
}

impl Conv1d {
    /// Constructs a convolution from a `(out, in, kernel)` weight and `(out,)` bias.
    pub fn new(config: Conv1dConfig, weight: Tensor, bias: Tensor) -> Result<Self> {
        config.validate()?;
        checks::expect_shape(
            "conv1d.weight",
            &weight,
            &[config.out_channels, config.in_channels, config.kernel_size],
        )?;
        checks::expect_shape("conv1d.bias", &bias, &[config.out_channels])?;
        checks::expect_same_dtype("conv1d.bias", &bias, "conv1d.weight", &weight)?;
        checks::expect_contiguous("conv1d.weight", &weight)?;
        Ok(Self {
            config,
            weight: trainable(weight)?,
            bias: trainable(bias)?,
        })
    }

    pub fn with_init(
        config: Conv1dConfig,
        init: &Init,
        bias_init: BiasInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        config.validate()?;
        let weight = init.sample(
            (config.out_channels, config.in_channels, config.kernel_size),
            config.fan_in(),
            config.fan_out(),
            device,
            dtype,
        )?;
        let bias = bias_init.sample(config.out_channels, config.fan_in(), device, dtype)?;
        Self::new(config, weight, bias)
    }

    /// Framework-default initialisation: Kaiming uniform weights, fan-in uniform bias.
    pub fn with_default_init(config: Conv1dConfig, device: &Device, dtype: DType) -> Result<Self> {
        Self::with_init(
            config,
            &Init::default_uniform(),
            BiasInit::FanInUniform,
            device,
            dtype,
        )
    }

    pub fn config(&self) -> &Conv1dConfig {
        &self.config
    }

    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![
            (format!("{scope}.weight"), self.weight.clone()),
            (format!("{scope}.bias"), self.bias.clone()),
        ]
    }

    /// Convolves `input` shaped `(batch, in_channels, len)`.
    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_channels_len("conv1d.input", input, self.config.in_channels)?;
        let (batch, _, len) = input.dims3()?;
        if batch == 0 || len == 0 {
            return Err(Error::Msg("conv1d input batch/len must be non-zero".into()));
        }

        let input = policy.cast_for_matmul(input)?;
        let kernel = policy.cast_for_matmul(self.weight.as_tensor())?;
        let bias = policy
            .cast_for_matmul(self.bias.as_tensor())?
            .reshape((1, self.config.out_channels, 1))?;

        let conved = match self.config.padding {
            ConvPadding::Same => {
                let pad = (self.config.kernel_size - 1) / 2;
                input.conv1d(&kernel, pad, 1, 1, 1)?
            }
            ConvPadding::Causal { fill } => {
                let padded = causal_pad(&input, self.config.kernel_size - 1, fill)?;
                padded.conv1d(&kernel, 0, 1, 1, 1)?
            }
        };
        let conved = conved.broadcast_add(&bias)?;
        policy.cast_to_storage(&conved)
    }
}

/// Prepends `width` columns of `fill` along the sequence axis of a `(batch, channels, len)` tensor.
pub fn causal_pad(input: &Tensor, width: usize, fill: f32) -> Result<Tensor> {
    if width == 0 {
        return Ok(input.clone());
    }
    let (batch, channels, _) = input.dims3()?;
    let padding = Tensor::full(fill, (batch, channels, width), input.device())?
        .to_dtype(input.dtype())?;
    Tensor::cat(&[&padding, input], 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(DType::F32)
    }

    #[test]
    fn same_padding_preserves_length_for_odd_kernels() -> Result<()> {
        let device = Device::Cpu;
        for kernel in [3usize, 5, 7] {
            let config = Conv1dConfig::new(6, 12, kernel, ConvPadding::Same);
            let conv = Conv1d::with_default_init(config, &device, DType::F32)?;
            for len in [kernel, kernel + 4] {
                let input = Tensor::randn(0f32, 1.0, (2, 6, len), &device)?;
                let out = conv.forward(&input, &policy())?;
                assert_eq!(out.dims(), &[2, 12, len]);
            }
        }
        Ok(())
    }

    #[test]
    fn same_padding_rejects_even_kernel() {
        let config = Conv1dConfig::new(4, 8, 4, ConvPadding::Same);
        let err = Conv1d::with_default_init(config, &Device::Cpu, DType::F32).unwrap_err();
        assert!(err.to_string().contains("odd kernel_size"));
    }

    #[test]
    fn causal_padding_preserves_length_and_hides_future() -> Result<()> {
        let device = Device::Cpu;
        let config = Conv1dConfig::new(3, 4, 3, ConvPadding::Causal { fill: 1.0 });
        let conv = Conv1d::with_default_init(config, &device, DType::F32)?;

        let base = Tensor::randn(0f32, 1.0, (1, 3, 6), &device)?;
        let prefix = base.narrow(2, 0, 3)?;
        let altered_tail = Tensor::randn(5f32, 1.0, (1, 3, 3), &device)?;
        let altered = Tensor::cat(&[&prefix, &altered_tail], 2)?;

        let out_base = conv.forward(&base, &policy())?;
        let out_altered = conv.forward(&altered, &policy())?;
        assert_eq!(out_base.dims(), &[1, 4, 6]);

        let diff = out_base
            .narrow(2, 0, 3)?
            .sub(&out_altered.narrow(2, 0, 3)?)?
            .abs()?
            .max_all()?
            .to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn causal_pad_fills_left_columns() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::zeros((1, 2, 2), DType::F32, &device)?;
        let padded = causal_pad(&input, 2, 7.0)?;
        assert_eq!(
            padded.to_vec3::<f32>()?,
            vec![vec![vec![7.0, 7.0, 0.0, 0.0], vec![7.0, 7.0, 0.0, 0.0]]]
        );
        Ok(())
    }

    #[test]
    fn kernel_of_ones_sums_causal_window() -> Result<()> {
        let device = Device::Cpu;
        let config = Conv1dConfig::new(1, 1, 2, ConvPadding::Causal { fill: 0.0 });
        let weight = Tensor::ones((1, 1, 2), DType::F32, &device)?;
        let bias = Tensor::zeros(1, DType::F32, &device)?;
        let conv = Conv1d::new(config, weight, bias)?;
        let input = Tensor::new(&[[[1f32, 2.0, 3.0, 4.0]]], &device)?;
        let out = conv.forward(&input, &policy())?;
        assert_eq!(out.to_vec3::<f32>()?, vec![vec![vec![1.0, 3.0, 5.0, 7.0]]]);
        Ok(())
    }
}

//! Dense affine projections between the embedding and hidden spaces.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` (or `(rows, in_dim)`)
//! and return tensors with `out_dim` as the last axis. Weights and activations
//! are promoted to [`PrecisionPolicy::compute`] for the matmul and the result is
//! cast back with [`PrecisionPolicy::cast_to_storage`].
//!
//! Parameters are held as [`Var`]s: an external optimizer holding the vars
//! returned by [`Linear::named_parameters`] updates this layer in place.

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::{
    checks,
    dtypes::PrecisionPolicy,
    init::{trainable, BiasInit, Init},
};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a biased projection.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }
}

/// Shared interface for affine projections.
pub trait LinearLayer: Send + Sync {
    /// Returns the static configuration used to validate inputs.
    fn config(&self) -> &LinearConfig;

    /// Applies the linear projection, promoting to the compute dtype when needed.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Dense affine projection with optional bias and mixed-precision aware forward pass.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        Ok(Self {
            config,
            weight: trainable(weight)?,
            bias: bias.map(trainable).transpose()?,
        })
    }

    /// Builds a linear layer with randomly initialised parameters.
    pub fn with_init(
        config: LinearConfig,
        init: &Init,
        bias_init: BiasInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let weight = init.sample(
            (config.output_dim, config.input_dim),
            config.input_dim,
            config.output_dim,
            device,
            dtype,
        )?;
        let bias = if config.bias {
            Some(bias_init.sample(config.output_dim, config.input_dim, device, dtype)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Framework-default initialisation: Kaiming uniform weights, fan-in uniform bias.
    pub fn with_default_init(config: LinearConfig, device: &Device, dtype: DType) -> Result<Self> {
        Self::with_init(
            config,
            &Init::default_uniform(),
            BiasInit::FanInUniform,
            device,
            dtype,
        )
    }

    /// Returns a handle to the current weight tensor.
    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Returns a handle to the bias tensor if present.
    pub fn bias(&self) -> Option<Tensor> {
        self.bias.as_ref().map(|bias| bias.as_tensor().clone())
    }

    /// Overwrites the weight in place; every holder of the var observes the update.
    pub fn copy_weight_from(&self, value: &Tensor) -> Result<()> {
        Self::validate_weight(&self.config, value)?;
        checks::expect_same_dtype("linear.weight", value, "linear.weight", self.weight.as_tensor())?;
        self.weight.set(value)
    }

    /// Overwrites the bias in place.
    pub fn copy_bias_from(&self, value: &Tensor) -> Result<()> {
        match &self.bias {
            Some(bias) => {
                Self::validate_bias(&self.config, Some(value))?;
                checks::expect_same_dtype("linear.bias", value, "linear.bias", bias.as_tensor())?;
                bias.set(value)
            }
            None => Err(Error::Msg("layer has no bias to copy into".into())),
        }
    }

    /// Trainable parameters under `scope` (`{scope}.weight`, `{scope}.bias`).
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear.weight",
            weight,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )?;
        checks::expect_contiguous("linear.weight", weight)?;
        Ok(())
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_rank("linear.bias", tensor, 1)?;
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])?;
                checks::expect_dtype_in(
                    "linear.bias",
                    tensor,
                    &[DType::F16, DType::BF16, DType::F32, DType::F64],
                )?;
                checks::expect_contiguous("linear.bias", tensor)?;
                Ok(())
            }
            (false, Some(_)) => Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => Ok(()),
        }
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        match hidden.dims() {
            [batch, seq, _] => {
                checks::expect_batch_seq_hidden("linear.input", hidden, self.config.input_dim)?;
                if *batch == 0 || *seq == 0 {
                    Err(Error::Msg("batch/seq dimensions must be non-zero".into()))
                } else {
                    Ok(())
                }
            }
            [_, hidden_dim] if *hidden_dim == self.config.input_dim => Ok(()),
            [_, hidden_dim] => Err(Error::Msg(format!(
                "expected last dim {} but received {}",
                self.config.input_dim, hidden_dim
            ))),
            _ => Err(Error::Msg(
                "linear expects input shaped [B, T, H_in] or [T, H_in]".into(),
            )),
        }
    }
}

impl LinearLayer for Linear {
    fn config(&self) -> &LinearConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(self.weight.as_tensor())?.t()?;

        let mut output = match input.dims() {
            [batch, seq, _] => {
                let (batch, seq) = (*batch, *seq);
                let flat = input.reshape((batch * seq, self.config.input_dim))?;
                flat.matmul(&weight_t)?
                    .reshape((batch, seq, self.config.output_dim))?
            }
            [_, _] => input.matmul(&weight_t)?,
            _ => unreachable!("validated above"),
        };

        if let Some(bias) = &self.bias {
            let bias = policy.cast_for_matmul(bias.as_tensor())?;
            output = output.broadcast_add(&bias)?;
        }

        policy.cast_to_storage(&output)
    }
}

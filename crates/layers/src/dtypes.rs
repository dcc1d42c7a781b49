//! Precision handling for parameters and activations.
//!
//! Parameters may be stored in `f16`/`bf16`, but convolutions, projections and
//! the attention softmax always run in at least `f32`. [`PrecisionPolicy`]
//! records the storage dtype alongside the compute and reduction dtypes so each
//! layer casts consistently on the way in and on the way out.

use candle_core::{DType, Result, Tensor};

use crate::checks;

/// Comparison tolerances matching the dtypes of a [`PrecisionPolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionEpsilons {
    /// Tolerance for values read back in the storage dtype.
    pub storage: f32,
    /// Tolerance for convolution, projection and gating results.
    pub compute: f32,
}

/// Dtypes used for storage, matmul/convolution work and reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
    reduction: DType,
}

impl PrecisionPolicy {
    /// Builds a policy from the parameter storage dtype.
    ///
    /// Half precision storage is promoted to `f32` for compute; reductions are
    /// always carried out in `f32`.
    pub fn from_parameter_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        Self {
            storage,
            compute,
            reduction: DType::F32,
        }
    }

    /// Returns the dtype used to store parameters and outputs.
    pub fn storage(&self) -> DType {
        self.storage
    }

    /// Returns the dtype used for convolutions, projections and activations.
    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Returns the dtype used for softmax normalisation.
    pub fn reduction(&self) -> DType {
        self.reduction
    }

    pub fn epsilons(&self) -> PrecisionEpsilons {
        PrecisionEpsilons {
            storage: epsilon_for(self.storage),
            compute: epsilon_for(self.compute),
        }
    }

    /// Casts a tensor to the compute dtype.
    pub fn cast_for_matmul(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor("policy.compute", tensor, self.compute)
    }

    /// Casts a tensor to the reduction dtype.
    pub fn cast_for_reduction(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor("policy.reduction", tensor, self.reduction)
    }

    /// Casts a tensor back to the storage dtype (or leaves it unchanged).
    pub fn cast_to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor("policy.storage", tensor, self.storage)
    }
}

fn cast_tensor(name: &str, tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        checks::ensure_cast_supported(name, tensor.dtype(), dtype)?;
        tensor.to_dtype(dtype)
    }
}

fn epsilon_for(dtype: DType) -> f32 {
    match dtype {
        DType::BF16 => 2e-2,
        DType::F16 => 5e-3,
        DType::F32 => 1e-5,
        DType::F64 => 1e-7,
        _ => 0.0,
    }
}

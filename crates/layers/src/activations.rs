//! Gated linear unit used after every convolution.
//!
//! The input is split into two equal halves `A` and `B` along `dim` and the
//! output is `A * sigmoid(B)`, halving that axis. Convolution outputs are
//! channel-first, so the model gates along `dim = 1`. Evaluation happens in the
//! compute dtype of the [`PrecisionPolicy`] and the result is cast back to
//! storage.

use candle_core::{Error, Result, Tensor};

use crate::dtypes::PrecisionPolicy;

/// Gated linear unit over a fixed axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glu {
    dim: usize,
}

impl Glu {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Channel-axis GLU for `(batch, channels, len)` tensors.
    pub fn channels() -> Self {
        Self::new(1)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let compute = policy.cast_for_matmul(input)?;
        let gated = glu(&compute, self.dim)?;
        policy.cast_to_storage(&gated)
    }
}

/// `A * sigmoid(B)` where `A`, `B` are the halves of `input` along `dim`.
pub fn glu(input: &Tensor, dim: usize) -> Result<Tensor> {
    let dims = input.dims();
    let size = *dims.get(dim).ok_or_else(|| {
        Error::Msg(format!("glu axis {dim} out of range for shape {:?}", dims))
    })?;
    if size % 2 != 0 {
        return Err(Error::Msg(format!(
            "glu requires an even size along axis {dim}, got {size}"
        )));
    }
    let half = size / 2;
    let value = input.narrow(dim, 0, half)?;
    let gate = input.narrow(dim, half, half)?.contiguous()?;
    value.mul(&candle_nn::ops::sigmoid(&gate)?)
}

//! Scaled residual connections.
//!
//! Every merge in the convolutional stack computes `(branch + residual) * scale`
//! with the fixed constant `scale = sqrt(0.5)`, which keeps the variance of two
//! roughly unit-variance signals near one. The scale is not a parameter.
//! Both operands must share shape and dtype; the addition runs in the compute
//! dtype of the [`PrecisionPolicy`].

use candle_core::{Result, Tensor};

use crate::{checks, dtypes::PrecisionPolicy};

/// `sqrt(0.5)`.
pub const RESIDUAL_SCALE: f64 = std::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledResidual {
    scale: f64,
}

impl Default for ScaledResidual {
    fn default() -> Self {
        Self::new(RESIDUAL_SCALE)
    }
}

impl ScaledResidual {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Returns `(branch + residual) * scale`.
    pub fn add(&self, branch: &Tensor, residual: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_shape("residual.branch", branch, residual.dims())?;
        checks::expect_same_dtype("residual.branch", branch, "residual.input", residual)?;

        let branch = policy.cast_for_matmul(branch)?;
        let residual = policy.cast_for_matmul(residual)?;
        let merged = branch.add(&residual)?.affine(self.scale, 0.0)?;
        policy.cast_to_storage(&merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn policy(dtype: DType) -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(dtype)
    }

    #[test]
    fn add_scales_the_sum() -> Result<()> {
        let device = Device::Cpu;
        let branch = Tensor::new(&[[[1.0f32, 2.0], [3.0, 4.0]]], &device)?;
        let parent = Tensor::new(&[[[1.0f32, 0.0], [-3.0, 4.0]]], &device)?;
        let out = ScaledResidual::default().add(&branch, &parent, &policy(DType::F32))?;
        let values = out.flatten_all()?.to_vec1::<f32>()?;
        let scale = RESIDUAL_SCALE as f32;
        let expected = [2.0 * scale, 2.0 * scale, 0.0, 8.0 * scale];
        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn preserves_shape_and_storage_dtype() -> Result<()> {
        let device = Device::Cpu;
        let dtype = DType::F16;
        let left = Tensor::randn(0f32, 1.0, (2, 4, 8), &device)?.to_dtype(dtype)?;
        let right = Tensor::randn(0f32, 1.0, (2, 4, 8), &device)?.to_dtype(dtype)?;
        let out = ScaledResidual::default().add(&left, &right, &policy(dtype))?;
        assert_eq!(out.dims(), &[2, 4, 8]);
        assert_eq!(out.dtype(), dtype);
        Ok(())
    }

    #[test]
    fn shape_mismatch_is_an_error() -> Result<()> {
        let device = Device::Cpu;
        let left = Tensor::zeros((1, 2, 3), DType::F32, &device)?;
        let right = Tensor::zeros((1, 3, 2), DType::F32, &device)?;
        assert!(ScaledResidual::default()
            .add(&left, &right, &policy(DType::F32))
            .is_err());
        Ok(())
    }
}

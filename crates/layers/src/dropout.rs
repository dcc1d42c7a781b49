//! Training-time dropout with a per-layer mode switch.
//!
//! In training mode each element is zeroed with probability `p` and the
//! survivors are scaled by `1 / (1 - p)`. In inference mode the input is
//! returned unchanged. Masks are drawn from a seeded [`StdRng`] so a fixed seed
//! reproduces the same sequence of masks.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use candle_core::{DType, Error, Result, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{checks, dtypes::PrecisionPolicy};

/// Dropout policy derived from the configured probability.
#[derive(Debug)]
pub enum DropoutMode {
    /// Probability is zero; the layer is always the identity.
    Disabled,
    /// Dropout applies during training with the supplied probability.
    Enabled { probability: f32, rng: Mutex<StdRng> },
}

impl DropoutMode {
    /// `None` or `0.0` disables dropout. Probabilities outside `[0, 1)` are rejected.
    pub fn from_probability(probability: Option<f32>, seed: u64) -> Result<Self> {
        match probability.unwrap_or(0.0) {
            p if !(0.0..1.0).contains(&p) => Err(Error::Msg(format!(
                "dropout probability must be in [0, 1), got {p}"
            ))),
            p if p == 0.0 => Ok(DropoutMode::Disabled),
            p => Ok(DropoutMode::Enabled {
                probability: p,
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }
}

pub struct Dropout {
    mode: DropoutMode,
    training: AtomicBool,
}

impl fmt::Debug for Dropout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dropout")
            .field("mode", &self.mode)
            .field("training", &self.is_training())
            .finish()
    }
}

impl Dropout {
    /// New layers start in training mode.
    pub fn new(probability: Option<f32>, seed: u64) -> Result<Self> {
        Ok(Self {
            mode: DropoutMode::from_probability(probability, seed)?,
            training: AtomicBool::new(true),
        })
    }

    pub fn probability(&self) -> f32 {
        match &self.mode {
            DropoutMode::Disabled => 0.0,
            DropoutMode::Enabled { probability, .. } => *probability,
        }
    }

    pub fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        if !self.is_training() {
            return Ok(input.clone());
        }
        let (probability, rng) = match &self.mode {
            DropoutMode::Disabled => return Ok(input.clone()),
            DropoutMode::Enabled { probability, rng } => (*probability, rng),
        };

        let keep_prob = 1.0 - probability;
        let total = input.elem_count();
        let mask_data = {
            let mut rng = rng
                .lock()
                .map_err(|_| Error::Msg("dropout RNG mutex poisoned".into()))?;
            (0..total)
                .map(|_| {
                    if rng.gen::<f32>() < keep_prob {
                        1.0f32 / keep_prob
                    } else {
                        0.0
                    }
                })
                .collect::<Vec<f32>>()
        };

        let dtype = policy.compute();
        checks::ensure_cast_supported("dropout.mask", DType::F32, dtype)?;
        let mask = Tensor::from_vec(mask_data, input.dims().to_vec(), input.device())?.to_dtype(dtype)?;
        let dropped = policy.cast_for_matmul(input)?.mul(&mask)?;
        policy.cast_to_storage(&dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn policy() -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(DType::F32)
    }

    #[test]
    fn dropout_preserves_mean_in_training() -> Result<()> {
        let dropout = Dropout::new(Some(0.25), 123)?;
        let input = Tensor::ones((4, 8, 16), DType::F32, &Device::Cpu)?;
        let values = dropout.forward(&input, &policy())?.flatten_all()?.to_vec1::<f32>()?;

        let mean = values.iter().sum::<f32>() / values.len() as f32;
        assert!((mean - 1.0).abs() < 0.1);
        assert!(values.iter().any(|v| *v == 0.0));
        assert!(values
            .iter()
            .all(|v| *v == 0.0 || (*v - 1.0 / 0.75).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn dropout_is_identity_in_inference() -> Result<()> {
        let dropout = Dropout::new(Some(0.5), 0)?;
        dropout.set_training(false);
        let input = Tensor::randn(0f32, 1.0, (2, 2, 4), &Device::Cpu)?;
        let out = dropout.forward(&input, &policy())?;
        let diff = input.sub(&out)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert_eq!(diff, 0.0);
        Ok(())
    }

    #[test]
    fn same_seed_reproduces_masks() -> Result<()> {
        let input = Tensor::ones((2, 3, 5), DType::F32, &Device::Cpu)?;
        let a = Dropout::new(Some(0.3), 42)?.forward(&input, &policy())?;
        let b = Dropout::new(Some(0.3), 42)?.forward(&input, &policy())?;
        assert_eq!(a.to_vec3::<f32>()?, b.to_vec3::<f32>()?);
        Ok(())
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        assert!(Dropout::new(Some(1.0), 0).is_err());
        assert!(Dropout::new(Some(-0.1), 0).is_err());
        assert_eq!(Dropout::new(None, 0).map(|d| d.probability()).ok(), Some(0.0));
    }
}

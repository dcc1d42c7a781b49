//! Fused convolutional attention.
//!
//! The decoder's gated convolution output is projected into the embedding
//! space and merged with the target embedding. The merged query is scored
//! against the encoder's convolution output, normalised with a max-subtracted
//! softmax, and used to average the sum of both encoder outputs. The attended
//! vector is projected back to the hidden space and merged with the
//! convolution output. Every merge is a [`ScaledResidual`].

use std::sync::OnceLock;

use candle_core::{DType, Var, D};
use layers::{Linear, LinearConfig, LinearLayer, PrecisionPolicy, ScaledResidual};

use crate::core::{Attention, AttentionError, AttentionInputs, AttentionOutput, Config};

/// Attention step with its own `hid -> emb` and `emb -> hid` projections.
#[derive(Debug)]
pub struct FusedAttention {
    config: Config,
    hid2emb: Linear,
    emb2hid: Linear,
    residual: ScaledResidual,
    policy: PrecisionPolicy,
    first_call: OnceLock<()>,
}

impl FusedAttention {
    /// Builds the attention projections with framework-default initialisation.
    pub fn new(config: Config) -> Result<Self, AttentionError> {
        let hid2emb = Linear::with_default_init(
            LinearConfig::new(config.hid_dim, config.emb_dim),
            &config.device,
            config.dtype,
        )?;
        let emb2hid = Linear::with_default_init(
            LinearConfig::new(config.emb_dim, config.hid_dim),
            &config.device,
            config.dtype,
        )?;
        Self::from_projections(config, hid2emb, emb2hid)
    }

    /// Builds the attention step from existing projections.
    pub fn from_projections(
        config: Config,
        hid2emb: Linear,
        emb2hid: Linear,
    ) -> Result<Self, AttentionError> {
        if config.emb_dim == 0 || config.hid_dim == 0 {
            return Err(AttentionError::shape("emb_dim and hid_dim must be non-zero"));
        }
        let (h2e, e2h) = (hid2emb.config(), emb2hid.config());
        if h2e.input_dim != config.hid_dim || h2e.output_dim != config.emb_dim {
            return Err(AttentionError::shape(format!(
                "attn_hid2emb must map {} -> {}, got {} -> {}",
                config.hid_dim, config.emb_dim, h2e.input_dim, h2e.output_dim
            )));
        }
        if e2h.input_dim != config.emb_dim || e2h.output_dim != config.hid_dim {
            return Err(AttentionError::shape(format!(
                "attn_emb2hid must map {} -> {}, got {} -> {}",
                config.emb_dim, config.hid_dim, e2h.input_dim, e2h.output_dim
            )));
        }
        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype);
        Ok(Self {
            config,
            hid2emb,
            emb2hid,
            residual: ScaledResidual::default(),
            policy,
            first_call: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parameters as `{scope}.attn_hid2emb.*` and `{scope}.attn_emb2hid.*`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .hid2emb
            .named_parameters(&format!("{scope}.attn_hid2emb"));
        params.extend(
            self.emb2hid
                .named_parameters(&format!("{scope}.attn_emb2hid")),
        );
        params
    }

    fn validate(&self, inputs: &AttentionInputs<'_>) -> Result<(), AttentionError> {
        let emb = self.config.emb_dim;
        let hid = self.config.hid_dim;

        for (name, tensor) in [
            ("embedded", inputs.embedded),
            ("conved", inputs.conved),
            ("encoder_conved", inputs.encoder_conved),
            ("encoder_combined", inputs.encoder_combined),
        ] {
            if !matches!(tensor.dtype(), DType::F16 | DType::BF16 | DType::F32 | DType::F64) {
                return Err(AttentionError::UnsupportedDType {
                    requested: format!("{name}: {:?}", tensor.dtype()),
                });
            }
        }

        let (batch, trg_len, e) = inputs
            .embedded
            .dims3()
            .map_err(|_| AttentionError::shape("embedded must be [batch, trg_len, emb]"))?;
        if e != emb {
            return Err(AttentionError::shape(format!(
                "embedded last dim {e} does not match emb_dim {emb}"
            )));
        }
        let conved_dims = inputs
            .conved
            .dims3()
            .map_err(|_| AttentionError::shape("conved must be [batch, hid, trg_len]"))?;
        if conved_dims != (batch, hid, trg_len) {
            return Err(AttentionError::shape(format!(
                "conved expected [{batch}, {hid}, {trg_len}] got {:?}",
                inputs.conved.dims()
            )));
        }
        let (eb, src_len, ee) = inputs
            .encoder_conved
            .dims3()
            .map_err(|_| AttentionError::shape("encoder_conved must be [batch, src_len, emb]"))?;
        if eb != batch || ee != emb || src_len == 0 {
            return Err(AttentionError::shape(format!(
                "encoder_conved expected [{batch}, src_len, {emb}] got {:?}",
                inputs.encoder_conved.dims()
            )));
        }
        if inputs.encoder_combined.dims() != inputs.encoder_conved.dims() {
            return Err(AttentionError::shape(format!(
                "encoder_combined {:?} must match encoder_conved {:?}",
                inputs.encoder_combined.dims(),
                inputs.encoder_conved.dims()
            )));
        }
        Ok(())
    }
}

impl Attention for FusedAttention {
    fn attend(&self, inputs: AttentionInputs<'_>) -> Result<AttentionOutput, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::fused init emb_dim={} hid_dim={} dtype={:?} device={:?}",
                self.config.emb_dim,
                self.config.hid_dim,
                self.config.dtype,
                self.config.device.location()
            );
        }
        self.validate(&inputs)?;
        let policy = &self.policy;

        // (batch, hid, trg) -> (batch, trg, emb)
        let conved_rows = inputs.conved.transpose(1, 2)?.contiguous()?;
        let conved_emb = self.hid2emb.forward(&conved_rows, policy)?;
        let combined = self.residual.add(inputs.embedded, &conved_emb, policy)?;

        let keys = policy
            .cast_for_matmul(inputs.encoder_conved)?
            .transpose(1, 2)?
            .contiguous()?;
        let energy = policy.cast_for_matmul(&combined)?.matmul(&keys)?;
        let attention = candle_nn::ops::softmax(&policy.cast_for_reduction(&energy)?, D::Minus1)?;

        let values = policy
            .cast_for_matmul(inputs.encoder_conved)?
            .add(&policy.cast_for_matmul(inputs.encoder_combined)?)?;
        let attended = policy
            .cast_for_matmul(&attention)?
            .matmul(&values)?;
        let attended = policy.cast_to_storage(&attended)?;

        // (batch, trg, emb) -> (batch, hid, trg)
        let attended_hid = self
            .emb2hid
            .forward(&attended, policy)?
            .transpose(1, 2)?
            .contiguous()?;
        let attended_combined = self.residual.add(inputs.conved, &attended_hid, policy)?;

        Ok(AttentionOutput {
            attention: policy.cast_to_storage(&attention)?,
            attended_combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Result as CandleResult, Tensor};
    use layers::RESIDUAL_SCALE;

    const EMB: usize = 3;
    const HID: usize = 4;

    struct Fixture {
        attention: FusedAttention,
        embedded: Tensor,
        conved: Tensor,
        encoder_conved: Tensor,
        encoder_combined: Tensor,
        w_h2e: Tensor,
        b_h2e: Tensor,
        w_e2h: Tensor,
        b_e2h: Tensor,
    }

    fn fixture(batch: usize, trg_len: usize, src_len: usize) -> CandleResult<Fixture> {
        let device = Device::Cpu;
        let w_h2e = Tensor::randn(0f32, 0.5, (EMB, HID), &device)?;
        let b_h2e = Tensor::randn(0f32, 0.1, EMB, &device)?;
        let w_e2h = Tensor::randn(0f32, 0.5, (HID, EMB), &device)?;
        let b_e2h = Tensor::randn(0f32, 0.1, HID, &device)?;
        let hid2emb = Linear::new(LinearConfig::new(HID, EMB), w_h2e.clone(), Some(b_h2e.clone()))?;
        let emb2hid = Linear::new(LinearConfig::new(EMB, HID), w_e2h.clone(), Some(b_e2h.clone()))?;
        let config = Config::new(EMB, HID, DType::F32, device.clone());
        let attention = FusedAttention::from_projections(config, hid2emb, emb2hid)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        Ok(Fixture {
            attention,
            embedded: Tensor::randn(0f32, 1.0, (batch, trg_len, EMB), &device)?,
            conved: Tensor::randn(0f32, 1.0, (batch, HID, trg_len), &device)?,
            encoder_conved: Tensor::randn(0f32, 1.0, (batch, src_len, EMB), &device)?,
            encoder_combined: Tensor::randn(0f32, 1.0, (batch, src_len, EMB), &device)?,
            w_h2e,
            b_h2e,
            w_e2h,
            b_e2h,
        })
    }

    fn inputs(f: &Fixture) -> AttentionInputs<'_> {
        AttentionInputs {
            embedded: &f.embedded,
            conved: &f.conved,
            encoder_conved: &f.encoder_conved,
            encoder_combined: &f.encoder_combined,
        }
    }

    /// Loop-based evaluation of the attention step.
    fn naive(f: &Fixture) -> CandleResult<(Vec<Vec<Vec<f32>>>, Vec<Vec<Vec<f32>>>)> {
        let s = RESIDUAL_SCALE as f32;
        let embedded = f.embedded.to_vec3::<f32>()?;
        let conved = f.conved.to_vec3::<f32>()?;
        let enc_conved = f.encoder_conved.to_vec3::<f32>()?;
        let enc_combined = f.encoder_combined.to_vec3::<f32>()?;
        let w1 = f.w_h2e.to_vec2::<f32>()?;
        let b1 = f.b_h2e.to_vec1::<f32>()?;
        let w2 = f.w_e2h.to_vec2::<f32>()?;
        let b2 = f.b_e2h.to_vec1::<f32>()?;

        let batch = embedded.len();
        let trg_len = embedded[0].len();
        let src_len = enc_conved[0].len();
        let mut weights = vec![vec![vec![0f32; src_len]; trg_len]; batch];
        let mut fused = vec![vec![vec![0f32; trg_len]; HID]; batch];

        for b in 0..batch {
            for t in 0..trg_len {
                let combined: Vec<f32> = (0..EMB)
                    .map(|e| {
                        let proj = b1[e] + (0..HID).map(|h| w1[e][h] * conved[b][h][t]).sum::<f32>();
                        (embedded[b][t][e] + proj) * s
                    })
                    .collect();
                let energy: Vec<f32> = (0..src_len)
                    .map(|j| (0..EMB).map(|e| combined[e] * enc_conved[b][j][e]).sum())
                    .collect();
                let max = energy.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                let exps: Vec<f32> = energy.iter().map(|v| (v - max).exp()).collect();
                let denom: f32 = exps.iter().sum();
                for j in 0..src_len {
                    weights[b][t][j] = exps[j] / denom;
                }
                let attended: Vec<f32> = (0..EMB)
                    .map(|e| {
                        (0..src_len)
                            .map(|j| weights[b][t][j] * (enc_conved[b][j][e] + enc_combined[b][j][e]))
                            .sum()
                    })
                    .collect();
                for h in 0..HID {
                    let proj = b2[h] + (0..EMB).map(|e| w2[h][e] * attended[e]).sum::<f32>();
                    fused[b][h][t] = (conved[b][h][t] + proj) * s;
                }
            }
        }
        Ok((weights, fused))
    }

    fn max_abs_diff(a: &[Vec<Vec<f32>>], b: &[Vec<Vec<f32>>]) -> f32 {
        a.iter()
            .flatten()
            .flatten()
            .zip(b.iter().flatten().flatten())
            .fold(0f32, |acc, (x, y)| acc.max((x - y).abs()))
    }

    #[test]
    fn matches_naive_evaluation() -> CandleResult<()> {
        let f = fixture(2, 3, 5)?;
        let out = f.attention.attend(inputs(&f)).unwrap();
        assert_eq!(out.attention.dims(), &[2, 3, 5]);
        assert_eq!(out.attended_combined.dims(), &[2, HID, 3]);

        let (weights, fused) = naive(&f)?;
        assert!(max_abs_diff(&out.attention.to_vec3::<f32>()?, &weights) < 1e-5);
        assert!(max_abs_diff(&out.attended_combined.to_vec3::<f32>()?, &fused) < 1e-4);
        Ok(())
    }

    #[test]
    fn rows_are_probability_distributions() -> CandleResult<()> {
        let f = fixture(3, 4, 6)?;
        let out = f.attention.attend(inputs(&f)).unwrap();
        for batch in out.attention.to_vec3::<f32>()? {
            for row in batch {
                assert!(row.iter().all(|w| *w >= 0.0));
                assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn large_energies_stay_finite() -> CandleResult<()> {
        let mut f = fixture(1, 2, 3)?;
        f.embedded = Tensor::full(1_000.0f32, (1, 2, EMB), &Device::Cpu)?;
        f.encoder_conved = Tensor::full(1_000.0f32, (1, 3, EMB), &Device::Cpu)?;
        let out = f.attention.attend(inputs(&f)).unwrap();
        let weights = out.attention.flatten_all()?.to_vec1::<f32>()?;
        assert!(weights.iter().all(|w| w.is_finite()));
        let fused = out.attended_combined.flatten_all()?.to_vec1::<f32>()?;
        assert!(fused.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn mismatched_encoder_outputs_error() -> CandleResult<()> {
        let mut f = fixture(1, 2, 3)?;
        f.encoder_combined = Tensor::zeros((1, 4, EMB), DType::F32, &Device::Cpu)?;
        let err = f.attention.attend(inputs(&f)).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
        Ok(())
    }

    #[test]
    fn wrong_hidden_width_errors() -> CandleResult<()> {
        let mut f = fixture(1, 2, 3)?;
        f.conved = Tensor::zeros((1, HID + 1, 2), DType::F32, &Device::Cpu)?;
        let err = f.attention.attend(inputs(&f)).unwrap_err();
        assert!(err.to_string().contains("conved expected"));
        Ok(())
    }

    #[test]
    fn integer_inputs_are_rejected() -> CandleResult<()> {
        let mut f = fixture(1, 2, 3)?;
        f.embedded = Tensor::zeros((1, 2, EMB), DType::U32, &Device::Cpu)?;
        let err = f.attention.attend(inputs(&f)).unwrap_err();
        assert!(matches!(err, AttentionError::UnsupportedDType { .. }));
        Ok(())
    }

    #[test]
    fn projection_shapes_are_checked() -> CandleResult<()> {
        let device = Device::Cpu;
        let wrong = Linear::with_default_init(LinearConfig::new(EMB, EMB), &device, DType::F32)?;
        let ok = Linear::with_default_init(LinearConfig::new(EMB, HID), &device, DType::F32)?;
        let config = Config::new(EMB, HID, DType::F32, device);
        assert!(FusedAttention::from_projections(config, wrong, ok).is_err());
        Ok(())
    }

    #[test]
    fn parameters_are_scoped() {
        let attention = FusedAttention::new(Config::new(EMB, HID, DType::F32, Device::Cpu)).unwrap();
        let names: Vec<String> = attention
            .named_parameters("decoder")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec![
                "decoder.attn_hid2emb.weight",
                "decoder.attn_hid2emb.bias",
                "decoder.attn_emb2hid.weight",
                "decoder.attn_emb2hid.bias",
            ]
        );
    }
}

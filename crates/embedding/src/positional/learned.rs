//! Learned absolute position embeddings with a fixed capacity.
//!
//! Position `i` of every batch row maps to row `i` of a trainable
//! `(max_positions, hidden)` table. Sequences longer than `max_positions` are
//! rejected; positions are never wrapped or truncated.

use candle_core::{bail, DType, Device, Result, Tensor, Var};
use layers::{checks, PrecisionPolicy};

/// Capacity used by the reference architecture.
pub const DEFAULT_MAX_POSITIONS: usize = 100;

#[derive(Debug, Clone)]
pub struct PositionEmbeddingConfig {
    pub max_positions: usize,
    pub hidden_dim: usize,
    pub dtype: DType,
    pub device: Device,
}

#[derive(Debug, Clone)]
pub struct LearnedPositionEmbedding {
    config: PositionEmbeddingConfig,
    weight: Var,
    policy: PrecisionPolicy,
}

impl LearnedPositionEmbedding {
    /// Builds the table with entries sampled from `N(0, 1)`.
    pub fn new(config: PositionEmbeddingConfig) -> Result<Self> {
        if config.max_positions == 0 {
            bail!("position embedding requires max_positions > 0");
        }
        if config.hidden_dim == 0 {
            bail!("position embedding requires hidden_dim > 0");
        }
        let initial = Tensor::randn(
            0f32,
            1f32,
            (config.max_positions, config.hidden_dim),
            &config.device,
        )?;
        checks::ensure_cast_supported("position_embedding.weight", DType::F32, config.dtype)?;
        let weight = Var::from_tensor(&initial.to_dtype(config.dtype)?)?;
        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype);
        Ok(Self {
            config,
            weight,
            policy,
        })
    }

    pub fn config(&self) -> &PositionEmbeddingConfig {
        &self.config
    }

    pub fn max_positions(&self) -> usize {
        self.config.max_positions
    }

    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Embeds positions `0..seq_len` for every batch row: `(batch, seq_len, hidden)`.
    pub fn forward(&self, batch: usize, seq_len: usize) -> Result<Tensor> {
        if batch == 0 || seq_len == 0 {
            bail!("position embedding requires non-zero batch and seq_len");
        }
        if seq_len > self.config.max_positions {
            bail!(
                "sequence length {} exceeds position capacity {}",
                seq_len,
                self.config.max_positions
            );
        }
        let positions = Tensor::arange(0u32, seq_len as u32, self.weight.device())?;
        let rows = self.weight.as_tensor().index_select(&positions, 0)?;
        let embedded = rows
            .unsqueeze(0)?
            .broadcast_as((batch, seq_len, self.config.hidden_dim))?
            .contiguous()?;
        self.policy.cast_to_storage(&embedded)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![(format!("{scope}.weight"), self.weight.clone())]
    }
}

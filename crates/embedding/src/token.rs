//! Learnable token embedding table.

use candle_core::{bail, DType, Device, Error, Result, Tensor, Var};
use layers::{checks, PrecisionPolicy};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
    /// Storage dtype used for the underlying parameters and outputs.
    pub dtype: DType,
    /// Device hosting the parameters.
    pub device: Device,
}

impl TokenEmbeddingConfig {
    fn policy(&self) -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(self.dtype)
    }

    fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if self.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        Ok(())
    }
}

/// Token id to dense vector lookup backed by a trainable `(vocab, hidden)` table.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Var,
    policy: PrecisionPolicy,
}

impl TokenEmbedding {
    /// Builds a new table with entries sampled from `N(0, 1)`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let initial = Tensor::randn(
            0f32,
            1f32,
            (config.vocab_size, config.hidden_dim),
            &config.device,
        )?;
        Self::from_weight(config, initial)
    }

    /// Builds the table from an existing `(vocab, hidden)` weight, cast to the configured dtype.
    pub fn from_weight(config: TokenEmbeddingConfig, weight: Tensor) -> Result<Self> {
        config.validate()?;
        checks::expect_shape(
            "token_embedding.weight",
            &weight,
            &[config.vocab_size, config.hidden_dim],
        )?;
        checks::ensure_cast_supported("token_embedding.weight", weight.dtype(), config.dtype)?;
        let weight = Var::from_tensor(&weight.to_dtype(config.dtype)?.contiguous()?)?;
        let policy = config.policy();
        Ok(Self {
            config,
            weight,
            policy,
        })
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    /// Returns a handle to the underlying weight tensor.
    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout using the configured storage dtype. Any id outside
    /// `[0, vocab_size)` is an error.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        self.validate_token_ids(token_ids)?;
        let (batch, seq) = token_ids.dims2()?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight.as_tensor().index_select(&flat, 0)?;
        let embedded = gathered.reshape((batch, seq, self.config.hidden_dim))?;
        self.policy.cast_to_storage(&embedded)
    }

    /// Returns the trainable parameters for this embedding under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let prefix = if scope.is_empty() {
            "embedding".to_string()
        } else {
            scope.to_string()
        };
        vec![(format!("{}.weight", prefix), self.weight.clone())]
    }

    fn validate_token_ids(&self, token_ids: &Tensor) -> Result<()> {
        match token_ids.dims() {
            [batch, seq] if *batch == 0 || *seq == 0 => {
                return Err(Error::Msg(
                    "token_ids must have non-zero batch and seq dimensions".into(),
                ))
            }
            [_, _] => {}
            dims => {
                return Err(Error::Msg(format!(
                    "token_ids must be shaped [batch, seq], got {:?}",
                    dims
                )))
            }
        }

        if token_ids.dtype().is_int() {
            Ok(())
        } else {
            Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )))
        }
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(Error::Msg(format!(
                "encountered negative token id {} (minimum)",
                min_id
            )));
        }

        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(Error::Msg(format!(
                "token id {} exceeds vocab size {}",
                max_id, vocab
            )));
        }
        Ok(())
    }
}

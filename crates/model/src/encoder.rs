//! Convolutional encoder.
//!
//! Source tokens are embedded, projected into the hidden space and passed
//! through a stack of same-length gated convolutions with scaled residuals.
//! The result is projected back to the embedding space (`conved`) and fused
//! with the embedding itself (`combined`).

use candle_core::{Result, Tensor, Var};
use layers::{
    Conv1d, Conv1dConfig, ConvPadding, Dropout, Glu, Linear, LinearConfig, LinearLayer,
    PrecisionPolicy, ScaledResidual,
};

use crate::{config::EncoderConfig, embed::SequenceEmbedding};

/// Both encoder outputs, each shaped `(batch, src_len, emb_dim)`.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub conved: Tensor,
    pub combined: Tensor,
}

#[derive(Debug)]
pub struct Encoder {
    config: EncoderConfig,
    embedding: SequenceEmbedding,
    emb2hid: Linear,
    hid2emb: Linear,
    convs: Vec<Conv1d>,
    glu: Glu,
    residual: ScaledResidual,
    dropout: Dropout,
    policy: PrecisionPolicy,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        let device = &config.device;
        let dtype = config.dtype;

        let embedding = SequenceEmbedding::new(
            config.input_vocab_size,
            config.emb_dim,
            config.max_positions,
            dtype,
            device,
        )?;
        let emb2hid = Linear::with_default_init(
            LinearConfig::new(config.emb_dim, config.hid_dim),
            device,
            dtype,
        )?;
        let hid2emb = Linear::with_default_init(
            LinearConfig::new(config.hid_dim, config.emb_dim),
            device,
            dtype,
        )?;
        let convs = (0..config.n_layers)
            .map(|_| {
                Conv1d::with_default_init(
                    Conv1dConfig::new(
                        config.hid_dim,
                        2 * config.hid_dim,
                        config.kernel_size,
                        ConvPadding::Same,
                    ),
                    device,
                    dtype,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let dropout = Dropout::new(config.dropout_p, config.seed)?;
        let policy = PrecisionPolicy::from_parameter_dtype(dtype);

        Ok(Self {
            config,
            embedding,
            emb2hid,
            hid2emb,
            convs,
            glu: Glu::channels(),
            residual: ScaledResidual::default(),
            dropout,
            policy,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn set_training(&self, training: bool) {
        self.dropout.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.dropout.is_training()
    }

    /// Encodes `(batch, src_len)` token ids.
    pub fn encode(&self, src: &Tensor) -> Result<EncoderOutput> {
        let policy = &self.policy;
        let embedded = self
            .dropout
            .forward(&self.embedding.forward(src)?, policy)?;

        // (batch, src, hid) -> (batch, hid, src)
        let mut conv_input = self
            .emb2hid
            .forward(&embedded, policy)?
            .transpose(1, 2)?
            .contiguous()?;

        for (layer, conv) in self.convs.iter().enumerate() {
            let conved = conv.forward(&self.dropout.forward(&conv_input, policy)?, policy)?;
            let conved = self.glu.forward(&conved, policy)?;
            conv_input = self.residual.add(&conved, &conv_input, policy)?;
            log::debug!("encoder stage {layer} -> {:?}", conv_input.dims());
        }

        let conved = self
            .hid2emb
            .forward(&conv_input.transpose(1, 2)?.contiguous()?, policy)?;
        let combined = self.residual.add(&conved, &embedded, policy)?;
        Ok(EncoderOutput { conved, combined })
    }

    /// Parameters under `{scope}`: embeddings, projections, then `convs.{i}`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.embedding.named_parameters(scope);
        params.extend(self.emb2hid.named_parameters(&format!("{scope}.emb2hid")));
        params.extend(self.hid2emb.named_parameters(&format!("{scope}.hid2emb")));
        for (idx, conv) in self.convs.iter().enumerate() {
            params.extend(conv.named_parameters(&format!("{scope}.convs.{idx}")));
        }
        params
    }
}

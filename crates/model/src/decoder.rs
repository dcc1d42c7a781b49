//! Causal convolutional decoder with per-stage attention.
//!
//! Each stage left-pads its input with `kernel_size - 1` columns of the pad
//! token id, so output position `t` never depends on target positions after
//! `t`. After the gated convolution the stage attends over the encoder
//! outputs. Only the attention weights of the last stage are returned.

use attention::{Attention, AttentionInputs, Config as AttentionConfig, FusedAttention};
use candle_core::{Error, Result, Tensor, Var};
use layers::{
    Conv1d, Conv1dConfig, ConvPadding, Dropout, Glu, Linear, LinearConfig, LinearLayer,
    PrecisionPolicy, ScaledResidual,
};

use crate::{config::DecoderConfig, embed::SequenceEmbedding, encoder::EncoderOutput};

#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// Unnormalised scores, `(batch, trg_len, output_vocab_size)`.
    pub logits: Tensor,
    /// Last-stage attention weights, `(batch, trg_len, src_len)`.
    pub attention: Tensor,
}

#[derive(Debug)]
pub struct Decoder {
    config: DecoderConfig,
    embedding: SequenceEmbedding,
    emb2hid: Linear,
    hid2emb: Linear,
    attention: FusedAttention,
    out: Linear,
    convs: Vec<Conv1d>,
    glu: Glu,
    residual: ScaledResidual,
    dropout: Dropout,
    policy: PrecisionPolicy,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let device = &config.device;
        let dtype = config.dtype;

        let embedding = SequenceEmbedding::new(
            config.output_vocab_size,
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
        let attention = FusedAttention::new(AttentionConfig::new(
            config.emb_dim,
            config.hid_dim,
            dtype,
            device.clone(),
        ))
        .map_err(|err| Error::Msg(err.to_string()))?;
        let out = Linear::with_default_init(
            LinearConfig::new(config.emb_dim, config.output_vocab_size),
            device,
            dtype,
        )?;

        let padding = ConvPadding::Causal {
            fill: config.pad_token_id as f32,
        };
        let convs = (0..config.n_layers)
            .map(|_| {
                Conv1d::with_default_init(
                    Conv1dConfig::new(
                        config.hid_dim,
                        2 * config.hid_dim,
                        config.kernel_size,
                        padding,
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
            attention,
            out,
            convs,
            glu: Glu::channels(),
            residual: ScaledResidual::default(),
            dropout,
            policy,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn set_training(&self, training: bool) {
        self.dropout.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.dropout.is_training()
    }

    /// Decodes `(batch, trg_len)` target ids against the encoder outputs.
    pub fn decode(
        &self,
        trg: &Tensor,
        encoder_conved: &Tensor,
        encoder_combined: &Tensor,
    ) -> Result<DecoderOutput> {
        let policy = &self.policy;
        let (batch, _) = trg.dims2()?;
        let enc_batch = encoder_conved.dim(0)?;
        if enc_batch != batch {
            return Err(Error::Msg(format!(
                "decoder batch {batch} does not match encoder batch {enc_batch}"
            )));
        }

        let embedded = self
            .dropout
            .forward(&self.embedding.forward(trg)?, policy)?;
        let mut conv_input = self
            .emb2hid
            .forward(&embedded, policy)?
            .transpose(1, 2)?
            .contiguous()?;

        let mut attention = None;
        for (layer, conv) in self.convs.iter().enumerate() {
            // The residual below adds the dropped-out input.
            conv_input = self.dropout.forward(&conv_input, policy)?;
            let conved = self.glu.forward(&conv.forward(&conv_input, policy)?, policy)?;
            let step = self
                .attention
                .attend(AttentionInputs {
                    embedded: &embedded,
                    conved: &conved,
                    encoder_conved,
                    encoder_combined,
                })
                .map_err(|err| Error::Msg(err.to_string()))?;
            conv_input = self
                .residual
                .add(&step.attended_combined, &conv_input, policy)?;
            log::debug!(
                "decoder stage {layer} -> {:?} attention {:?}",
                conv_input.dims(),
                step.attention.dims()
            );
            attention = Some(step.attention);
        }
        let attention =
            attention.ok_or_else(|| Error::Msg("decoder has no convolution stages".into()))?;

        let conved = self
            .hid2emb
            .forward(&conv_input.transpose(1, 2)?.contiguous()?, policy)?;
        let logits = self
            .out
            .forward(&self.dropout.forward(&conved, policy)?, policy)?;
        Ok(DecoderOutput { logits, attention })
    }

    /// Convenience wrapper taking both encoder outputs at once.
    pub fn decode_from(&self, trg: &Tensor, encoded: &EncoderOutput) -> Result<DecoderOutput> {
        self.decode(trg, &encoded.conved, &encoded.combined)
    }

    /// Parameters under `{scope}`: embeddings, projections, attention, output, then `convs.{i}`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.embedding.named_parameters(scope);
        params.extend(self.emb2hid.named_parameters(&format!("{scope}.emb2hid")));
        params.extend(self.hid2emb.named_parameters(&format!("{scope}.hid2emb")));
        params.extend(self.attention.named_parameters(scope));
        params.extend(self.out.named_parameters(&format!("{scope}.out")));
        for (idx, conv) in self.convs.iter().enumerate() {
            params.extend(conv.named_parameters(&format!("{scope}.convs.{idx}")));
        }
        params
    }
}

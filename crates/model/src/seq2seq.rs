//! Encoder-decoder pair run as one model.

use candle_core::{Error, Result, Tensor, Var};

use crate::{
    config::Seq2SeqConfig,
    decoder::{Decoder, DecoderOutput},
    encoder::Encoder,
    errors::ModelError,
};

/// Output of a full forward pass.
pub type Seq2SeqOutput = DecoderOutput;

/// Convolutional sequence-to-sequence model.
#[derive(Debug)]
pub struct Seq2Seq {
    encoder: Encoder,
    decoder: Decoder,
}

impl Seq2Seq {
    /// Pairs an encoder with a decoder; both must agree on `emb_dim`.
    pub fn new(encoder: Encoder, decoder: Decoder) -> Result<Self> {
        let (enc, dec) = (encoder.config().emb_dim, decoder.config().emb_dim);
        if enc != dec {
            return Err(Error::Msg(format!(
                "encoder emb_dim {enc} does not match decoder emb_dim {dec}"
            )));
        }
        Ok(Self { encoder, decoder })
    }

    /// Validates `config`, resolves its device and builds both sides.
    pub fn from_config(config: &Seq2SeqConfig) -> std::result::Result<Self, ModelError> {
        config.validate()?;
        let device = config.device.resolve()?;
        let encoder = Encoder::new(config.encoder_config(&device))?;
        let decoder = Decoder::new(config.decoder_config(&device))?;
        let model = Self::new(encoder, decoder)?;
        log::info!(
            "seq2seq ready: emb_dim={} hid_dim={} n_layers={} kernel_size={} params={} device={:?}",
            config.emb_dim,
            config.hid_dim,
            config.n_layers,
            config.kernel_size,
            model.parameter_count(),
            device.location()
        );
        Ok(model)
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Switches dropout on (training) or off (inference) for every component.
    pub fn set_training(&self, training: bool) {
        self.encoder.set_training(training);
        self.decoder.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.encoder.is_training()
    }

    /// Encodes `src` `(batch, src_len)` and decodes `trg` `(batch, trg_len)` against it.
    pub fn run(&self, src: &Tensor, trg: &Tensor) -> Result<Seq2SeqOutput> {
        let encoded = self.encoder.encode(src)?;
        self.decoder.decode_from(trg, &encoded)
    }

    pub fn forward(&self, src: &Tensor, trg: &Tensor) -> Result<Seq2SeqOutput> {
        self.run(src, trg)
    }

    /// Every trainable parameter, prefixed `encoder.` or `decoder.`.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.encoder.named_parameters("encoder");
        params.extend(self.decoder.named_parameters("decoder"));
        params
    }

    /// Parameters in `named_parameters` order, ready for an optimizer.
    pub fn parameters(&self) -> Vec<Var> {
        self.named_parameters()
            .into_iter()
            .map(|(_, var)| var)
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, var)| var.elem_count())
            .sum()
    }
}

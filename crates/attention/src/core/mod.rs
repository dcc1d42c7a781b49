//! Core traits and types shared across attention implementations.
//!
//! Attention runs once per decoder convolution stage. It reads the decoder's
//! embedded targets `(batch, trg_len, emb)`, the gated convolution output
//! `(batch, hid, trg_len)` and the two encoder outputs `(batch, src_len, emb)`.
//! It returns row-stochastic weights `(batch, trg_len, src_len)` and the
//! attention-fused convolution output in the same channel-first layout it
//! received. Softmax reductions are performed in `f32`.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::Config;
pub use errors::AttentionError;

/// Borrowed inputs for a single attention step.
#[derive(Debug, Clone, Copy)]
pub struct AttentionInputs<'a> {
    /// Token + position embeddings of the target, `(batch, trg_len, emb)`.
    pub embedded: &'a Tensor,
    /// Gated convolution output, `(batch, hid, trg_len)`.
    pub conved: &'a Tensor,
    /// Final encoder convolution output, `(batch, src_len, emb)`.
    pub encoder_conved: &'a Tensor,
    /// Encoder output fused with the source embedding, `(batch, src_len, emb)`.
    pub encoder_combined: &'a Tensor,
}

/// Result of a single attention step.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// Softmax weights over source positions, `(batch, trg_len, src_len)`.
    pub attention: Tensor,
    /// Convolution output fused with the attended encoding, `(batch, hid, trg_len)`.
    pub attended_combined: Tensor,
}

/// Unified interface for decoder-to-encoder attention.
pub trait Attention {
    fn attend(&self, inputs: AttentionInputs<'_>) -> Result<AttentionOutput, AttentionError>;
}

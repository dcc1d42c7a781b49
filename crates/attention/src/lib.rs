//! Decoder-to-encoder attention for the convolutional sequence model.
//!
//! The crate defines the [`Attention`] trait and [`FusedAttention`], the step
//! the decoder runs after every gated convolution. Target-side queries are
//! built from both the convolution output and the target embedding; the
//! attended value is the sum of the encoder's convolution output and its
//! embedding-fused output. Weights are normalised with a max-subtracted
//! softmax over source positions, so every row sums to one.

pub mod core;
pub mod fused;

pub use core::{Attention, AttentionError, AttentionInputs, AttentionOutput, Config};
pub use fused::FusedAttention;

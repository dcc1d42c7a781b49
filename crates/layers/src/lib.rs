//! Building blocks for the convolutional encoder and decoder.
//!
//! Every layer owns its parameters as candle [`Var`](candle_core::Var)s and
//! threads a [`PrecisionPolicy`] through the forward pass. Embedding-space
//! tensors use the `(batch, seq, hidden)` layout; convolutions work on the
//! channel-first `(batch, channels, len)` layout.

pub mod activations;
pub mod checks;
pub mod conv;
pub mod dropout;
pub mod dtypes;
pub mod init;
pub mod linear;
pub mod residual;

pub use activations::Glu;
pub use conv::{Conv1d, Conv1dConfig, ConvPadding};
pub use dropout::Dropout;
pub use dtypes::PrecisionPolicy;
pub use init::{BiasInit, Init};
pub use linear::{Linear, LinearConfig, LinearLayer};
pub use residual::{ScaledResidual, RESIDUAL_SCALE};

//! Convolutional sequence-to-sequence modelling on candle.
//!
//! Re-exports the workspace crates under one roof so binaries and tests can
//! depend on a single package.

pub use attention;
pub use embedding;
pub use layers;
pub use model;

pub use model::{
    setup_device, Decoder, DeviceSpec, Encoder, ModelError, Precision, Seq2Seq, Seq2SeqConfig,
    Seq2SeqOutput,
};


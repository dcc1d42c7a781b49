//! Convolutional sequence-to-sequence model assembled from the shared crates.
//!
//! [`Encoder`] and [`Decoder`] own their parameters as candle `Var`s, so an
//! external optimizer can update them in place between forward passes.
//! [`Seq2SeqConfig`] describes a model in TOML or JSON.

pub mod config;
pub mod decoder;
pub mod device;
pub mod embed;
pub mod encoder;
pub mod errors;
pub mod seq2seq;

pub use config::{DecoderConfig, EncoderConfig, Precision, Seq2SeqConfig};
pub use decoder::{Decoder, DecoderOutput};
pub use device::{setup_device, DeviceSpec};
pub use embed::SequenceEmbedding;
pub use encoder::{Encoder, EncoderOutput};
pub use errors::ModelError;
pub use seq2seq::{Seq2Seq, Seq2SeqOutput};

//! Embedding crate
//!
//! Token tables and learned absolute position tables. Both produce
//! `(batch, seq, hidden)` tensors that the encoder and decoder sum elementwise.

pub mod positional;
pub mod token;

pub use positional::*;
pub use token::*;

//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape and dtype assertions that can be wired
//! into constructors or forward paths. They return `candle_core::Result<()>`
//! so call sites can propagate errors without panicking. Every helper takes a
//! `name` used as the message prefix so failures point at the offending tensor.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected rank {rank}, got shape {:?}",
            dims
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected shape {:?}, got {:?}",
            expected, actual
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(name: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [_, _, actual_hidden] if *actual_hidden == hidden => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name}: expected (batch, seq, {hidden}) layout, got {:?}",
            dims
        ))),
    }
}

/// Validates the channel-first `(batch, channels, len)` convention used by convolutions.
pub fn expect_batch_channels_len(name: &str, tensor: &Tensor, channels: usize) -> Result<()> {
    match tensor.dims() {
        [_, actual, _] if *actual == channels => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name}: expected (batch, {channels}, len) layout, got {:?}",
            dims
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(name: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected dtype in {:?}, got {:?}",
            allowed, dtype
        )))
    }
}

/// Checks two tensors share a dtype.
pub fn expect_same_dtype(name: &str, tensor: &Tensor, other_name: &str, other: &Tensor) -> Result<()> {
    if tensor.dtype() == other.dtype() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name} has dtype {:?} but {other_name} has {:?}",
            tensor.dtype(),
            other.dtype()
        )))
    }
}

/// Parameters must be contiguous so they can be handed to kernels directly.
pub fn expect_contiguous(name: &str, tensor: &Tensor) -> Result<()> {
    if tensor.is_contiguous() {
        Ok(())
    } else {
        Err(Error::Msg(format!("{name}: tensor must be contiguous")))
    }
}

/// Only floating point dtypes may be cast between each other inside the layers.
pub fn ensure_cast_supported(name: &str, from: DType, to: DType) -> Result<()> {
    if from == to || (from.is_float() && to.is_float()) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: unsupported cast from {:?} to {:?}",
            from, to
        )))
    }
}

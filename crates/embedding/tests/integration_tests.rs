//! Position embedding behaviour.

use candle_core::{DType, Device, Result};
use embedding::positional::{
    LearnedPositionEmbedding, PositionEmbeddingConfig, DEFAULT_MAX_POSITIONS,
};

fn build(max_positions: usize, hidden_dim: usize) -> Result<LearnedPositionEmbedding> {
    LearnedPositionEmbedding::new(PositionEmbeddingConfig {
        max_positions,
        hidden_dim,
        dtype: DType::F32,
        device: Device::Cpu,
    })
}

#[test]
fn rows_are_identical_across_batch() -> Result<()> {
    let positions = build(DEFAULT_MAX_POSITIONS, 6)?;
    let out = positions.forward(3, 5)?;
    assert_eq!(out.dims(), &[3, 5, 6]);

    let values = out.to_vec3::<f32>()?;
    assert_eq!(values[0], values[1]);
    assert_eq!(values[0], values[2]);

    let table = positions.weight().to_vec2::<f32>()?;
    assert_eq!(values[0][4], table[4]);
    Ok(())
}

#[test]
fn full_capacity_is_accepted() -> Result<()> {
    let positions = build(DEFAULT_MAX_POSITIONS, 2)?;
    let out = positions.forward(1, DEFAULT_MAX_POSITIONS)?;
    assert_eq!(out.dims(), &[1, DEFAULT_MAX_POSITIONS, 2]);
    Ok(())
}

#[test]
fn exceeding_capacity_fails() -> Result<()> {
    let positions = build(DEFAULT_MAX_POSITIONS, 2)?;
    let err = positions.forward(1, DEFAULT_MAX_POSITIONS + 1).unwrap_err();
    assert!(err
        .to_string()
        .contains("sequence length 101 exceeds position capacity 100"));
    Ok(())
}

#[test]
fn zero_capacity_is_rejected() {
    assert!(build(0, 4).is_err());
}

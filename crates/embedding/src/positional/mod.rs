//! Positional embeddings.

pub mod learned;

pub use learned::{LearnedPositionEmbedding, PositionEmbeddingConfig, DEFAULT_MAX_POSITIONS};

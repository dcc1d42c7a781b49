//! Token plus learned-position embedding shared by both sides of the model.

use candle_core::{DType, Device, Result, Tensor, Var};
use embedding::{
    LearnedPositionEmbedding, PositionEmbeddingConfig, TokenEmbedding, TokenEmbeddingConfig,
};

/// Sums a token table and a position table: `(batch, seq) -> (batch, seq, emb)`.
#[derive(Debug, Clone)]
pub struct SequenceEmbedding {
    tokens: TokenEmbedding,
    positions: LearnedPositionEmbedding,
}

impl SequenceEmbedding {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        max_positions: usize,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let tokens = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size,
            hidden_dim: emb_dim,
            dtype,
            device: device.clone(),
        })?;
        let positions = LearnedPositionEmbedding::new(PositionEmbeddingConfig {
            max_positions,
            hidden_dim: emb_dim,
            dtype,
            device: device.clone(),
        })?;
        Ok(Self { tokens, positions })
    }

    pub fn tokens(&self) -> &TokenEmbedding {
        &self.tokens
    }

    pub fn positions(&self) -> &LearnedPositionEmbedding {
        &self.positions
    }

    pub fn max_positions(&self) -> usize {
        self.positions.max_positions()
    }

    /// Embeds `token_ids` and adds the embedding of each column index.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let tok = self.tokens.forward(token_ids)?;
        let (batch, seq_len, _) = tok.dims3()?;
        let pos = self.positions.forward(batch, seq_len)?;
        tok.add(&pos)
    }

    /// Parameters as `{scope}.tok_embedding.weight` and `{scope}.pos_embedding.weight`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .tokens
            .named_parameters(&format!("{scope}.tok_embedding"));
        params.extend(
            self.positions
                .named_parameters(&format!("{scope}.pos_embedding")),
        );
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_columns_share_position_rows() -> Result<()> {
        let device = Device::Cpu;
        let embed = SequenceEmbedding::new(5, 4, 10, DType::F32, &device)?;
        let ids = Tensor::new(&[[2u32, 2, 2], [2, 2, 2]], &device)?;
        let out = embed.forward(&ids)?;
        assert_eq!(out.dims(), &[2, 3, 4]);

        let tok = embed.tokens().weight().get(2)?;
        let pos = embed.positions().weight().narrow(0, 0, 3)?;
        let expected = pos.broadcast_add(&tok)?.to_vec2::<f32>()?;
        assert_eq!(out.get(0)?.to_vec2::<f32>()?, expected);
        assert_eq!(out.get(1)?.to_vec2::<f32>()?, expected);
        Ok(())
    }

    #[test]
    fn rejects_sequences_past_capacity() -> Result<()> {
        let device = Device::Cpu;
        let embed = SequenceEmbedding::new(5, 4, 3, DType::F32, &device)?;
        let ids = Tensor::zeros((1, 4), DType::U32, &device)?;
        let err = embed.forward(&ids).unwrap_err();
        assert!(err.to_string().contains("exceeds position capacity"));
        Ok(())
    }

    #[test]
    fn names_both_tables() -> Result<()> {
        let embed = SequenceEmbedding::new(5, 4, 3, DType::F32, &Device::Cpu)?;
        let names: Vec<_> = embed
            .named_parameters("encoder")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec!["encoder.tok_embedding.weight", "encoder.pos_embedding.weight"]
        );
        Ok(())
    }
}

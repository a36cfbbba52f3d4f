//! Token counting for chunk budgets.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::ConfigError;
use crate::models::ChunkingConfig;

/// Counts the tokens a piece of text will cost the embedding model.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Approximation of ~4 bytes per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

/// Exact counts from a Hugging Face `tokenizer.json`.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| ConfigError::TokenizerError(e.to_string()))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                tracing::warn!(target: "chunker", "tokenizer failed, estimating instead: {e}");
                HeuristicTokenCounter.count_tokens(text)
            }
        }
    }
}

/// Token counter selected by configuration.
pub fn token_counter_from_config(
    config: &ChunkingConfig,
) -> Result<Box<dyn TokenCounter>, ConfigError> {
    match config.tokenizer_path {
        Some(ref path) => Ok(Box::new(HfTokenCounter::from_file(path)?)),
        None => Ok(Box::new(HeuristicTokenCounter)),
    }
}

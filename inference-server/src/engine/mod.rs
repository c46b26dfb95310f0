//! Inference engine abstraction layer.
//!
//! This module defines the `InferenceEngine` trait that hides the model
//! backend behind one call: prompt in, continuations out.

mod candle;
mod model;
pub mod sampling;

pub use self::candle::CandleEngine;
pub use model::Architecture;

use async_trait::async_trait;
use inference_common::{FinishReason, SamplingParams};

use crate::error::Result;

/// Parameters for one generation call, resolved from a request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    /// `0.0` selects greedy decoding.
    pub temperature: f64,
    pub top_p: f64,
    /// Number of independent continuations.
    pub n: u32,
    pub stop: Vec<String>,
    pub seed: Option<u64>,
}

impl GenerationParams {
    pub fn from_sampling(sampling: &SamplingParams) -> Self {
        Self {
            max_new_tokens: sampling.max_new_tokens(),
            temperature: sampling.temperature(),
            top_p: sampling.top_p(),
            n: sampling.n(),
            stop: sampling.stop_sequences(),
            seed: sampling.seed,
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

/// One generated continuation. `text` never includes the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Primary trait for inference engines.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Identifier for this engine type (e.g., "candle").
    fn engine_type(&self) -> &'static str;

    /// Generate `params.n` continuations of `prompt`.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<Generation>>;

    /// Number of tokens `text` encodes to, as reported in `usage`.
    fn count_tokens(&self, text: &str) -> Result<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_common::OneOrMany;

    #[test]
    fn test_params_from_sampling_defaults() {
        let params = GenerationParams::from_sampling(&SamplingParams::default());
        assert_eq!(params.max_new_tokens, 16);
        assert_eq!(params.temperature, 1.0);
        assert_eq!(params.top_p, 1.0);
        assert_eq!(params.n, 1);
        assert!(params.stop.is_empty());
        assert!(params.seed.is_none());
        assert!(!params.is_greedy());
    }

    #[test]
    fn test_params_copied_from_request() {
        let sampling = SamplingParams {
            max_tokens: Some(10),
            max_new_tokens: Some(32),
            temperature: Some(0.0),
            top_p: Some(0.9),
            n: Some(3),
            stop: Some(OneOrMany::One("\n\n".to_string())),
            seed: Some(7),
            ..Default::default()
        };
        let params = GenerationParams::from_sampling(&sampling);
        assert_eq!(params.max_new_tokens, 32);
        assert!(params.is_greedy());
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.n, 3);
        assert_eq!(params.stop, vec!["\n\n".to_string()]);
        assert_eq!(params.seed, Some(7));
    }
}

//! Sampling parameters shared by completion and chat requests.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_TOKENS: u32 = 16;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_N: u32 = 1;
/// Upper bound on `n`, matching the OpenAI API.
pub const MAX_N: u32 = 128;

/// A field that OpenAI accepts either as a single value or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.first(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Generation knobs accepted on both `/v1/completions` and `/v1/chat/completions`.
///
/// Every field is optional and an explicit JSON `null` behaves like an absent
/// field; the accessor methods apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Takes precedence over `max_tokens` when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Accepted for compatibility; responses are never streamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<OneOrMany<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SamplingParams {
    pub fn max_new_tokens(&self) -> u32 {
        self.max_new_tokens
            .or(self.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f64 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    pub fn n(&self) -> u32 {
        self.n.unwrap_or(DEFAULT_N)
    }

    pub fn stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Non-empty stop sequences, in request order.
    pub fn stop_sequences(&self) -> Vec<String> {
        self.stop
            .clone()
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check value ranges that the JSON schema alone cannot express.
    ///
    /// Returns a human-readable description of the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        let temperature = self.temperature();
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(format!(
                "`temperature` must be a non-negative number, got {}",
                temperature
            ));
        }
        let top_p = self.top_p();
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(format!("`top_p` must be in (0, 1], got {}", top_p));
        }
        let n = self.n();
        if n == 0 || n > MAX_N {
            return Err(format!("`n` must be between 1 and {}, got {}", MAX_N, n));
        }
        Ok(())
    }
}

/// Why a choice stopped producing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// End-of-sequence token or a stop sequence.
    Stop,
    /// The token budget ran out.
    Length,
    /// The model was asked to call a function instead of answering.
    FunctionCall,
}

//! Candle inference engine implementation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use inference_common::FinishReason;
use tokenizers::Tokenizer;

use super::model::{Architecture, CausalLm, ModelFiles};
use super::sampling;
use super::{Generation, GenerationParams, InferenceEngine};
use crate::config::{DeviceKind, ModelConfig};
use crate::error::{Error, Result};

/// Candle inference engine.
///
/// Owns one model loaded from a local directory. The model carries a KV cache,
/// so generation calls are serialized on a mutex and run on the blocking pool.
pub struct CandleEngine {
    inner: Arc<Inner>,
}

struct Inner {
    model: Mutex<CausalLm>,
    tokenizer: Tokenizer,
    eos_token_ids: Vec<u32>,
    device: Device,
    architecture: Architecture,
    base_seed: u64,
    requests: AtomicU64,
    usage_max_length: usize,
}

impl CandleEngine {
    /// Load tokenizer and weights from `config.dir`.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let dtype = parse_dtype(&config.dtype)?;
        let device = select_device(config.device)?;
        let files = ModelFiles::discover(Path::new(&config.dir))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::LoadFailed(format!("tokenizer: {}", e)))?;

        let mut eos_token_ids = files.eos_token_ids.clone();
        if let Some(id) = files
            .eos_token
            .as_deref()
            .and_then(|token| tokenizer.token_to_id(token))
        {
            if !eos_token_ids.contains(&id) {
                eos_token_ids.push(id);
            }
        }
        if eos_token_ids.is_empty() {
            tracing::warn!("No EOS token found; generation will always run to max_tokens");
        }

        tracing::info!(
            architecture = %files.architecture,
            dir = %config.dir,
            dtype = ?dtype,
            weights = files.weights.len(),
            "Loading model"
        );
        let model = CausalLm::load(&files, dtype, &device)?;

        Ok(Self {
            inner: Arc::new(Inner {
                model: Mutex::new(model),
                tokenizer,
                eos_token_ids,
                device,
                architecture: files.architecture,
                base_seed: config.seed,
                requests: AtomicU64::new(0),
                usage_max_length: config.usage_max_length,
            }),
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.inner.architecture
    }
}

#[async_trait]
impl InferenceEngine for CandleEngine {
    fn engine_type(&self) -> &'static str {
        "candle"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<Generation>> {
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        let params = params.clone();
        let request_index = inner.requests.fetch_add(1, Ordering::Relaxed);
        let seed = sampling::resolve_seed(params.seed, inner.base_seed, request_index);

        tokio::task::spawn_blocking(move || inner.generate(&prompt, &params, seed))
            .await
            .map_err(|e| Error::Internal(format!("generation task failed: {}", e)))?
    }

    fn count_tokens(&self, text: &str) -> Result<u32> {
        let encoding = self
            .inner
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().len().min(self.inner.usage_max_length) as u32)
    }
}

impl Inner {
    fn generate(&self, prompt: &str, params: &GenerationParams, seed: u64) -> Result<Vec<Generation>> {
        let prompt_ids = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| Error::Tokenization(e.to_string()))?
            .get_ids()
            .to_vec();
        if prompt_ids.is_empty() {
            return Err(Error::InferenceFailed("prompt encodes to no tokens".to_string()));
        }
        let prompt_text = self.decode(&prompt_ids)?;

        let mut model = lock_model(&self.model);
        let mut sampler = LogitsProcessor::from_sampling(seed, sampling::strategy(params));

        let started = std::time::Instant::now();
        let mut generations = Vec::new();
        for _ in 0..params.n {
            model.reset().map_err(inference_err)?;
            generations.push(self.continue_sequence(
                &mut model,
                &prompt_ids,
                &prompt_text,
                params,
                &mut sampler,
            )?);
        }
        tracing::debug!(
            prompt_tokens = prompt_ids.len(),
            sequences = generations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation finished"
        );
        Ok(generations)
    }

    /// Extend the prompt by at most `max_new_tokens` tokens.
    fn continue_sequence(
        &self,
        model: &mut CausalLm,
        prompt_ids: &[u32],
        prompt_text: &str,
        params: &GenerationParams,
        sampler: &mut LogitsProcessor,
    ) -> Result<Generation> {
        let mut tokens = prompt_ids.to_vec();
        let mut offset = 0;
        let mut finish_reason = FinishReason::Length;

        for _ in 0..params.max_new_tokens {
            let input = Tensor::new(&tokens[offset..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference_err)?;
            let logits = model
                .next_token_logits(&input, offset)
                .map_err(inference_err)?;
            offset = tokens.len();

            let next = sampler.sample(&logits).map_err(inference_err)?;
            if self.eos_token_ids.contains(&next) {
                finish_reason = FinishReason::Stop;
                break;
            }
            tokens.push(next);

            if !params.stop.is_empty() {
                let text = self.continuation(&tokens, prompt_ids.len(), prompt_text)?;
                if let Some(at) = sampling::find_stop(&text, &params.stop) {
                    return Ok(Generation {
                        text: text[..at].to_string(),
                        finish_reason: FinishReason::Stop,
                    });
                }
            }
        }

        Ok(Generation {
            text: self.continuation(&tokens, prompt_ids.len(), prompt_text)?,
            finish_reason,
        })
    }

    /// Text produced after the prompt.
    ///
    /// Decoding prompt and continuation together keeps word-boundary spacing
    /// that decoding the new tokens alone would drop.
    fn continuation(&self, tokens: &[u32], prompt_len: usize, prompt_text: &str) -> Result<String> {
        let full = self.decode(tokens)?;
        match full.strip_prefix(prompt_text) {
            Some(rest) => Ok(rest.to_string()),
            None => self.decode(&tokens[prompt_len..]),
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenization(e.to_string()))
    }
}

/// Lock the model even after a panic mid-forward poisoned the mutex.
/// The only state a panic can leave behind is a stale KV cache, and every
/// sequence starts with `reset`.
fn lock_model<T>(model: &Mutex<T>) -> MutexGuard<'_, T> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

fn inference_err(e: candle_core::Error) -> Error {
    Error::InferenceFailed(e.to_string())
}

fn parse_dtype(dtype: &str) -> Result<DType> {
    match dtype {
        "f32" => Ok(DType::F32),
        "f16" => Ok(DType::F16),
        "bf16" => Ok(DType::BF16),
        other => Err(Error::LoadFailed(format!(
            "unsupported dtype '{}' (expected f32, f16 or bf16)",
            other
        ))),
    }
}

fn select_device(kind: DeviceKind) -> Result<Device> {
    let device = match kind {
        DeviceKind::Cpu => Ok(Device::Cpu),
        DeviceKind::Cuda => Device::new_cuda(0),
        DeviceKind::Metal => Device::new_metal(0),
    };
    device.map_err(|e| Error::LoadFailed(format!("device {:?}: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dtype() {
        assert_eq!(parse_dtype("f32").unwrap(), DType::F32);
        assert_eq!(parse_dtype("bf16").unwrap(), DType::BF16);
        assert!(parse_dtype("int8").is_err());
    }

    #[test]
    fn test_cpu_device_always_available() {
        assert!(select_device(DeviceKind::Cpu).unwrap().is_cpu());
    }

    #[test]
    fn test_lock_model_survives_poisoning() {
        let model = Arc::new(Mutex::new(0u32));
        let poisoner = Arc::clone(&model);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("forward pass failed");
        })
        .join();
        assert!(model.is_poisoned());

        *lock_model(&*model) += 1;
        assert_eq!(*lock_model(&*model), 1);
    }

    #[test]
    fn test_load_fails_for_missing_directory() {
        let config = ModelConfig {
            dir: "/nonexistent/model".to_string(),
            ..Default::default()
        };
        let err = CandleEngine::load(&config).err().unwrap();
        assert!(matches!(err, Error::LoadFailed(_)));
    }

    #[test]
    fn test_load_rejects_bad_dtype_before_touching_disk() {
        let config = ModelConfig {
            dtype: "fp8".to_string(),
            ..Default::default()
        };
        let err = CandleEngine::load(&config).err().unwrap();
        assert!(err.to_string().contains("fp8"));
    }
}

//! Model directory discovery and the causal LM architectures we can load.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{llama, mistral, qwen2};
use serde::Deserialize;

use crate::error::{Error, Result};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Causal LM families, keyed by the `model_type` field of `config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Llama,
    Qwen2,
    Mistral,
}

impl Architecture {
    pub fn from_model_type(model_type: &str) -> Result<Self> {
        match model_type {
            "llama" => Ok(Architecture::Llama),
            "qwen2" => Ok(Architecture::Qwen2),
            "mistral" => Ok(Architecture::Mistral),
            other => Err(Error::LoadFailed(format!(
                "unsupported model_type '{}' (supported: llama, qwen2, mistral)",
                other
            ))),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Llama => write!(f, "llama"),
            Architecture::Qwen2 => write!(f, "qwen2"),
            Architecture::Mistral => write!(f, "mistral"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelHeader {
    model_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

#[derive(Debug, Default, Deserialize)]
struct EosFields {
    #[serde(default)]
    eos_token_id: Option<TokenIds>,
}

/// `tokenizer_config.json` stores special tokens either as plain strings or
/// as added-token objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Text(String),
    Added { content: String },
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfigFields {
    #[serde(default)]
    eos_token: Option<SpecialToken>,
}

#[derive(Debug, Deserialize)]
struct WeightsIndex {
    weight_map: std::collections::HashMap<String, String>,
}

/// Everything needed from a model directory before touching the weights.
#[derive(Debug)]
pub(crate) struct ModelFiles {
    pub architecture: Architecture,
    pub config_json: String,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
    /// EOS ids declared in `config.json` and `generation_config.json`.
    pub eos_token_ids: Vec<u32>,
    /// EOS token text from `tokenizer_config.json`, resolved against the vocabulary later.
    pub eos_token: Option<String>,
}

impl ModelFiles {
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::LoadFailed(format!(
                "model directory {} does not exist",
                dir.display()
            )));
        }

        let config_json = read_required(&dir.join(CONFIG_FILE))?;
        let header: ModelHeader = serde_json::from_str(&config_json)
            .map_err(|e| Error::LoadFailed(format!("invalid {}: {}", CONFIG_FILE, e)))?;
        let architecture = Architecture::from_model_type(&header.model_type)?;

        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.is_file() {
            return Err(Error::LoadFailed(format!("missing {}", tokenizer.display())));
        }

        let mut eos_token_ids = eos_ids(&config_json);
        if let Some(generation) = read_optional(&dir.join(GENERATION_CONFIG_FILE))? {
            eos_token_ids.extend(eos_ids(&generation));
        }
        eos_token_ids.sort_unstable();
        eos_token_ids.dedup();

        let eos_token = read_optional(&dir.join(TOKENIZER_CONFIG_FILE))?
            .and_then(|raw| serde_json::from_str::<TokenizerConfigFields>(&raw).ok())
            .and_then(|fields| fields.eos_token)
            .map(|token| match token {
                SpecialToken::Text(text) => text,
                SpecialToken::Added { content } => content,
            });

        Ok(Self {
            architecture,
            config_json,
            tokenizer,
            weights: weight_files(dir)?,
            eos_token_ids,
            eos_token,
        })
    }
}

fn read_required(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::LoadFailed(format!("cannot read {}: {}", path.display(), e)))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if path.is_file() {
        read_required(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Malformed or absent `eos_token_id` fields contribute nothing.
fn eos_ids(raw: &str) -> Vec<u32> {
    match serde_json::from_str::<EosFields>(raw).map(|f| f.eos_token_id) {
        Ok(Some(TokenIds::One(id))) => vec![id],
        Ok(Some(TokenIds::Many(ids))) => ids,
        _ => Vec::new(),
    }
}

/// Safetensors files for the model: a single file, or the shards named in the index.
fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let single = dir.join(SINGLE_WEIGHTS_FILE);
    if single.is_file() {
        return Ok(vec![single]);
    }

    let index_path = dir.join(WEIGHTS_INDEX_FILE);
    let Some(raw) = read_optional(&index_path)? else {
        return Err(Error::LoadFailed(format!(
            "no {} or {} in {}",
            SINGLE_WEIGHTS_FILE,
            WEIGHTS_INDEX_FILE,
            dir.display()
        )));
    };
    let index: WeightsIndex = serde_json::from_str(&raw)
        .map_err(|e| Error::LoadFailed(format!("invalid {}: {}", WEIGHTS_INDEX_FILE, e)))?;

    let shards: BTreeSet<&String> = index.weight_map.values().collect();
    let mut files = Vec::with_capacity(shards.len());
    for shard in shards {
        let path = dir.join(shard);
        if !path.is_file() {
            return Err(Error::LoadFailed(format!(
                "missing weight shard {}",
                path.display()
            )));
        }
        files.push(path);
    }
    Ok(files)
}

/// A loaded model together with its KV cache.
pub(crate) enum CausalLm {
    Llama {
        model: llama::Llama,
        config: llama::Config,
        cache: llama::Cache,
        dtype: DType,
        device: Device,
    },
    Qwen2(qwen2::ModelForCausalLM),
    Mistral(mistral::Model),
}

impl CausalLm {
    pub fn load(files: &ModelFiles, dtype: DType, device: &Device) -> Result<Self> {
        let parse_err = |e: serde_json::Error| {
            Error::LoadFailed(format!("invalid {} config: {}", files.architecture, e))
        };
        let load_err =
            |e: candle_core::Error| Error::LoadFailed(format!("{} weights: {}", files.architecture, e));

        // SAFETY: the safetensors files are memory-mapped read-only and must not be
        // modified while the server runs.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(files.weights.as_slice(), dtype, device) }
            .map_err(load_err)?;

        let model = match files.architecture {
            Architecture::Llama => {
                let config = serde_json::from_str::<llama::LlamaConfig>(&files.config_json)
                    .map_err(parse_err)?
                    .into_config(false);
                let model = llama::Llama::load(vb, &config).map_err(load_err)?;
                let cache = llama::Cache::new(true, dtype, &config, device).map_err(load_err)?;
                CausalLm::Llama {
                    model,
                    config,
                    cache,
                    dtype,
                    device: device.clone(),
                }
            }
            Architecture::Qwen2 => {
                let config: qwen2::Config =
                    serde_json::from_str(&files.config_json).map_err(parse_err)?;
                CausalLm::Qwen2(qwen2::ModelForCausalLM::new(&config, vb).map_err(load_err)?)
            }
            Architecture::Mistral => {
                let config: mistral::Config =
                    serde_json::from_str(&files.config_json).map_err(parse_err)?;
                CausalLm::Mistral(mistral::Model::new(&config, vb).map_err(load_err)?)
            }
        };
        Ok(model)
    }

    /// Run one forward step and return the next-token logits as a 1-D f32 tensor.
    ///
    /// `input` has shape `(1, seq_len)`; `offset` is the number of tokens already
    /// in the KV cache.
    pub fn next_token_logits(&mut self, input: &Tensor, offset: usize) -> candle_core::Result<Tensor> {
        let logits = match self {
            CausalLm::Llama { model, cache, .. } => model.forward(input, offset, cache)?,
            CausalLm::Qwen2(model) => model.forward(input, offset)?,
            CausalLm::Mistral(model) => model.forward(input, offset)?,
        };
        logits.flatten_all()?.to_dtype(DType::F32)
    }

    /// Drop all cached keys and values before starting a new sequence.
    pub fn reset(&mut self) -> candle_core::Result<()> {
        match self {
            CausalLm::Llama {
                config,
                cache,
                dtype,
                device,
                ..
            } => {
                *cache = llama::Cache::new(true, *dtype, config, device)?;
            }
            CausalLm::Qwen2(model) => model.clear_kv_cache(),
            CausalLm::Mistral(model) => model.clear_kv_cache(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn model_dir(config: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), config).unwrap();
        fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();
        fs::write(dir.path().join(SINGLE_WEIGHTS_FILE), b"").unwrap();
        dir
    }

    #[test]
    fn test_architecture_from_model_type() {
        assert_eq!(Architecture::from_model_type("llama").unwrap(), Architecture::Llama);
        assert_eq!(Architecture::from_model_type("qwen2").unwrap(), Architecture::Qwen2);
        assert_eq!(
            Architecture::from_model_type("mistral").unwrap(),
            Architecture::Mistral
        );
        let err = Architecture::from_model_type("gpt2").unwrap_err();
        assert!(err.to_string().contains("gpt2"));
    }

    #[test]
    fn test_discover_missing_directory() {
        let err = ModelFiles::discover(Path::new("/nonexistent/model/dir")).unwrap_err();
        assert!(matches!(err, Error::LoadFailed(_)));
    }

    #[test]
    fn test_discover_missing_config() {
        let dir = TempDir::new().unwrap();
        let err = ModelFiles::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_discover_unsupported_architecture() {
        let dir = model_dir(r#"{"model_type": "gpt_neox"}"#);
        let err = ModelFiles::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("gpt_neox"));
    }

    #[test]
    fn test_discover_missing_tokenizer() {
        let dir = model_dir(r#"{"model_type": "llama"}"#);
        fs::remove_file(dir.path().join(TOKENIZER_FILE)).unwrap();
        let err = ModelFiles::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }

    #[test]
    fn test_discover_single_weights_file() {
        let dir = model_dir(r#"{"model_type": "qwen2", "eos_token_id": 151643}"#);
        let files = ModelFiles::discover(dir.path()).unwrap();
        assert_eq!(files.architecture, Architecture::Qwen2);
        assert_eq!(files.weights, vec![dir.path().join(SINGLE_WEIGHTS_FILE)]);
        assert_eq!(files.eos_token_ids, vec![151643]);
        assert!(files.eos_token.is_none());
    }

    #[test]
    fn test_discover_merges_eos_sources() {
        let dir = model_dir(r#"{"model_type": "llama", "eos_token_id": 2}"#);
        fs::write(
            dir.path().join(GENERATION_CONFIG_FILE),
            r#"{"eos_token_id": [2, 32000]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(TOKENIZER_CONFIG_FILE),
            r#"{"eos_token": {"content": "</s>", "lstrip": false}}"#,
        )
        .unwrap();

        let files = ModelFiles::discover(dir.path()).unwrap();
        assert_eq!(files.eos_token_ids, vec![2, 32000]);
        assert_eq!(files.eos_token.as_deref(), Some("</s>"));
    }

    #[test]
    fn test_sharded_weights_from_index() {
        let dir = model_dir(r#"{"model_type": "mistral"}"#);
        fs::remove_file(dir.path().join(SINGLE_WEIGHTS_FILE)).unwrap();
        fs::write(
            dir.path().join(WEIGHTS_INDEX_FILE),
            r#"{"weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }}"#,
        )
        .unwrap();
        fs::write(dir.path().join("model-00001-of-00002.safetensors"), b"").unwrap();
        fs::write(dir.path().join("model-00002-of-00002.safetensors"), b"").unwrap();

        let files = ModelFiles::discover(dir.path()).unwrap();
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_missing_shard_is_an_error() {
        let dir = model_dir(r#"{"model_type": "mistral"}"#);
        fs::remove_file(dir.path().join(SINGLE_WEIGHTS_FILE)).unwrap();
        fs::write(
            dir.path().join(WEIGHTS_INDEX_FILE),
            r#"{"weight_map": {"a.weight": "model-00001-of-00001.safetensors"}}"#,
        )
        .unwrap();

        let err = ModelFiles::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("model-00001-of-00001.safetensors"));
    }

    #[test]
    fn test_no_weights_at_all() {
        let dir = model_dir(r#"{"model_type": "llama"}"#);
        fs::remove_file(dir.path().join(SINGLE_WEIGHTS_FILE)).unwrap();
        let err = ModelFiles::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_INDEX_FILE));
    }
}

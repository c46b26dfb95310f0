//! Configuration for the inference server.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Environment variable selecting the model directory; wins over every other source.
pub const MODEL_DIR_ENV: &str = "MODEL_DIR";

/// Main configuration structure for the inference server.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Where the model lives and how it is loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory holding `config.json`, `tokenizer.json` and safetensors weights.
    #[serde(default = "default_model_dir")]
    pub dir: String,
    /// Name reported in responses when the request does not set `model`.
    /// Defaults to `dir`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device: DeviceKind,
    /// Weight dtype: "f32", "f16" or "bf16".
    #[serde(default = "default_dtype")]
    pub dtype: String,
    /// Base seed for sampling when a request does not provide one.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Token counts reported in `usage` are capped at this many tokens per text.
    #[serde(default = "default_usage_max_length")]
    pub usage_max_length: usize,
}

impl ModelConfig {
    pub fn served_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.dir)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            name: None,
            device: DeviceKind::default(),
            dtype: default_dtype(),
            seed: default_seed(),
            usage_max_length: default_usage_max_length(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_model_dir() -> String {
    "model".to_string()
}
fn default_dtype() -> String {
    "f32".to_string()
}
fn default_seed() -> u64 {
    299792458
}
fn default_usage_max_length() -> usize {
    512
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. `MODEL_DIR` environment variable (model directory only)
    /// 2. Environment variables (INFERENCE__SECTION__KEY format)
    /// 3. config.toml file (if present)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_model_dir(std::env::var(MODEL_DIR_ENV).ok())
    }

    fn load_with_model_dir(model_dir: Option<String>) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("api.host", default_host())?
            .set_default("api.port", default_port() as i64)?
            .set_default("model.dir", default_model_dir())?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("INFERENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("model.dir", model_dir.filter(|d| !d.is_empty()))?
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_config() {
        let api = ApiConfig::default();
        assert_eq!(api.host, "0.0.0.0");
        assert_eq!(api.port, 8000);
    }

    #[test]
    fn test_default_model_config() {
        let model = ModelConfig::default();
        assert_eq!(model.dir, "model");
        assert_eq!(model.device, DeviceKind::Cpu);
        assert_eq!(model.dtype, "f32");
        assert_eq!(model.usage_max_length, 512);
        assert_eq!(model.served_name(), "model");
    }

    #[test]
    fn test_served_name_prefers_explicit_name() {
        let model = ModelConfig {
            dir: "/models/qwen".to_string(),
            name: Some("qwen2.5-0.5b".to_string()),
            ..Default::default()
        };
        assert_eq!(model.served_name(), "qwen2.5-0.5b");
    }

    #[test]
    fn test_model_dir_override() {
        let config = Config::load_with_model_dir(Some("/srv/models/tiny".to_string())).unwrap();
        assert_eq!(config.model.dir, "/srv/models/tiny");
        assert_eq!(config.model.served_name(), "/srv/models/tiny");
    }

    #[test]
    fn test_empty_model_dir_is_ignored() {
        let config = Config::load_with_model_dir(Some(String::new())).unwrap();
        assert!(!config.model.dir.is_empty());
    }

    #[test]
    fn test_device_kind_parses_lowercase() {
        let device: DeviceKind = serde_json::from_str(r#""cuda""#).unwrap();
        assert_eq!(device, DeviceKind::Cuda);
    }
}

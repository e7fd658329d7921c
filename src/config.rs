use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::semantic::RetryPolicy;
use crate::storage;

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default embedding model
const DEFAULT_MODEL: &str = "text-embedding-ada-002";
/// Default OpenAI-compatible API root
const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
/// Environment variable holding the provider API key
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// USD per token for the default model ($0.0004 / 1K tokens)
const DEFAULT_PRICE_PER_TOKEN: f64 = 0.0004 / 1000.0;
/// Context window of the default model, in tokens
const DEFAULT_CONTEXT_LENGTH: usize = 8191;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Pause after every successful provider call
const DEFAULT_THROTTLE_MS: u64 = 100;
const DEFAULT_VAULT_NAME: &str = "ObsidianVault";
const DEFAULT_STORE_FILE: &str = "embeddings.csv";
const DEFAULT_CACHE_FILE: &str = "query_cache.json";

/// Directories never walked when collecting notes
const DEFAULT_SKIP_DIRS: [&str; 6] = [
    "_templates",
    "_scripts",
    ".obsidian",
    "__Canvases",
    ".git",
    "_attachments",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Retry schedule for embedding requests
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lower bound of every backoff, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound of every backoff, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    20_000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Vault name used in obsidian:// deep links
    #[serde(default = "default_vault_name")]
    pub vault_name: String,

    /// Embedding model identifier sent to the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the environment variable holding the API key.
    /// The key itself is never written to disk.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_price_per_token")]
    pub price_per_token: f64,

    /// Maximum tokens per embedded block
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    #[serde(default = "default_store_file")]
    pub store_file: String,

    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_name: default_vault_name(),
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            price_per_token: default_price_per_token(),
            context_length: default_context_length(),
            request_timeout_secs: default_request_timeout_secs(),
            throttle_ms: default_throttle_ms(),
            retry: RetryConfig::default(),
            skip_dirs: default_skip_dirs(),
            store_file: default_store_file(),
            cache_file: default_cache_file(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_vault_name() -> String {
    DEFAULT_VAULT_NAME.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_price_per_token() -> f64 {
    DEFAULT_PRICE_PER_TOKEN
}

fn default_context_length() -> usize {
    DEFAULT_CONTEXT_LENGTH
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_throttle_ms() -> u64 {
    DEFAULT_THROTTLE_MS
}

fn default_skip_dirs() -> Vec<String> {
    DEFAULT_SKIP_DIRS.iter().map(|d| d.to_string()).collect()
}

fn default_store_file() -> String {
    DEFAULT_STORE_FILE.to_string()
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

impl Config {
    /// In-memory config rooted at `base_path`, nothing is read or written.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }

        if !(self.price_per_token.is_finite() && self.price_per_token >= 0.0) {
            return Err(ConfigError::invalid(
                "price_per_token",
                format!("must be a non-negative number, got {}", self.price_per_token),
            ));
        }

        if self.context_length == 0 {
            return Err(ConfigError::invalid("context_length", "must be greater than 0"));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms",
                format!(
                    "must not exceed retry.max_backoff_ms ({} > {})",
                    self.retry.initial_backoff_ms, self.retry.max_backoff_ms
                ),
            ));
        }

        for (field, value) in [("store_file", &self.store_file), ("cache_file", &self.cache_file)] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults when missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(CONFIG_FILE_NAME);

        // create new if does not exist
        if !path.exists() {
            log::info!("Creating default config at {}", path.display());
            let default_str = serde_yml::to_string(&Self::default())?;
            storage::write_atomic(&path, default_str.as_bytes())?;
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        let upgraded = serde_yml::to_string(&config)?;
        if config_str != upgraded {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        storage::write_atomic(&self.base_path.join(CONFIG_FILE_NAME), config_str.as_bytes())?;
        Ok(())
    }

    /// Directory holding the config, the store, the cache and the lock file.
    pub fn data_dir(&self) -> &Path {
        &self.base_path
    }

    pub fn store_path(&self) -> PathBuf {
        self.base_path.join(&self.store_file)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.base_path.join(&self.cache_file)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

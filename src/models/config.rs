use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_TOKEN_BUDGET: u32 = 512;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docindex").join("config.toml"))
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("docindex")
    }

    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.token_budget must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.query.top_n == 0 {
            return Err(ConfigError::ValidationError(
                "query.top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root under which `projects/<id>/` index directories live
    #[serde(default = "Config::default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_borrow_wait_timeout_ms")]
    pub borrow_wait_timeout_ms: u64,

    #[serde(default = "default_idle_eviction_delay_secs")]
    pub idle_eviction_delay_secs: u64,

    #[serde(default = "default_min_idle_time_secs")]
    pub min_idle_time_secs: u64,

    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

fn default_borrow_wait_timeout_ms() -> u64 {
    30_000
}

fn default_idle_eviction_delay_secs() -> u64 {
    300
}

fn default_min_idle_time_secs() -> u64 {
    60
}

fn default_eviction_interval_secs() -> u64 {
    30
}

impl IndexConfig {
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn borrow_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.borrow_wait_timeout_ms)
    }

    pub fn idle_eviction_delay(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_delay_secs)
    }

    pub fn min_idle_time(&self) -> Duration {
        Duration::from_secs(self.min_idle_time_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: Config::default_data_dir(),
            borrow_wait_timeout_ms: default_borrow_wait_timeout_ms(),
            idle_eviction_delay_secs: default_idle_eviction_delay_secs(),
            min_idle_time_secs: default_min_idle_time_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    /// `tokenizer.json` used for token counts; byte heuristic when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_token_budget() -> u32 {
    DEFAULT_TOKEN_BUDGET
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    16
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    3_000
}

impl ReconcileConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_n")]
    pub top_n: u32,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

fn default_top_n() -> u32 {
    10
}

fn default_score_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            score_threshold: default_score_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `reconcile = "debug"`
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            targets: BTreeMap::new(),
        }
    }
}

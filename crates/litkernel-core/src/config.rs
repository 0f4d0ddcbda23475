//! Pipeline configuration.
//!
//! One immutable [`PipelineConfig`] is built at start-up (defaults, then an
//! optional TOML file, then environment, then CLI overrides) and handed to
//! the controller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 16_000;
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_SAMPLE_WINDOW_WORDS: usize = 9_000;
pub const DEFAULT_EXTRACTION_WINDOW_WORDS: usize = 3_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}

/// Generative-service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_version: String,
    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: None,
        }
    }
}

/// Everything the controller needs besides the document and collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub checkpoint_dir: PathBuf,
    pub records_dir: PathBuf,
    /// Wait before every service call after the first.
    pub cooldown_secs: u64,
    /// Words per stage-0 sampling window.
    pub sample_window_words: usize,
    /// Words sent per stage-1 extraction call.
    pub extraction_window_words: usize,
    pub service: ServiceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            records_dir: PathBuf::from("records"),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            sample_window_words: DEFAULT_SAMPLE_WINDOW_WORDS,
            extraction_window_words: DEFAULT_EXTRACTION_WINDOW_WORDS,
            service: ServiceConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        })
}

impl PipelineConfig {
    /// Defaults overlaid with `LITKERNEL_*` variables and `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Load a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides read through `lookup`.
    pub fn overlay_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("LITKERNEL_CHECKPOINT_DIR") {
            self.checkpoint_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LITKERNEL_RECORDS_DIR") {
            self.records_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LITKERNEL_COOLDOWN_SECS") {
            self.cooldown_secs = parse_var("LITKERNEL_COOLDOWN_SECS", v)?;
        }
        if let Some(v) = lookup("LITKERNEL_SAMPLE_WINDOW") {
            self.sample_window_words = parse_var("LITKERNEL_SAMPLE_WINDOW", v)?;
        }
        if let Some(v) = lookup("LITKERNEL_EXTRACTION_WINDOW") {
            self.extraction_window_words = parse_var("LITKERNEL_EXTRACTION_WINDOW", v)?;
        }
        if let Some(v) = lookup("LITKERNEL_BASE_URL") {
            self.service.base_url = v;
        }
        if let Some(v) = lookup("LITKERNEL_MODEL") {
            self.service.model = v;
        }
        if let Some(v) = lookup("LITKERNEL_MAX_TOKENS") {
            self.service.max_tokens = parse_var("LITKERNEL_MAX_TOKENS", v)?;
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.service.api_key = Some(v);
        }
        Ok(self)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_records_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.records_dir = dir.into();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    pub fn with_sample_window(mut self, words: usize) -> Self {
        self.sample_window_words = words;
        self
    }

    pub fn with_extraction_window(mut self, words: usize) -> Self {
        self.extraction_window_words = words;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.service.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.service.api_key = Some(key.into());
        self
    }
}

// Location: src/config.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::model::{
    LoadPolicy, ModelFamily, DEFAULT_HISTORY_CAPACITY, PROMPT_PLACEHOLDER,
    TOKENIZER_QUIRK_ERROR_CODE,
};
use crate::processing::DEFAULT_BATCH_THRESHOLD;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub runtime: RuntimeConfig,
    pub history: HistoryConfig,
    pub streaming: StreamingConfig,
    pub generation: GenerationDefaults,
    pub prompts: PromptConfig,
    pub staging: StagingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Load error code that still leaves the runner usable. `None` makes every load
    /// failure fatal.
    pub tolerated_load_error_code: Option<i32>,

    /// Load weights during `load_model` instead of on first generation
    pub preload: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tolerated_load_error_code: Some(TOKENIZER_QUIRK_ERROR_CODE),
            preload: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum prompts kept
    pub capacity: usize,

    /// Forget the conversation when the model is unloaded
    pub clear_on_unload: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            clear_on_unload: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// A batch is flushed once more than this many tokens are buffered
    pub batch_threshold: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    /// Per-family sequence length used when a request does not set one
    pub sequence_lengths: HashMap<ModelFamily, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Per-family template overrides, each with one `{}` placeholder
    pub templates: HashMap<ModelFamily, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Root that relative model and tokenizer paths are resolved against
    pub asset_root: Option<PathBuf>,

    /// Where staged assets are copied. Without it relative paths are used as given.
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    /// Applied by `BridgeBuilder::with_logging`, or by passing
    /// `LogConfig::from(&monitoring)` to `setup_logging`
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| BridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            return Err(BridgeError::configuration(
                "history.capacity",
                "History capacity must be at least 1",
            ));
        }

        if self.streaming.batch_threshold == 0 {
            return Err(BridgeError::configuration(
                "streaming.batch_threshold",
                "Batch threshold must be at least 1",
            ));
        }

        for (family, length) in &self.generation.sequence_lengths {
            if *length == 0 {
                return Err(BridgeError::configuration(
                    format!("generation.sequence_lengths.{}", family.name()),
                    "Sequence length must be positive",
                ));
            }
        }

        for (family, template) in &self.prompts.templates {
            if template.matches(PROMPT_PLACEHOLDER).count() != 1 {
                return Err(BridgeError::configuration(
                    format!("prompts.templates.{}", family.name()),
                    "Template must contain exactly one {} placeholder",
                ));
            }
        }

        Ok(())
    }

    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy::new(self.runtime.tolerated_load_error_code)
    }

    /// Request value, then configured default, then the family's built-in length
    pub fn sequence_length_for(&self, family: ModelFamily, requested: Option<usize>) -> usize {
        requested
            .or_else(|| self.generation.sequence_lengths.get(&family).copied())
            .unwrap_or_else(|| family.default_sequence_length())
    }

    pub fn template_for(&self, family: ModelFamily) -> &str {
        self.prompts
            .templates
            .get(&family)
            .map(String::as_str)
            .unwrap_or_else(|| family.prompt_template())
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "cyberbud";
const DEFAULT_DB_NAME: &str = "cyberbud.db";
const DEFAULT_LOG_NAME: &str = "cyberbud.log";
const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_MAX_MESSAGES: usize = 25;
pub const DEFAULT_QUIZ_BATCH: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub max_messages_per_session: usize,
    pub quiz_batch_size: usize,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        let dir = app_dir();
        Self {
            db_path: dir.join(DEFAULT_DB_NAME),
            log_path: dir.join(DEFAULT_LOG_NAME),
            max_messages_per_session: DEFAULT_MAX_MESSAGES,
            quiz_batch_size: DEFAULT_QUIZ_BATCH,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CYBERBUD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_dir().join(CONFIG_FILE_NAME));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());

        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db) = var("CYBERBUD_DB") {
            self.db_path = PathBuf::from(db);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("CYBERBUD_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = var("CYBERBUD_API_URL") {
            self.llm.endpoint = url;
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

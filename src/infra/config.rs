//! YAML configuration with `.env` / environment overrides.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use al_base::config::{FocusMode, ModelSelection, OptimizationMode};

use super::constants::{CONFIG_FILE, DEFAULT_SERVER_URL};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Yaml { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "Failed to read {}: {}", path.display(), message),
            ConfigError::Yaml { path, message } => write!(f, "Invalid YAML in {}: {}", path.display(), message),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub chat_model: ModelSelection,
    pub embedding_model: ModelSelection,
    pub focus_mode: FocusMode,
    pub optimization_mode: OptimizationMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            chat_model: ModelSelection::default(),
            embedding_model: ModelSelection::default(),
            focus_mode: FocusMode::default(),
            optimization_mode: OptimizationMode::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the config file (ANSWERLINE_CONFIG or ./answerline.yaml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = std::env::var("ANSWERLINE_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(CONFIG_FILE));
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let yaml = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.to_path_buf(), message: e.to_string() })?;
        Self::from_yaml(&yaml).map_err(|message| ConfigError::Yaml { path: path.to_path_buf(), message })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| e.to_string())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 5] = [
            ("ANSWERLINE_SERVER_URL", &mut self.server_url),
            ("ANSWERLINE_CHAT_MODEL", &mut self.chat_model.name),
            ("ANSWERLINE_CHAT_PROVIDER", &mut self.chat_model.provider),
            ("ANSWERLINE_EMBEDDING_MODEL", &mut self.embedding_model.name),
            ("ANSWERLINE_EMBEDDING_PROVIDER", &mut self.embedding_model.provider),
        ];
        for (key, target) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }

    /// Both model selections are known.
    pub fn is_ready(&self) -> bool {
        self.chat_model.is_set() && self.embedding_model.is_set()
    }
}

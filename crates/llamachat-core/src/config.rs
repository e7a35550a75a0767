use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ai::OllamaClient;
use crate::error::{ChatError, Result};

pub const DEFAULT_MODEL: &str = "llama3.2:latest";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_GREETING: &str = "Hi! Ask me anything.";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub model: String,
    pub temperature: f32,
    /// First assistant message of every session. `None` starts empty.
    pub greeting: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: OllamaClient::DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_default();
        config.model = model.to_string();
        config.save()
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ChatError::Config("host must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".to_string()));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ChatError::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Directory holding the config file and the debug log.
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("llamachat"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

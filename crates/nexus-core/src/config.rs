use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::gemini::DEFAULT_ENDPOINT;
use crate::controller::DEFAULT_MAX_INPUT_CHARS;
use crate::error::{Error, Result};

const APP_DIR: &str = "dev-nexus";

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const ENDPOINT_ENV: &str = "GEMINI_ENDPOINT";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub history_path: Option<PathBuf>,
    pub max_input_chars: Option<usize>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the user config directory; a missing file means defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("could not read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::config(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::config(e.to_string()))?;
        Ok(())
    }

    /// The environment wins over the file so keys never have to be written to disk
    pub fn resolved_api_key(&self) -> Result<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                Error::config(format!(
                    "no API key configured; set {} or add \"api_key\" to {}",
                    API_KEY_ENV,
                    Self::config_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| "config.json".to_string())
                ))
            })
    }

    pub fn resolved_endpoint(&self) -> String {
        std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn resolved_history_path(&self) -> Result<PathBuf> {
        match &self.history_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("messages.json")),
        }
    }

    pub fn resolved_max_input_chars(&self) -> usize {
        self.max_input_chars.unwrap_or(DEFAULT_MAX_INPUT_CHARS)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::config("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Where history and logs live
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::config("Could not determine data directory"))?;

        Ok(data_dir.join(APP_DIR))
    }
}

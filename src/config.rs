use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global hotkey combo, e.g. "Ctrl+Shift+D".
    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    /// Transcription language; "auto" lets the backend detect it.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Request timeout in seconds for backend calls.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Optional shell command run after each transcription, receiving the
    /// text on stdin.
    #[serde(default)]
    pub transcription_hook: Option<String>,
}

fn default_hotkey() -> String {
    "Ctrl+Shift+D".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8610".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            language: default_language(),
            backend_url: default_backend_url(),
            timeout: default_timeout(),
            transcription_hook: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    /// (~/.config/whisperkey/config.json), creating it on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("whisperkey").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.hotkey.is_empty() {
            return Err(anyhow::anyhow!("hotkey cannot be empty"));
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "backend_url must be an http(s) URL, got {:?}",
                self.backend_url
            ));
        }

        Ok(())
    }
}

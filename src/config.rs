use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prompts::DEFAULT_SYSTEM_PROMPT;

/// Main application configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key stored in the config file. The environment variable wins when both are set.
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Base URL of the chat-completion API
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Reply length cap, in tokens
    pub max_tokens: u32,

    /// Instruction sent as the system turn
    pub system_prompt: String,

    /// HTTP timeout for a single completion round-trip, in seconds
    pub request_timeout_secs: u64,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Maximum number of text lines the composer grows to
    pub max_input_lines: u16,
    /// How long the "Copied" acknowledgment stays visible
    pub copy_ack_millis: u64,
    /// Redraw interval for the event loop
    pub tick_millis: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            max_input_lines: 8,
            copy_ack_millis: 2000,
            tick_millis: 100,
        }
    }
}

impl UiConfig {
    pub fn copy_ack(&self) -> Duration {
        Duration::from_millis(self.copy_ack_millis)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(10))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 300,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_secs: 60,
            ui: UiConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("ui", &self.ui)
            .finish()
    }
}

impl Config {
    /// Directory holding the config file and logs (`~/.bit`)
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".bit"))
    }

    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get API key from environment or config
    pub fn get_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    /// Check if API key is configured
    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Full URL of the chat-completion endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// TOML rendering with the API key masked, for display
    pub fn redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.api_key.is_some() {
            shown.api_key = Some("[redacted]".to_string());
        }
        toml::to_string_pretty(&shown).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_endpoint() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert_eq!(
            config.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.ui.copy_ack(), Duration::from_secs(2));
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            model = "gpt-4o-mini"
            base_url = "http://localhost:8080/v1/"

            [ui]
            max_input_lines = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.ui.max_input_lines, 4);
        assert_eq!(config.ui.copy_ack_millis, 2000);
    }

    #[test]
    fn debug_and_display_never_show_the_key() {
        let config = Config {
            api_key: Some("sk-secret".to_string()),
            ..Config::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
        assert!(!config.redacted_toml().unwrap().contains("sk-secret"));
    }

    #[test]
    fn config_file_key_is_used_when_env_is_unset() {
        let config = Config {
            api_key: Some("sk-from-file".to_string()),
            api_key_env: "BIT_TEST_UNSET_KEY_VAR".to_string(),
            ..Config::default()
        };
        assert_eq!(config.get_api_key().as_deref(), Some("sk-from-file"));

        let blank = Config {
            api_key: Some("   ".to_string()),
            api_key_env: "BIT_TEST_UNSET_KEY_VAR".to_string(),
            ..Config::default()
        };
        assert!(!blank.has_api_key());
    }

    #[test]
    fn save_then_load_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("bit-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let config = Config {
            model: "local-model".to_string(),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.model, "local-model");
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("bit-does-not-exist/config.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.model, Config::default().model);
    }
}

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::error::ConfigError;
use super::error::SettingsError;
use super::persistence::SnapshotStore;
use super::prompt::SystemPrompt;
use super::state::ColorScheme;
use super::state::SessionSettings;
use super::state::TerminalAppearance;
use super::state::DEFAULT_MAX_HISTORY_LENGTH;
use super::state::DEFAULT_TERMINAL_FONT_SIZE;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub session: SessionDefaults,
    pub storage: StorageConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    #[default]
    Gemini,
    Ollama,
    GeminiCli,
    Codex,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    /// Name of the environment variable holding the credential.
    pub api_key_env: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionDefaults {
    pub max_history_length: usize,
    pub statefulness: bool,
    pub quiet_mode: bool,
    pub terminal_color_scheme: ColorScheme,
    pub terminal_font_size: u8,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            statefulness: false,
            quiet_mode: false,
            terminal_color_scheme: ColorScheme::Default,
            terminal_font_size: DEFAULT_TERMINAL_FONT_SIZE,
        }
    }
}

impl SessionDefaults {
    pub fn check(&self) -> Result<(), SettingsError> {
        self.settings().check()?;
        self.terminal().check()
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            max_history_length: self.max_history_length,
            statefulness: self.statefulness,
            quiet_mode: self.quiet_mode,
        }
    }

    pub fn terminal(&self) -> TerminalAppearance {
        TerminalAppearance {
            color_scheme: self.terminal_color_scheme,
            font_size: self.terminal_font_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub snapshot_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(
            self.snapshot_path
                .clone()
                .unwrap_or_else(SnapshotStore::default_path),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt_path: Option<PathBuf>,
}

impl PromptConfig {
    pub fn system_prompt(&self) -> Result<SystemPrompt, ConfigError> {
        match &self.system_prompt_path {
            Some(path) => Ok(SystemPrompt::load(path)?),
            None => Ok(SystemPrompt::default()),
        }
    }
}

impl Config {
    /// `~/.config/blackbox/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blackbox").join("config.toml"))
    }

    /// Loads `explicit` when given (it must exist), else the default path
    /// when present, else the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = toml::from_str::<Self>(&content)?;
        config.session.check()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}

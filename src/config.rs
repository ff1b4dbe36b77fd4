use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR_NAME: &str = "selection-digest";
pub const CONFIG_FILE_NAME: &str = "config.json";

const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";
const ENV_BASE_URL: &str = "DEEPSEEK_BASE_URL";
const ENV_TARGET_LANGUAGE: &str = "SELECTION_DIGEST_TARGET_LANGUAGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// Longest silence tolerated between two stream fragments.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Global shortcut that asks the detector for an immediate probe.
    #[serde(default = "default_probe_shortcut")]
    pub probe_shortcut: String,
    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model_name() -> String {
    "deepseek-chat".to_string()
}

fn default_target_language() -> String {
    "English".to_string()
}

fn default_stream_idle_timeout_secs() -> u64 {
    30
}

fn default_probe_shortcut() -> String {
    "Ctrl+Alt+Q".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub slow_interval_ms: u64,
    pub fast_interval_ms: u64,
    pub idle_ticks_threshold: u32,
    pub probe_cooldown_ms: u64,
    pub inactivity_ms: u64,
    pub settle_delay_ms: u64,
    pub clipboard_lock_timeout_ms: u64,
    pub detect_deselection: bool,
    pub manual_probe_debounce_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            slow_interval_ms: 500,
            fast_interval_ms: 100,
            idle_ticks_threshold: 2,
            probe_cooldown_ms: 1000,
            inactivity_ms: 3000,
            settle_delay_ms: 100,
            clipboard_lock_timeout_ms: 500,
            detect_deselection: false,
            manual_probe_debounce_ms: 500,
        }
    }
}

impl DetectorConfig {
    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn probe_cooldown(&self) -> Duration {
        Duration::from_millis(self.probe_cooldown_ms)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::from_millis(self.inactivity_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn clipboard_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.clipboard_lock_timeout_ms)
    }

    pub fn manual_probe_debounce(&self) -> Duration {
        Duration::from_millis(self.manual_probe_debounce_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model_name: default_model_name(),
            target_language: default_target_language(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            probe_shortcut: default_probe_shortcut(),
            detector: DetectorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Non-blank API key, if one is configured.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    /// Applies environment overrides on top of the persisted values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_blank(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_blank(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(language) = non_blank(ENV_TARGET_LANGUAGE) {
            self.target_language = language;
        }
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
}

/// Reads `config.json` from `dir`, writing the defaults when the file is missing.
pub fn load_or_init(dir: &Path) -> Result<AppConfig> {
    let path = dir.join(CONFIG_FILE_NAME);

    if !path.exists() {
        let default_config = AppConfig::default();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        let json = serde_json::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(default_config);
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed config at {}", path.display()))
}

/// Loads the persisted config once at startup and layers the process environment on top.
pub fn load() -> Result<AppConfig> {
    let mut config = match config_dir() {
        Some(dir) => load_or_init(&dir)?,
        None => {
            log::warn!("No config directory available, using defaults");
            AppConfig::default()
        }
    };
    config.apply_env_overrides(|name| std::env::var(name).ok());

    if config.credential().is_none() {
        log::warn!("{} is not set; requests will report a missing credential", ENV_API_KEY);
    }

    Ok(config)
}

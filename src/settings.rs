//! Application settings storage
//!
//! Stores configuration like the Gemini API key in a JSON file in the app data directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use crate::utils::safe_truncate;

/// Global settings instance
static SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// Path to config file (set during init)
static CONFIG_PATH: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Environment variable holding the completion service key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UsageStats {
    #[serde(default)]
    pub total_prompt_tokens: u64,
    #[serde(default)]
    pub total_response_tokens: u64,
    #[serde(default)]
    pub analyses: u32,
    #[serde(default)]
    pub chat_turns: u32,
    /// Millis since epoch of the last completion call
    #[serde(default)]
    pub last_used_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Model identifier passed to generateContent
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sessions idle for longer than this are dropped
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default)]
    pub usage: UsageStats,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_session_idle_secs() -> u64 {
    60 * 60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: default_model(),
            request_timeout_secs: default_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            session_idle_secs: default_session_idle_secs(),
            usage: UsageStats::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk or create default
    pub(crate) fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                    Settings::default()
                }),
                Err(_) => Settings::default(),
            }
        } else {
            Settings::default()
        }
    }

    /// Save settings to disk
    pub(crate) fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, content)
            .map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}

/// Default app data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("legalize"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Initialize settings with the app data directory
pub fn init(app_data_dir: PathBuf) {
    let config_path = app_data_dir.join("settings.json");
    let settings = Settings::load(&config_path);
    tracing::debug!("Settings loaded from {}", config_path.display());

    if let Ok(mut guard) = CONFIG_PATH.write() {
        *guard = Some(config_path);
    }
    if let Ok(mut guard) = SETTINGS.write() {
        *guard = Some(settings);
    }
}

/// Apply a mutation to the in-memory settings and persist them
fn update<F>(mutate: F) -> Result<(), String>
where
    F: FnOnce(&mut Settings),
{
    let mut settings_guard = SETTINGS.write()
        .map_err(|_| "Failed to acquire settings lock")?;

    let settings = settings_guard.get_or_insert_with(Settings::default);
    mutate(settings);

    // Save to disk
    let config_path = CONFIG_PATH.read()
        .map_err(|_| "Failed to acquire config path lock")?
        .clone()
        .ok_or("Settings not initialized")?;

    settings.save(&config_path)
}

fn read<T>(f: impl FnOnce(&Settings) -> T) -> Option<T> {
    let guard = SETTINGS.read().ok()?;
    guard.as_ref().map(f)
}

// ==================== Gemini API Key ====================

/// Get the current API key (checks env var first, then stored setting)
pub fn get_api_key() -> Option<String> {
    // Environment variable takes precedence
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }

    // Fall back to stored setting
    read(|s| s.gemini_api_key.clone())
        .flatten()
        .filter(|k| !k.trim().is_empty())
}

/// Check if API key is available
pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

/// Set and save the API key
pub fn set_api_key(key: String) -> Result<(), String> {
    update(|s| {
        s.gemini_api_key = if key.is_empty() { None } else { Some(key) };
    })?;
    tracing::info!("API key saved to settings");
    Ok(())
}

/// Get masked API key for display (shows first 8 / last 4 chars)
pub fn get_masked_api_key() -> Option<String> {
    get_api_key().map(|key| mask_key(&key))
}

fn mask_key(key: &str) -> String {
    if key.len() > 12 && key.is_ascii() {
        format!("{}...{}", safe_truncate(key, 8), &key[key.len() - 4..])
    } else {
        "*".repeat(key.chars().count())
    }
}

// ==================== Model / Transport ====================

/// Model identifier (default: "gemini-2.5-flash")
pub fn get_model() -> String {
    read(|s| s.model.clone()).unwrap_or_else(default_model)
}

pub fn set_model(model: String) -> Result<(), String> {
    if model.trim().is_empty() {
        return Err("Model name cannot be empty".to_string());
    }
    update(|s| s.model = model.clone())?;
    tracing::info!("Model set to: {}", model);
    Ok(())
}

pub fn request_timeout() -> Duration {
    Duration::from_secs(read(|s| s.request_timeout_secs).unwrap_or_else(default_timeout_secs))
}

pub fn max_upload_bytes() -> usize {
    read(|s| s.max_upload_bytes).unwrap_or_else(default_max_upload_bytes)
}

pub fn session_idle_timeout() -> Duration {
    Duration::from_secs(read(|s| s.session_idle_secs).unwrap_or_else(default_session_idle_secs))
}

// ==================== Usage Stats ====================

pub fn get_usage_stats() -> UsageStats {
    read(|s| s.usage.clone()).unwrap_or_default()
}

/// Add Gemini token usage (additive)
pub fn add_gemini_tokens(prompt_tokens: u64, response_tokens: u64) -> Result<(), String> {
    update(|s| {
        s.usage.total_prompt_tokens += prompt_tokens;
        s.usage.total_response_tokens += response_tokens;
        s.usage.last_used_at = Some(chrono::Utc::now().timestamp_millis());
    })
}

/// Run a settings write on the blocking pool so async callers never wait on disk.
///
/// Outside a tokio runtime the write runs inline.
pub fn persist_in_background<F>(write: F)
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let run = move || {
        if let Err(e) = write() {
            tracing::debug!("Settings not saved: {}", e);
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(run);
        }
        Err(_) => run(),
    }
}

pub fn record_analysis() -> Result<(), String> {
    update(|s| s.usage.analyses += 1)
}

pub fn record_chat() -> Result<(), String> {
    update(|s| s.usage.chat_turns += 1)
}

//! Application configuration for TabContext.
//!
//! User config lives at `~/.tabcontext/tabcontext.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabContextError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tabcontext.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tabcontext";

// ---------------------------------------------------------------------------
// Config structs (matching tabcontext.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Classification service settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Tab collection settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Session store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Downstream dashboard backend.
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Chat-completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model ID sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_cluster_temperature")]
    pub cluster_temperature: f32,

    #[serde(default = "default_cluster_max_tokens")]
    pub cluster_max_tokens: u32,

    #[serde(default = "default_resolve_temperature")]
    pub resolve_temperature: f32,

    #[serde(default = "default_resolve_max_tokens")]
    pub resolve_max_tokens: u32,

    /// HTTP timeout for a single classification call.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Retry a failed classification call once before falling back.
    #[serde(default)]
    pub retry_once: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            cluster_temperature: default_cluster_temperature(),
            cluster_max_tokens: default_cluster_max_tokens(),
            resolve_temperature: default_resolve_temperature(),
            resolve_max_tokens: default_resolve_max_tokens(),
            timeout_secs: default_classifier_timeout(),
            retry_once: false,
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_cluster_temperature() -> f32 {
    0.3
}
fn default_cluster_max_tokens() -> u32 {
    2000
}
fn default_resolve_temperature() -> f32 {
    0.2
}
fn default_resolve_max_tokens() -> u32 {
    300
}
fn default_classifier_timeout() -> u64 {
    60
}

/// `[collector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Chrome remote-debugging base URL (`chrome --remote-debugging-port=9222`).
    #[serde(default = "default_devtools_url")]
    pub devtools_url: String,

    /// Timeout for fetching one page's document.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// URL prefixes excluded in addition to the built-in internal/extension ones.
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            devtools_url: default_devtools_url(),
            fetch_timeout_secs: default_fetch_timeout(),
            exclude_prefixes: Vec::new(),
        }
    }
}

fn default_devtools_url() -> String {
    "http://127.0.0.1:9222".into()
}
fn default_fetch_timeout() -> u64 {
    15
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Session database path. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.tabcontext/session.db".into()
}

/// `[dashboard]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the dashboard generation backend.
    #[serde(default = "default_dashboard_endpoint")]
    pub endpoint: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            endpoint: default_dashboard_endpoint(),
        }
    }
}

fn default_dashboard_endpoint() -> String {
    "http://localhost:8083".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tabcontext/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TabContextError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tabcontext/tabcontext.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TabContextError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TabContextError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TabContextError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TabContextError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TabContextError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| TabContextError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the API token from the env var named in the config.
pub fn api_token_from_env(config: &AppConfig) -> Option<String> {
    std::env::var(&config.classifier.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

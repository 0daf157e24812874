//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/sanad/config.toml)
//! 3. Environment variables (SANAD_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "SANAD";

/// Default number of chat messages fetched on load
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Which backend the gateway talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite file in the data directory
    #[default]
    Local,
    /// Hosted REST + realtime backend
    Hosted,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Local => "local",
            Backend::Hosted => "hosted",
        })
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "hosted" => Ok(Backend::Hosted),
            other => bail!("Unknown backend '{}'. Use 'local' or 'hosted'.", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend selection
    #[serde(default)]
    pub backend: Backend,

    /// Directory for local data (SQLite store, vote ledger, logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Hosted backend base URL
    #[serde(default)]
    pub api_url: Option<String>,

    /// Hosted backend public API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Realtime endpoint (derived from api_url when unset)
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// Number of chat messages fetched on load
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Log file for the interactive chat
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
            api_url: None,
            api_key: None,
            realtime_url: None,
            page_size: DEFAULT_PAGE_SIZE,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SANAD_BACKEND, SANAD_API_URL, ...)
    /// 2. Config file (~/.config/sanad/config.toml or SANAD_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // SANAD_BACKEND
        if let Some(val) = env_var("BACKEND") {
            self.backend = val.parse()?;
        }

        // SANAD_DATA_DIR
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        // SANAD_API_URL / SANAD_API_KEY / SANAD_REALTIME_URL; empty clears
        if let Some(val) = env_var("API_URL") {
            self.api_url = non_empty(val);
        }
        if let Some(val) = env_var("API_KEY") {
            self.api_key = non_empty(val);
        }
        if let Some(val) = env_var("REALTIME_URL") {
            self.realtime_url = non_empty(val);
        }

        // SANAD_PAGE_SIZE
        if let Some(val) = env_var("PAGE_SIZE") {
            self.page_size = parse_page_size(&val)?;
        }

        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a value by key, as `config set` does
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let cleared = value.is_empty() || value == "none";
        match key {
            "backend" => self.backend = value.parse()?,
            "data_dir" => self.data_dir = value.into(),
            "api_url" => self.api_url = (!cleared).then(|| value.to_string()),
            "api_key" => self.api_key = (!cleared).then(|| value.to_string()),
            "realtime_url" => self.realtime_url = (!cleared).then(|| value.to_string()),
            "page_size" => self.page_size = parse_page_size(value)?,
            "log_file" => self.log_file = (!cleared).then(|| value.into()),
            _ => bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: {}",
                key,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Keys accepted by `set`
    pub const KEYS: [&'static str; 7] = [
        "backend",
        "data_dir",
        "api_url",
        "api_key",
        "realtime_url",
        "page_size",
        "log_file",
    ];

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SANAD_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sanad")
            .join("config.toml")
    }

    /// Path to the local SQLite store
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("sanad.db")
    }

    /// Path to the vote ledger
    pub fn votes_path(&self) -> PathBuf {
        self.data_dir.join("votes.json")
    }

    /// Log file for the interactive chat
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

fn parse_page_size(val: &str) -> Result<usize> {
    let size: usize = val
        .trim()
        .parse()
        .with_context(|| format!("Invalid page size '{}'", val))?;
    if size == 0 {
        bail!("Page size must be at least 1");
    }
    Ok(size)
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sanad")
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SANAD_BACKEND",
        "SANAD_DATA_DIR",
        "SANAD_API_URL",
        "SANAD_API_KEY",
        "SANAD_REALTIME_URL",
        "SANAD_PAGE_SIZE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.page_size, 50);
        assert!(config.api_url.is_none());
        assert!(config.data_dir.ends_with("sanad"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.database_path().ends_with("sanad.db"));
        assert!(config.votes_path().ends_with("votes.json"));
        assert!(config.log_path().ends_with("debug.log"));
    }

    #[test]
    fn test_env_override_backend_and_urls() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SANAD_BACKEND", "hosted");
        env::set_var("SANAD_API_URL", "https://abc.example.co");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.backend, Backend::Hosted);
        assert_eq!(config.api_url.as_deref(), Some("https://abc.example.co"));

        // Empty string clears it
        env::set_var("SANAD_API_URL", "");
        config.apply_env_overrides().unwrap();
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_env_override_page_size() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SANAD_PAGE_SIZE", "20");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.page_size, 20);

        env::set_var("SANAD_PAGE_SIZE", "0");
        assert!(config.apply_env_overrides().is_err());

        env::set_var("SANAD_PAGE_SIZE", "many");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            backend = "hosted"
            data_dir = "/custom/data"
            api_url = "https://abc.example.co"
            api_key = "anon"
            page_size = 25
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.backend, Backend::Hosted);
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_key.as_deref(), Some("anon"));
        assert_eq!(config.page_size, 25);
        assert!(config.realtime_url.is_none());
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();

        config.set("backend", "hosted").unwrap();
        config.set("api_key", "k").unwrap();
        config.set("page_size", "10").unwrap();
        assert_eq!(config.backend, Backend::Hosted);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.page_size, 10);

        config.set("api_key", "none").unwrap();
        assert!(config.api_key.is_none());

        assert!(config.set("backend", "cloud").is_err());
        assert!(config.set("favorite_color", "blue").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };
        config.set("api_url", "https://abc.example.co").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.api_url, config.api_url);
        assert_eq!(loaded.data_dir, config.data_dir);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("SANAD_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}

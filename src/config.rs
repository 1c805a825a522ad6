use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured backend URL
pub const BACKEND_URL_ENV: &str = "STREAMCHAT_BACKEND_URL";

/// Backend used when nothing else is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001/chat";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat endpoint that accepts `{"prompt": ...}` and answers with SSE
    pub backend_url: String,

    /// Bound on connection establishment; the streamed body is never timed out
    pub connect_timeout_secs: Option<u64>,

    /// Logging preferences
    pub log: LogConfig,

    /// UI preferences
    pub ui: UiConfig,

    /// Where this configuration lives on disk
    #[serde(skip)]
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Directory for the rolling log file written in interactive mode
    pub directory: PathBuf,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub placeholder: String,
    pub show_timestamps: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = streamchat_home();

        Config {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout_secs: None,
            log: LogConfig {
                level: "info".to_string(),
                directory: home.join("logs"),
            },
            ui: UiConfig::default(),
            path: home.join("config.toml"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Config::default().log
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            placeholder: "Ask me anything...".to_string(),
            show_timestamps: true,
        }
    }
}

/// `~/.streamchat`, or `./.streamchat` when no home directory is known
pub fn streamchat_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".streamchat")
}

impl Config {
    /// Load configuration from `path` (or the default location) and apply the environment override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| streamchat_home().join("config.toml"));

        let mut config = Self::read_file(&config_path)?;
        config.path = config_path;

        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                config.backend_url = url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Replace the backend URL (command-line override) and re-validate.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Result<Self> {
        self.backend_url = url.into();
        self.validate()?;
        Ok(self)
    }

    /// Parsed backend endpoint
    pub fn endpoint(&self) -> Result<reqwest::Url> {
        let url = reqwest::Url::parse(&self.backend_url)
            .with_context(|| format!("Invalid backend URL {:?}", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Backend URL must use http or https, got {:?}", url.scheme());
        }
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        self.endpoint().map(|_| ())
    }

    /// Save configuration to its file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.path, content).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let config = Config::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.connect_timeout_secs, None);
        assert_eq!(config.ui.placeholder, "Ask me anything...");
        assert_eq!(config.endpoint().unwrap().port(), Some(3001));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "connect_timeout_secs = 5\n[ui]\nshow_timestamps = false\n").unwrap();

        let config = Config::read_file(&path).unwrap();
        assert_eq!(config.connect_timeout_secs, Some(5));
        assert!(!config.ui.show_timestamps);
        assert_eq!(config.ui.placeholder, "Ask me anything...");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn save_then_read_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.path = dir.path().join("nested").join("config.toml");
        config.backend_url = "https://chat.example.com/stream".to_string();
        config.save().unwrap();

        let loaded = Config::read_file(&config.path).unwrap();
        assert_eq!(loaded.backend_url, "https://chat.example.com/stream");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(Config::default().with_backend_url("ftp://example.com").is_err());
        assert!(Config::default().with_backend_url("not a url").is_err());
        assert!(Config::default().with_backend_url("http://127.0.0.1:8080/chat").is_ok());
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend_url = [").unwrap();
        assert!(Config::read_file(&path).is_err());
    }
}

// ABOUTME: Configuration management for the extract-pause application
// ABOUTME: Handles loading and merging configuration from files and environment variables

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::ConnectionSettings;
use crate::engine::DEFAULT_MAX_CONCURRENT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_calls: usize,

    #[serde(default = "default_true")]
    pub include_upstream: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Content url of the site; empty for the default site
    #[serde(default)]
    pub site_url: String,
    pub token_name: Option<String>,
    pub token_secret: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("data/paused_extract_refresh_tasks.json")
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_true() -> bool {
    true
}

fn default_api_version() -> String {
    "3.11".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            snapshot_file: default_snapshot_file(),
            max_concurrent_calls: default_max_concurrent(),
            include_upstream: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_version: default_api_version(),
            site_url: String::new(),
            token_name: None,
            token_secret: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file()?,
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Result<PathBuf> {
        let possible_paths = vec![
            PathBuf::from("extract-pause.yaml"),
            PathBuf::from("extract-pause.yml"),
            PathBuf::from(".extract-pause.yaml"),
        ];

        for path in possible_paths {
            if path.exists() {
                return Ok(path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".extract-pause").join("config.yaml");
            if home_config.exists() {
                return Ok(home_config);
            }
        }

        // Return default path (may not exist)
        Ok(PathBuf::from("extract-pause.yaml"))
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        // Server connection
        if let Ok(url) = std::env::var("TABLEAU_SERVER") {
            self.server.url = Some(url);
        }
        if let Ok(api_version) = std::env::var("TABLEAU_API_VERSION") {
            self.server.api_version = api_version;
        }
        if let Ok(site) = std::env::var("TABLEAU_SITE") {
            self.server.site_url = site;
        }
        if let Ok(token_name) = std::env::var("TABLEAU_TOKEN_NAME") {
            self.server.token_name = Some(token_name);
        }
        if let Ok(token_secret) = std::env::var("TABLEAU_TOKEN_SECRET") {
            self.server.token_secret = Some(token_secret);
        }

        if let Ok(snapshot_file) = std::env::var("EXTRACT_PAUSE_SNAPSHOT_FILE") {
            self.snapshot_file = PathBuf::from(snapshot_file);
        }
        if let Ok(max_calls) = std::env::var("EXTRACT_PAUSE_MAX_CONCURRENT") {
            self.max_concurrent_calls = max_calls.parse()?;
        }

        // Logging configuration
        if let Ok(level) = std::env::var("EXTRACT_PAUSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EXTRACT_PAUSE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Connection settings for the REST client; fails when credentials are missing
    pub fn connection_settings(&self) -> Result<ConnectionSettings> {
        let server_url = self
            .server
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Server url is not configured (server.url or TABLEAU_SERVER)"))?;
        let token_name = self.server.token_name.clone().ok_or_else(|| {
            anyhow::anyhow!("Token name is not configured (server.token_name or TABLEAU_TOKEN_NAME)")
        })?;
        let token_secret = self.server.token_secret.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "Token secret is not configured (server.token_secret or TABLEAU_TOKEN_SECRET)"
            )
        })?;

        Ok(ConnectionSettings {
            server_url,
            api_version: self.server.api_version.clone(),
            site_url: self.server.site_url.clone(),
            token_name,
            token_secret,
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
        })
    }
}

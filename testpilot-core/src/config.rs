use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ConfigLoadError> for crate::error::TestPilotError {
    fn from(err: ConfigLoadError) -> Self {
        match err {
            ConfigLoadError::Config(e) => e.into(),
            ConfigLoadError::MissingRequired(key) => {
                crate::error::TestPilotError::InvalidConfigValue {
                    key,
                    message: "Missing required value".to_string(),
                }
            }
            ConfigLoadError::InvalidValue { key, message } => {
                crate::error::TestPilotError::InvalidConfigValue { key, message }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TestPilotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_start_path")]
    pub start_path: String,

    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Applies to the acknowledgement call only; the event stream has no timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub color: bool,

    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_start_path() -> String {
    "/api/pipeline/start".to_string()
}

fn default_stream_path() -> String {
    "/api/pipeline/stream".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_event_prefix() -> String {
    "data:".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_refresh_rate() -> u64 {
    250
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            start_path: default_start_path(),
            stream_path: default_stream_path(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            event_prefix: default_event_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            refresh_rate_ms: default_refresh_rate(),
        }
    }
}

impl TestPilotConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TESTPILOT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut testpilot_config: TestPilotConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("TESTPILOT_SERVER_URL") {
            testpilot_config.server.base_url = url;
        }

        if let Ok(level) = std::env::var("TESTPILOT_LOG_LEVEL") {
            testpilot_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            testpilot_config.logging.level = level;
        }

        testpilot_config.validate()?;

        Ok(testpilot_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.base_url.is_empty() {
            return Err(ConfigLoadError::MissingRequired("server.base_url".to_string()));
        }

        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(ConfigLoadError::InvalidValue {
                key: "server.base_url".to_string(),
                message: "Must start with http:// or https://".to_string(),
            });
        }

        for (key, path) in [
            ("server.start_path", &self.server.start_path),
            ("server.stream_path", &self.server.stream_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigLoadError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}' must start with '/'", path),
                });
            }
        }

        if self.stream.event_prefix.is_empty() {
            return Err(ConfigLoadError::MissingRequired(
                "stream.event_prefix".to_string(),
            ));
        }

        if self.display.refresh_rate_ms == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "display.refresh_rate_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Err(err) = EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!("Invalid log filter '{}': {}", self.logging.level, err),
            });
        }

        Ok(())
    }

    /// Full URL of the job submission endpoint.
    pub fn start_url(&self) -> String {
        format!(
            "{}{}",
            self.server.base_url.trim_end_matches('/'),
            self.server.start_path
        )
    }

    /// Full URL of the event subscription endpoint for `run_id`.
    pub fn stream_url(&self, run_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.server.base_url.trim_end_matches('/'),
            self.server.stream_path.trim_end_matches('/'),
            run_id
        )
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("testpilot.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("testpilot").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".testpilot").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let env_paths = get_dotenv_paths();

    for path in env_paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

fn get_dotenv_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".testpilot").join(".env"));
    }

    paths
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("testpilot"))
}

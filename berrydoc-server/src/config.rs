// Server configuration: defaults, TOML file, environment, command line

use berrydoc_eye::VisionConfig;
use berrydoc_llm::AssistantConfig;
use clap::Parser;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Command line flags; each one overrides file and environment values
#[derive(Debug, Parser)]
#[command(name = "berrydoc-server")]
#[command(about = "Strawberry disease detection web server", long_about = None)]
#[command(version)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(long, short, env = "BERRYDOC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub bind: Option<String>,

    /// Path to the ONNX detection model
    #[arg(long)]
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// Upper bound on request bodies, uploads included
    pub max_body_bytes: usize,
    pub enable_compression: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5000,
            max_body_bytes: 16 * 1024 * 1024,
            enable_compression: true,
        }
    }
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_address, self.bind_port)
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("Invalid bind address: {}", e)))
    }

    /// Apply a `host:port` string
    pub fn set_bind(&mut self, bind: &str) -> Result<(), ConfigError> {
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("Invalid bind '{}': {}", bind, e)))?;
        self.bind_address = addr.ip().to_string();
        self.bind_port = addr.port();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Original uploads and camera captures
    pub upload_dir: PathBuf,
    /// Annotated images, served under `/static/results`
    pub result_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            result_dir: PathBuf::from("static/results"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub cookie_name: String,
    /// Sessions kept in memory before the least recently used is dropped
    pub capacity: usize,
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            cookie_name: "berrydoc_session".to_string(),
            capacity: 10_000,
            secure_cookie: false,
        }
    }
}

impl SessionConfig {
    /// Fill in a random secret when none is configured. Returns true if one was generated.
    pub fn ensure_secret(&mut self) -> bool {
        if self.secret_key.as_deref().is_some_and(|s| !s.is_empty()) {
            return false;
        }
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        self.secret_key = Some(hex::encode(bytes));
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub vision: VisionConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Defaults, then the config file, then environment, then flags
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.apply_cli(cli)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get("SECRET_KEY") {
            self.session.secret_key = Some(secret);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.assistant.api_key = Some(key);
        }
        if let Some(path) = get("MODEL_PATH") {
            self.vision.model_path = PathBuf::from(path);
        }
        if let Some(dir) = get("UPLOAD_FOLDER") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("RESULT_FOLDER") {
            self.storage.result_dir = PathBuf::from(dir);
        }
        if let Some(bind) = get("BERRYDOC_BIND") {
            self.network.set_bind(&bind)?;
        }
        if let Some(level) = get("BERRYDOC_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliArgs) -> Result<(), ConfigError> {
        if let Some(bind) = &cli.bind {
            self.network.set_bind(bind)?;
        }
        if let Some(model) = &cli.model {
            self.vision.model_path = model.clone();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.socket_addr()?;

        if self.network.max_body_bytes < 1024 {
            return Err(ConfigError::ValidationError(
                "network.max_body_bytes must be at least 1024".to_string(),
            ));
        }
        if self.storage.upload_dir.as_os_str().is_empty() || self.storage.result_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage directories must not be empty".to_string(),
            ));
        }
        if self.session.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "session.capacity must be > 0".to_string(),
            ));
        }
        if self.session.cookie_name.is_empty()
            || !self.session.cookie_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::ValidationError(
                "session.cookie_name must be a non-empty token".to_string(),
            ));
        }
        if self.session.secret_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError(
                "session secret is not set".to_string(),
            ));
        }

        self.vision
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("vision: {}", e)))?;
        self.assistant
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("assistant: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.network.bind_port, 5000);
        assert_eq!(config.network.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.storage.result_dir, PathBuf::from("static/results"));
        assert_eq!(config.session.capacity, 10_000);
        assert_eq!(config.assistant.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_toml_sections() {
        let config = ServerConfig::from_toml(
            r#"
            [network]
            bind_port = 8000

            [vision]
            model_path = "models/strawberry.onnx"
            confidence_threshold = 0.4

            [assistant]
            timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.network.bind_port, 8000);
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.vision.model_path, PathBuf::from("models/strawberry.onnx"));
        assert_eq!(config.vision.confidence_threshold, 0.4);
        assert_eq!(config.vision.input_size, 640);
        assert_eq!(config.assistant.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ServerConfig::from_toml("[network\nbind_port = 1"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("SECRET_KEY", "s3cret"),
                ("GEMINI_API_KEY", "g-key"),
                ("MODEL_PATH", "/models/best.onnx"),
                ("UPLOAD_FOLDER", "/tmp/up"),
                ("RESULT_FOLDER", "/tmp/res"),
                ("BERRYDOC_BIND", "127.0.0.1:9000"),
                ("BERRYDOC_LOG_LEVEL", "debug"),
            ]))
            .unwrap();
        assert_eq!(config.session.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.assistant.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.vision.model_path, PathBuf::from("/models/best.onnx"));
        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.storage.result_dir, PathBuf::from("/tmp/res"));
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.bind_port, 9000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_blank_env_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[("SECRET_KEY", "  "), ("MODEL_PATH", "")])).unwrap();
        assert!(config.session.secret_key.is_none());
        assert_eq!(config.vision.model_path, PathBuf::from("model.onnx"));
    }

    #[test]
    fn test_cli_wins_over_env() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[("BERRYDOC_BIND", "127.0.0.1:9000")])).unwrap();
        let cli = CliArgs::parse_from(["berrydoc-server", "--bind", "0.0.0.0:7000", "--model", "m.onnx"]);
        config.apply_cli(&cli).unwrap();
        assert_eq!(config.network.bind_port, 7000);
        assert_eq!(config.vision.model_path, PathBuf::from("m.onnx"));
    }

    #[test]
    fn test_bad_bind_rejected() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("BERRYDOC_BIND", "nowhere")])).is_err());
    }

    #[test]
    fn test_secret_generation() {
        let mut session = SessionConfig::default();
        assert!(session.ensure_secret());
        let secret = session.secret_key.clone().unwrap();
        assert_eq!(secret.len(), 64);
        assert!(!session.ensure_secret());
        assert_eq!(session.secret_key.unwrap(), secret);
    }

    #[test]
    fn test_validate_requires_secret() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_err());
        config.session.ensure_secret();
        assert!(config.validate().is_ok());

        config.session.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = ServerConfig::default();
        config.session.secret_key = Some("s3cret".to_string());
        config.assistant.api_key = Some("g-key".to_string());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("g-key"));
    }
}

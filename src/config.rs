//! Configuration for the chunkvault tenant engine

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::auth::AuthConfig;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path of the tenant's SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Accepted HS256 token secrets, newest first. Listing several lets
    /// tokens minted under a previous secret keep working during rotation.
    #[serde(default)]
    pub auth_secrets: Vec<String>,

    /// Accept the literal dev token. Never enable in production.
    #[serde(default)]
    pub allow_dev_token: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/tenant.db")
}

fn default_max_object_size() -> u64 {
    1024 * 1024 * 1024 // 1GB
}

fn default_log_level() -> String {
    "chunkvault=debug,tower_http=debug".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            auth_secrets: Vec::new(),
            allow_dev_token: false,
            max_object_size: default_max_object_size(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CHUNKVAULT_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }
        if let Ok(path) = std::env::var("CHUNKVAULT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(secrets) = std::env::var("CHUNKVAULT_SECRETS") {
            config.auth_secrets = secrets
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("CHUNKVAULT_ALLOW_DEV_TOKEN") {
            config.allow_dev_token = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("CHUNKVAULT_MAX_OBJECT_SIZE") {
            if let Ok(parsed) = v.parse() {
                config.max_object_size = parsed;
            }
        }
        if let Ok(level) = std::env::var("CHUNKVAULT_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load configuration: `CHUNKVAULT_CONFIG` file if set, else environment.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("CHUNKVAULT_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }
        Self::from_env()
    }

    /// Whether any real credential can be verified.
    pub fn auth_enabled(&self) -> bool {
        !self.auth_secrets.is_empty()
    }

    /// The authenticator's view of this configuration.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            secrets: self.auth_secrets.clone(),
            allow_dev_token: self.allow_dev_token,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 9000);
        assert!(config.auth_secrets.is_empty());
        assert!(!config.allow_dev_token);
        assert!(!config.auth_enabled());
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml_str = r#"
listen_addr = "0.0.0.0:9100"
db_path = "/var/lib/chunkvault/tenant.db"
auth_secrets = ["new-secret", "old-secret"]
allow_dev_token = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.auth_secrets.len(), 2);
        assert!(config.allow_dev_token);
        // Unset fields fall back to defaults.
        assert_eq!(config.max_object_size, default_max_object_size());

        let auth = config.auth_config();
        assert_eq!(auth.secrets, vec!["new-secret", "old-secret"]);
        assert!(auth.allow_dev_token);
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, default_listen_addr());
        assert_eq!(config.db_path, default_db_path());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            Config::from_file("/nonexistent/chunkvault.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("chunkvault-bad-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "listen_addr = not an address").unwrap();
        let result = Config::from_file(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

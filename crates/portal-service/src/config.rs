//! Portal configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default cluster whose coordinator assigns room controllers.
pub const DEFAULT_CLUSTER_NAME: &str = "rtc-cluster";

/// Default RPC gateway base URL.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8090";

/// Default per-call RPC timeout in seconds.
pub const DEFAULT_RPC_TIMEOUT_SECONDS: u64 = 10;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default portal RPC identity prefix.
pub const DEFAULT_RPC_ID_PREFIX: &str = "portal";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Portal configuration.
#[derive(Clone)]
pub struct Config {
    /// HMAC key for admission token signatures.
    pub token_key: SecretString,

    /// Optional file the key was read from; re-read on SIGHUP.
    pub token_key_file: Option<PathBuf>,

    /// Redis connection URL for the token store.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Cluster asked for room controllers (default: "rtc-cluster").
    pub cluster_name: String,

    /// This portal's RPC identity, sent to controllers on join.
    pub rpc_id: String,

    /// RPC gateway base URL.
    pub rpc_url: String,

    /// Per-call RPC timeout.
    pub rpc_timeout: Duration,

    /// Health endpoint bind address (default: "0.0.0.0:8082").
    pub health_bind_address: String,

    /// Log output format (default: text).
    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token_key", &"[REDACTED]")
            .field("token_key_file", &self.token_key_file)
            .field("redis_url", &"[REDACTED]")
            .field("cluster_name", &self.cluster_name)
            .field("rpc_id", &self.rpc_id)
            .field("rpc_url", &self.rpc_url)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("health_bind_address", &self.health_bind_address)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read token key file {path}: {reason}")]
    KeyFile { path: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_key_file = vars.get("PORTAL_TOKEN_KEY_FILE").map(PathBuf::from);

        let token_key = match (&token_key_file, vars.get("PORTAL_TOKEN_KEY")) {
            (Some(path), _) => load_token_key_file(path)?,
            (None, Some(key)) => SecretString::from(key.clone()),
            (None, None) => {
                return Err(ConfigError::MissingEnvVar("PORTAL_TOKEN_KEY".to_string()));
            }
        };

        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let cluster_name = vars
            .get("PORTAL_CLUSTER_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        let rpc_url = vars
            .get("PORTAL_RPC_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        let rpc_timeout_seconds = match vars.get("PORTAL_RPC_TIMEOUT_SECONDS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "PORTAL_RPC_TIMEOUT_SECONDS must be a positive integer, got {raw:?}"
                    )));
                }
            },
            None => DEFAULT_RPC_TIMEOUT_SECONDS,
        };

        let health_bind_address = vars
            .get("PORTAL_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let log_format = match vars.get("PORTAL_LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "PORTAL_LOG_FORMAT must be 'text' or 'json', got {other:?}"
                )));
            }
        };

        // Generate portal RPC identity
        let rpc_id = vars.get("PORTAL_RPC_ID").cloned().unwrap_or_else(|| {
            let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RPC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            token_key,
            token_key_file,
            redis_url,
            cluster_name,
            rpc_id,
            rpc_url,
            rpc_timeout: Duration::from_secs(rpc_timeout_seconds),
            health_bind_address,
            log_format,
        })
    }
}

/// Read a signing key from a file, trimming surrounding whitespace.
pub fn load_token_key_file(path: &Path) -> Result<SecretString, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::KeyFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let key = raw.trim();
    if key.is_empty() {
        return Err(ConfigError::KeyFile {
            path: path.display().to_string(),
            reason: "file is empty".to_string(),
        });
    }

    Ok(SecretString::from(key.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("PORTAL_TOKEN_KEY".to_string(), "portal-test-key".to_string()),
            (
                "REDIS_URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.token_key.expose_secret(), "portal-test-key");
        assert_eq!(config.redis_url.expose_secret(), "redis://localhost:6379");
        assert_eq!(config.cluster_name, DEFAULT_CLUSTER_NAME);
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(
            config.rpc_timeout,
            Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECONDS)
        );
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.token_key_file.is_none());
        // RPC id should be auto-generated
        assert!(config.rpc_id.starts_with("portal-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("PORTAL_CLUSTER_NAME".to_string(), "eu-cluster".to_string());
        vars.insert("PORTAL_RPC_ID".to_string(), "portal-7".to_string());
        vars.insert("PORTAL_RPC_URL".to_string(), "http://rpc:9000".to_string());
        vars.insert("PORTAL_RPC_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert(
            "PORTAL_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9999".to_string(),
        );
        vars.insert("PORTAL_LOG_FORMAT".to_string(), "json".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.cluster_name, "eu-cluster");
        assert_eq!(config.rpc_id, "portal-7");
        assert_eq!(config.rpc_url, "http://rpc:9000");
        assert_eq!(config.rpc_timeout, Duration::from_secs(3));
        assert_eq!(config.health_bind_address, "127.0.0.1:9999");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_vars_missing_token_key() {
        let mut vars = base_vars();
        vars.remove("PORTAL_TOKEN_KEY");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "PORTAL_TOKEN_KEY"));
    }

    #[test]
    fn test_from_vars_missing_redis_url() {
        let mut vars = base_vars();
        vars.remove("REDIS_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "REDIS_URL"));
    }

    #[test]
    fn test_from_vars_rejects_bad_timeout() {
        for raw in ["0", "-1", "ten"] {
            let mut vars = base_vars();
            vars.insert("PORTAL_RPC_TIMEOUT_SECONDS".to_string(), raw.to_string());
            assert!(matches!(
                Config::from_vars(&vars),
                Err(ConfigError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_from_vars_rejects_unknown_log_format() {
        let mut vars = base_vars();
        vars.insert("PORTAL_LOG_FORMAT".to_string(), "xml".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_key_file_takes_precedence() {
        let dir = std::env::temp_dir().join(format!("portal-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("token.key");
        std::fs::write(&path, "file-key\n").unwrap();

        let mut vars = base_vars();
        vars.insert(
            "PORTAL_TOKEN_KEY_FILE".to_string(),
            path.display().to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.token_key.expose_secret(), "file-key");
        assert_eq!(config.token_key_file.as_deref(), Some(path.as_path()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_key_file_is_an_error() {
        let mut vars = base_vars();
        vars.insert(
            "PORTAL_TOKEN_KEY_FILE".to_string(),
            "/nonexistent/portal/token.key".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::KeyFile { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("portal-test-key"));
        assert!(!debug_output.contains("redis://"));
    }
}

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::device::DeviceConfig;
use crate::gateway::TicketsConfig;
use crate::mfa::TotpConfig;
use crate::rpc::RpcConfig;
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Main configuration for the gateway daemon
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub totp: TotpConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub tickets: TicketsConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requests running longer than this are answered with 408
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Origins allowed to call the API from a browser. Empty disables CORS.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout_seconds(),
            cors_origins: Vec::new(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_max_body_size() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Read a JSON config file. Missing sections and fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Builder for Config with environment variable and file support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from a config file instead of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Config::from_file(path)?,
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout_seconds = timeout.as_secs();
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.config.server.cors_origins = origins;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    pub fn with_totp(mut self, totp: TotpConfig) -> Self {
        self.config.totp = totp;
        self
    }

    pub fn with_rpc(mut self, rpc: RpcConfig) -> Self {
        self.config.rpc = rpc;
        self
    }

    pub fn with_tickets(mut self, tickets: TicketsConfig) -> Self {
        self.config.tickets = tickets;
        self
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.config.device = device;
        self
    }

    /// Load configuration from environment variables with WALLETGATE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = parse_env_with_prefix("PORT") {
            self.config.server.port = port;
        }
        if let Some(secs) = parse_env_with_prefix("REQUEST_TIMEOUT_SECONDS") {
            self.config.server.request_timeout_seconds = secs;
        }
        if let Some(origins) = get_env_with_prefix("CORS_ORIGINS") {
            self.config.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(size) = parse_env_with_prefix("MAX_BODY_SIZE") {
            self.config.server.max_body_size = size;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = parse_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json;
        }

        self.config.auth.apply_env();
        self.config.totp.apply_env();
        self.config.rpc.apply_env();
        self.config.tickets.apply_env();
        self.config.device.apply_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid server address (host:port)
    /// - Invalid log level
    /// - Zero timeouts or token lifetime
    /// - TOTP parameters an authenticator app cannot use
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = self.config;

        config.server.addr().map_err(|e| {
            ConfigError::Invalid(format!(
                "server address {}:{} - {}",
                config.server.host, config.server.port, e
            ))
        })?;

        if config.server.port == 0 {
            return Err(ConfigError::Invalid("server port must be greater than 0".into()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log level {}. Must be one of: {}",
                config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if config.server.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("request timeout must be greater than 0".into()));
        }

        if config.auth.token_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("token lifetime must be greater than 0".into()));
        }

        if !(6..=8).contains(&config.totp.digits) {
            return Err(ConfigError::Invalid(format!(
                "TOTP digits must be between 6 and 8, got {}",
                config.totp.digits
            )));
        }

        if config.totp.step == 0 {
            return Err(ConfigError::Invalid("TOTP step must be greater than 0".into()));
        }

        if config.totp.account.contains(':') || config.totp.issuer.contains(':') {
            return Err(ConfigError::Invalid(
                "TOTP account and issuer must not contain ':'".into(),
            ));
        }

        if config.rpc.host.is_empty() {
            return Err(ConfigError::Invalid("RPC host must be set".into()));
        }

        if config.rpc.call_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("RPC call timeout must be greater than 0".into()));
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rpc.retry_interval(), Duration::from_secs(60));
        assert_eq!(config.totp.skew, 1);
    }

    #[test]
    fn test_invalid_log_level() {
        let err = ConfigBuilder::new().with_log_level("loud").build().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_invalid_totp_digits() {
        let err = ConfigBuilder::new()
            .with_totp(TotpConfig::default().digits(4))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_issuer_with_colon_rejected() {
        let err = ConfigBuilder::new()
            .with_totp(TotpConfig::new("Pi:Wallet"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("':'"));
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walletgate.json");
        std::fs::write(
            &path,
            r#"{
                "server": {"port": 9090, "cors_origins": ["http://localhost:3000"]},
                "rpc": {"host": "10.0.0.2:9110", "user": "rpc"},
                "tickets": {"pool_fees": 7.5}
            }"#,
        )
        .unwrap();

        let config = ConfigBuilder::from_file(&path).unwrap().build().unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.rpc.host, "10.0.0.2:9110");
        assert_eq!(config.tickets.pool_fees, Some(7.5));
        assert_eq!(config.auth.username, "admin");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/walletgate.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_env() {
        unsafe {
            std::env::set_var("WALLETGATE_CORS_ORIGINS", "http://a.test, http://b.test");
            std::env::set_var("WALLETGATE_RPC_RETRY_INTERVAL_SECONDS", "5");
        }

        let config = ConfigBuilder::new().from_env().build().unwrap();
        assert_eq!(config.server.cors_origins, ["http://a.test", "http://b.test"]);
        assert_eq!(config.rpc.retry_interval(), Duration::from_secs(5));

        unsafe {
            std::env::remove_var("WALLETGATE_CORS_ORIGINS");
            std::env::remove_var("WALLETGATE_RPC_RETRY_INTERVAL_SECONDS");
        }
    }
}

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the manager does when a call fails at the transport level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Surface the error and keep the handle as is.
    Never,
    /// Surface the error and re-run the dial loop in the background.
    #[default]
    OnTransportError,
}

impl FromStr for ReconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "never" => Ok(Self::Never),
            "on_transport_error" => Ok(Self::OnTransportError),
            other => Err(format!("unknown reconnect policy: {}", other)),
        }
    }
}

/// Wallet RPC connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// `host:port` of the wallet RPC server
    #[serde(default = "default_host")]
    pub host: String,

    /// Websocket endpoint path
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub pass: SecretString,

    /// PEM certificate the wallet presents; pinned as the only trust root
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// Use `ws://` instead of `wss://`. Only for local test daemons.
    #[serde(default)]
    pub disable_tls: bool,

    /// Pause between failed connection attempts
    #[serde(default = "default_retry_interval_seconds")]
    pub retry_interval_seconds: u64,

    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Capacity of the notification queue between transport and handlers
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            endpoint: default_endpoint(),
            user: String::new(),
            pass: SecretString::default(),
            cert_path: None,
            disable_tls: false,
            retry_interval_seconds: default_retry_interval_seconds(),
            call_timeout_seconds: default_call_timeout_seconds(),
            reconnect: ReconnectPolicy::default(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

impl RpcConfig {
    pub fn url(&self) -> String {
        let scheme = if self.disable_tls { "ws" } else { "wss" };
        format!("{}://{}/{}", scheme, self.host, self.endpoint.trim_start_matches('/'))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Overlay `WALLETGATE_RPC_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(host) = get_env_with_prefix("RPC_HOST") {
            self.host = host;
        }
        if let Some(endpoint) = get_env_with_prefix("RPC_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(user) = get_env_with_prefix("RPC_USER") {
            self.user = user;
        }
        if let Some(pass) = get_env_with_prefix("RPC_PASS") {
            self.pass = SecretString::from(pass);
        }
        if let Some(path) = get_env_with_prefix("RPC_CERT") {
            self.cert_path = Some(path.into());
        }
        if let Some(disable) = parse_env_with_prefix("RPC_DISABLE_TLS") {
            self.disable_tls = disable;
        }
        if let Some(secs) = parse_env_with_prefix("RPC_RETRY_INTERVAL_SECONDS") {
            self.retry_interval_seconds = secs;
        }
        if let Some(secs) = parse_env_with_prefix("RPC_CALL_TIMEOUT_SECONDS") {
            self.call_timeout_seconds = secs;
        }
        if let Some(policy) = parse_env_with_prefix("RPC_RECONNECT") {
            self.reconnect = policy;
        }
        if let Some(size) = parse_env_with_prefix("RPC_NOTIFICATION_BUFFER") {
            self.notification_buffer = size;
        }
    }
}

fn default_host() -> String {
    "localhost:9110".to_string()
}

fn default_endpoint() -> String {
    "ws".to_string()
}

fn default_retry_interval_seconds() -> u64 {
    60
}

fn default_call_timeout_seconds() -> u64 {
    30
}

fn default_notification_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.url(), "wss://localhost:9110/ws");
        assert_eq!(config.retry_interval(), Duration::from_secs(60));
        assert_eq!(config.reconnect, ReconnectPolicy::OnTransportError);
    }

    #[test]
    fn test_plain_url() {
        let config = RpcConfig {
            host: "127.0.0.1:19110".to_string(),
            endpoint: "/ws".to_string(),
            disable_tls: true,
            ..Default::default()
        };
        assert_eq!(config.url(), "ws://127.0.0.1:19110/ws");
    }

    #[test]
    fn test_reconnect_policy_parse() {
        assert_eq!("never".parse(), Ok(ReconnectPolicy::Never));
        assert_eq!("on-transport-error".parse(), Ok(ReconnectPolicy::OnTransportError));
        assert!("sometimes".parse::<ReconnectPolicy>().is_err());

        let config: RpcConfig = serde_json::from_str(r#"{"reconnect": "never"}"#).unwrap();
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
    }

    #[test]
    fn test_debug_redacts_pass() {
        let config: RpcConfig = serde_json::from_str(r#"{"pass": "walletpass"}"#).unwrap();
        assert!(!format!("{:?}", config).contains("walletpass"));
    }
}

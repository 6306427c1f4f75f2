use super::codec::EcAlgorithm;
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Admin identity and session token settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Admin login name (the "API key")
    #[serde(default = "default_username")]
    pub username: String,

    /// Admin password (the "API secret"). Logins are refused while empty.
    #[serde(default)]
    pub password: SecretString,

    /// Name placed in the `name` claim of issued tokens
    #[serde(default = "default_subject_name")]
    pub subject_name: String,

    /// Session token lifetime in seconds
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,

    /// PKCS#8 PEM private key used to sign session tokens
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,

    /// SPKI PEM public key used to verify session tokens
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,

    #[serde(default)]
    pub algorithm: EcAlgorithm,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: SecretString::default(),
            subject_name: default_subject_name(),
            token_ttl_seconds: default_token_ttl_seconds(),
            private_key_path: default_private_key_path(),
            public_key_path: default_public_key_path(),
            algorithm: EcAlgorithm::default(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    /// Overlay `WALLETGATE_API_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(username) = get_env_with_prefix("API_KEY") {
            self.username = username;
        }
        if let Some(password) = get_env_with_prefix("API_SECRET") {
            self.password = SecretString::from(password);
        }
        if let Some(name) = get_env_with_prefix("API_SUBJECT") {
            self.subject_name = name;
        }
        if let Some(ttl) = parse_env_with_prefix("API_TOKEN_TTL_SECONDS") {
            self.token_ttl_seconds = ttl;
        }
        if let Some(path) = get_env_with_prefix("API_PRIVATE_KEY") {
            self.private_key_path = path.into();
        }
        if let Some(path) = get_env_with_prefix("API_PUBLIC_KEY") {
            self.public_key_path = path.into();
        }
        if let Some(algorithm) = parse_env_with_prefix("API_KEY_ALGORITHM") {
            self.algorithm = algorithm;
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_subject_name() -> String {
    "Pi Wallet".to_string()
}

fn default_token_ttl_seconds() -> u64 {
    10 * 60 * 60 // 10 hours
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("session.key")
}

fn default_public_key_path() -> PathBuf {
    PathBuf::from("session.pub")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.username, "admin");
        assert!(config.password.expose_secret().is_empty());
        assert_eq!(config.token_ttl(), Duration::from_secs(36_000));
        assert_eq!(config.algorithm, EcAlgorithm::ES256);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"username": "operator", "password": "hunter2", "token_ttl_seconds": 60}"#,
        )
        .unwrap();
        assert_eq!(config.username, "operator");
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert_eq!(config.token_ttl(), Duration::from_secs(60));
        assert_eq!(config.private_key_path, PathBuf::from("session.key"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"password": "hunter2"}"#).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}

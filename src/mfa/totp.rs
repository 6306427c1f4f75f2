//! TOTP (Time-based One-Time Password) step-up verification.

use super::storage::{FileSecretStore, OtpRecord, SecretStore, StoreError};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

/// Hash used to derive codes.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl From<OtpAlgorithm> for Algorithm {
    fn from(alg: OtpAlgorithm) -> Self {
        match alg {
            OtpAlgorithm::SHA1 => Algorithm::SHA1,
            OtpAlgorithm::SHA256 => Algorithm::SHA256,
            OtpAlgorithm::SHA512 => Algorithm::SHA512,
        }
    }
}

impl FromStr for OtpAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            other => Err(format!("unknown TOTP algorithm: {}", other)),
        }
    }
}

/// Configuration for TOTP enrollment and verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpConfig {
    /// File holding the enrolled secret.
    #[serde(default = "default_secret_path")]
    pub secret_path: PathBuf,
    /// Account name shown in authenticator apps.
    #[serde(default = "default_account")]
    pub account: String,
    /// Issuer name shown in authenticator apps.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    #[serde(default = "default_digits")]
    pub digits: usize,
    /// Time step in seconds (default: 30).
    #[serde(default = "default_step")]
    pub step: u64,
    /// Adjacent steps accepted on either side of the current one (default: 1).
    #[serde(default = "default_skew")]
    pub skew: u8,
    /// Algorithm (default: SHA1 for compatibility).
    #[serde(default)]
    pub algorithm: OtpAlgorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            secret_path: default_secret_path(),
            account: default_account(),
            issuer: default_issuer(),
            digits: default_digits(),
            step: default_step(),
            skew: default_skew(),
            algorithm: OtpAlgorithm::default(),
        }
    }
}

impl TotpConfig {
    /// Create a new TOTP config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    pub fn secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.secret_path = path.into();
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Set the number of digits.
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Set the time step in seconds.
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Set the clock skew tolerance in steps.
    pub fn skew(mut self, skew: u8) -> Self {
        self.skew = skew;
        self
    }

    pub fn algorithm(mut self, algorithm: OtpAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Overlay `WALLETGATE_TOTP_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(path) = get_env_with_prefix("TOTP_SECRET_PATH") {
            self.secret_path = path.into();
        }
        if let Some(account) = get_env_with_prefix("TOTP_ACCOUNT") {
            self.account = account;
        }
        if let Some(issuer) = get_env_with_prefix("TOTP_ISSUER") {
            self.issuer = issuer;
        }
        if let Some(digits) = parse_env_with_prefix("TOTP_DIGITS") {
            self.digits = digits;
        }
        if let Some(step) = parse_env_with_prefix("TOTP_STEP") {
            self.step = step;
        }
        if let Some(skew) = parse_env_with_prefix("TOTP_SKEW") {
            self.skew = skew;
        }
        if let Some(algorithm) = parse_env_with_prefix("TOTP_ALGORITHM") {
            self.algorithm = algorithm;
        }
    }
}

fn default_secret_path() -> PathBuf {
    PathBuf::from("otp.json")
}

fn default_account() -> String {
    "admin".to_string()
}

fn default_issuer() -> String {
    "Pi Wallet".to_string()
}

fn default_digits() -> usize {
    6
}

fn default_step() -> u64 {
    30
}

fn default_skew() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrollError {
    #[error("two factor secret already enrolled")]
    AlreadyEnrolled,
    #[error("could not build one-time secret: {0}")]
    Secret(String),
    #[error("secret storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("no two factor secret enrolled")]
    NotEnrolled,
    #[error("invalid one-time code")]
    InvalidCode,
    #[error("persisted one-time secret is unusable: {0}")]
    Secret(String),
    #[error("secret storage failed: {0}")]
    Storage(String),
}

impl From<StoreError> for EnrollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => EnrollError::AlreadyEnrolled,
            other => EnrollError::Storage(other.to_string()),
        }
    }
}

impl From<StoreError> for VerifyError {
    fn from(err: StoreError) -> Self {
        VerifyError::Storage(err.to_string())
    }
}

impl OtpRecord {
    fn totp(&self, skew: u8) -> Result<TOTP, String> {
        let secret = Secret::Encoded(self.secret.clone())
            .to_bytes()
            .map_err(|e| format!("{:?}", e))?;

        TOTP::new(
            self.algorithm.into(),
            self.digits,
            skew,
            self.step,
            secret,
            Some(self.issuer.clone()),
            self.account.clone(),
        )
        .map_err(|e| e.to_string())
    }

    /// Code for the step containing `time` (unix seconds).
    pub fn code_at(&self, time: u64) -> Result<String, VerifyError> {
        Ok(self.totp(0).map_err(VerifyError::Secret)?.generate(time))
    }
}

/// Enrolls the single deployment secret and checks step-up codes against it.
#[derive(Clone)]
pub struct TotpGuard {
    config: TotpConfig,
    store: Arc<dyn SecretStore>,
}

impl TotpGuard {
    pub fn new(config: TotpConfig, store: Arc<dyn SecretStore>) -> Self {
        Self { config, store }
    }

    /// Guard backed by the file named in `config.secret_path`.
    pub fn with_file_store(config: TotpConfig) -> Self {
        let store = Arc::new(FileSecretStore::new(config.secret_path.clone()));
        Self::new(config, store)
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    pub async fn is_enrolled(&self) -> Result<bool, VerifyError> {
        Ok(self.store.load().await?.is_some())
    }

    /// Generate and persist a fresh secret, returning its QR code as PNG.
    ///
    /// Runs at most once per deployment. An existing secret is never
    /// replaced; the call fails with [`EnrollError::AlreadyEnrolled`].
    pub async fn enroll(&self) -> Result<Vec<u8>, EnrollError> {
        if self.store.load().await?.is_some() {
            return Err(EnrollError::AlreadyEnrolled);
        }

        let record = OtpRecord {
            account: self.config.account.clone(),
            issuer: self.config.issuer.clone(),
            secret: Secret::generate_secret().to_encoded().to_string(),
            algorithm: self.config.algorithm,
            digits: self.config.digits,
            step: self.config.step,
        };

        // Render before persisting so a QR failure leaves nothing enrolled
        let png = record
            .totp(self.config.skew)
            .map_err(EnrollError::Secret)?
            .get_qr_png()
            .map_err(EnrollError::Secret)?;

        self.store.create(&record).await?;

        tracing::info!(
            account = %record.account,
            issuer = %record.issuer,
            "Two factor secret enrolled"
        );

        Ok(png)
    }

    /// Verify a code against the enrolled secret at the current time.
    pub async fn verify_code(&self, code: &str) -> Result<(), VerifyError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.verify_code_at(code, now).await
    }

    /// Verify with a specific timestamp (useful for testing).
    pub async fn verify_code_at(&self, code: &str, time: u64) -> Result<(), VerifyError> {
        let record = self.store.load().await?.ok_or(VerifyError::NotEnrolled)?;
        let totp = record.totp(self.config.skew).map_err(VerifyError::Secret)?;

        // Clean the code (remove spaces, dashes)
        let code = code.replace([' ', '-'], "");

        if totp.check(&code, time) {
            Ok(())
        } else {
            tracing::debug!("One-time code rejected");
            Err(VerifyError::InvalidCode)
        }
    }
}

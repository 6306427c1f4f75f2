//! One-time enrollment and step-up verification of the TOTP secret.
//!
//! Sensitive wallet actions require a valid code in addition to a session
//! token. The secret is generated exactly once; [`TotpGuard::enroll`] refuses
//! to replace a persisted secret.
//!
//! ```rust,ignore
//! use walletgate::mfa::{TotpConfig, TotpGuard};
//!
//! let guard = TotpGuard::with_file_store(TotpConfig::new("Pi Wallet"));
//! let png = guard.enroll().await?;
//! guard.verify_code("123456").await?;
//! ```

mod storage;
mod totp;

pub use storage::{FileSecretStore, OtpRecord, SecretStore, StoreError};
pub use totp::{EnrollError, OtpAlgorithm, TotpConfig, TotpGuard, VerifyError};

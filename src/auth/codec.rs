//! Session token issuance and verification.
//!
//! Tokens are ECDSA-signed JWTs. The private key signs, the public key
//! verifies; both are loaded once at startup into [`SigningKeys`] and shared
//! read-only by every request.
//!
//! # Example
//!
//! ```rust,ignore
//! use walletgate::auth::{EcAlgorithm, Identity, SigningKeys, TokenCodec};
//! use std::time::Duration;
//!
//! let keys = SigningKeys::from_pem_files("session.key", "session.pub", EcAlgorithm::ES256)?;
//! let codec = TokenCodec::new(keys, Duration::from_secs(10 * 60 * 60));
//!
//! let token = codec.issue(&Identity::admin("Pi Wallet"))?;
//! let claims = codec.verify(&token)?;
//! assert!(claims.admin);
//! ```

use super::config::AuthConfig;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Why a presented token was rejected.
///
/// Callers can tell a forged or malformed token apart from an expired one,
/// even though every kind maps to the same HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was presented.
    #[error("missing bearer token")]
    Missing,
    /// The value is not a well-formed signed token.
    #[error("token is malformed or unsigned")]
    Unsigned,
    /// The signature does not match the configured public key.
    #[error("token signature is invalid")]
    BadSignature,
    /// Signature is valid but the token is past its expiry.
    #[error("token has expired")]
    Expired,
}

/// Token could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("no private key loaded; codec is verify-only")]
    MissingKey,
    #[error("signing failed: {0}")]
    Sign(String),
}

/// Key material could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {kind} key: {message}")]
    Invalid { kind: &'static str, message: String },
}

/// ECDSA variants supported for session tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcAlgorithm {
    #[default]
    ES256,
    ES384,
}

impl From<EcAlgorithm> for Algorithm {
    fn from(alg: EcAlgorithm) -> Self {
        match alg {
            EcAlgorithm::ES256 => Algorithm::ES256,
            EcAlgorithm::ES384 => Algorithm::ES384,
        }
    }
}

impl std::str::FromStr for EcAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            other => Err(format!("unsupported session key algorithm: {}", other)),
        }
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Whether the bearer is the admin identity
    pub admin: bool,
    /// Subject name
    pub name: String,
    /// Issued at (unix timestamp)
    pub iat: u64,
    /// Expiration time (unix timestamp)
    pub exp: u64,
}

/// Who a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub admin: bool,
}

impl Identity {
    /// The single configured admin identity.
    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin: true,
        }
    }
}

/// Asymmetric key pair used for session tokens.
///
/// The private half is optional so a process that only needs to verify
/// tokens never has to hold it.
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl SigningKeys {
    /// Build from PEM bytes (PKCS#8 private key, SPKI public key).
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        algorithm: EcAlgorithm,
    ) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_ec_pem(private_pem).map_err(|e| KeyError::Invalid {
            kind: "private",
            message: e.to_string(),
        })?;
        let mut keys = Self::verify_only(public_pem, algorithm)?;
        keys.encoding = Some(encoding);
        Ok(keys)
    }

    /// Build a verify-only key set from a public key PEM.
    pub fn verify_only(public_pem: &[u8], algorithm: EcAlgorithm) -> Result<Self, KeyError> {
        let decoding = DecodingKey::from_ec_pem(public_pem).map_err(|e| KeyError::Invalid {
            kind: "public",
            message: e.to_string(),
        })?;
        Ok(Self {
            algorithm: algorithm.into(),
            encoding: None,
            decoding,
        })
    }

    /// Read both halves from disk. Blocking; intended for startup only.
    pub fn from_pem_files(
        private_path: impl AsRef<Path>,
        public_path: impl AsRef<Path>,
        algorithm: EcAlgorithm,
    ) -> Result<Self, KeyError> {
        tracing::debug!(path = %private_path.as_ref().display(), "Reading session private key");
        let private_pem = read_key_file(private_path.as_ref())?;
        tracing::debug!(path = %public_path.as_ref().display(), "Reading session public key");
        let public_pem = read_key_file(public_path.as_ref())?;
        Self::from_pem(&private_pem, &public_pem, algorithm)
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    std::fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<SigningKeys>,
    ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(keys: SigningKeys, ttl: Duration) -> Self {
        let mut validation = Validation::new(keys.algorithm);
        // Expiry is checked by `verify_at` against its own clock, after the
        // signature, so the caller gets `Expired` only for authentic tokens.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            keys: Arc::new(keys),
            ttl,
            validation,
        }
    }

    /// Load the configured key pair and token lifetime.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeyError> {
        let keys = SigningKeys::from_pem_files(
            &config.private_key_path,
            &config.public_key_path,
            config.algorithm,
        )?;
        Ok(Self::new(keys, config.token_ttl()))
    }

    /// How long issued tokens stay valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token valid from now until now + ttl.
    pub fn issue(&self, identity: &Identity) -> Result<String, SigningError> {
        self.issue_at(identity, current_timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, identity: &Identity, now: u64) -> Result<String, SigningError> {
        let key = self.keys.encoding.as_ref().ok_or(SigningError::MissingKey)?;

        let claims = SessionClaims {
            admin: identity.admin,
            name: identity.name.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };

        encode(&Header::new(self.keys.algorithm), &claims, key)
            .map_err(|e| SigningError::Sign(e.to_string()))
    }

    /// Verify signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.verify_at(token, current_timestamp())
    }

    /// Verify signature, then require `now < exp`.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<SessionClaims, AuthError> {
        let data = decode::<SessionClaims>(token, &self.keys.decoding, &self.validation)
            .map_err(|e| classify(e.kind()))?;

        if now >= data.claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidKeyFormat => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Unsigned,
    }
}

fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::EncodingKey;

    const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/session_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/session_public.pem");
    const FOREIGN_PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/foreign_private.pem");
    const FOREIGN_PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/foreign_public.pem");

    fn codec(ttl: Duration) -> TokenCodec {
        let keys = SigningKeys::from_pem(PRIVATE_PEM, PUBLIC_PEM, EcAlgorithm::ES256).unwrap();
        TokenCodec::new(keys, ttl)
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec(Duration::from_secs(3600));
        let token = codec.issue(&Identity::admin("Pi Wallet")).unwrap();

        let claims = codec.verify(&token).unwrap();
        assert!(claims.admin);
        assert_eq!(claims.name, "Pi Wallet");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_from_config_reads_key_files() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let config = AuthConfig {
            private_key_path: fixtures.join("session_private.pem"),
            public_key_path: fixtures.join("session_public.pem"),
            token_ttl_seconds: 120,
            ..Default::default()
        };

        let codec = TokenCodec::from_config(&config).unwrap();
        assert_eq!(codec.ttl(), Duration::from_secs(120));
        let token = codec.issue(&Identity::admin("Pi Wallet")).unwrap();
        assert!(codec.verify(&token).is_ok());
    }

    #[test]
    fn test_from_config_missing_key() {
        let config = AuthConfig {
            private_key_path: PathBuf::from("/nonexistent/session.key"),
            ..Default::default()
        };
        assert!(matches!(
            TokenCodec::from_config(&config),
            Err(KeyError::Io { .. })
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec(Duration::from_secs(60));
        let now = current_timestamp();
        let token = codec.issue_at(&Identity::admin("Pi Wallet"), now).unwrap();

        assert!(codec.verify_at(&token, now + 59).is_ok());
        assert_eq!(codec.verify_at(&token, now + 60), Err(AuthError::Expired));
        assert_eq!(codec.verify_at(&token, now + 3600), Err(AuthError::Expired));
    }

    #[test]
    fn test_token_issued_in_the_past_is_expired() {
        let codec = codec(Duration::from_secs(60));
        let issued = current_timestamp() - 120;
        let token = codec.issue_at(&Identity::admin("Pi Wallet"), issued).unwrap();

        assert_eq!(codec.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_foreign_key_is_bad_signature() {
        let ours = codec(Duration::from_secs(3600));
        let foreign_keys =
            SigningKeys::from_pem(FOREIGN_PRIVATE_PEM, FOREIGN_PUBLIC_PEM, EcAlgorithm::ES256)
                .unwrap();
        let foreign = TokenCodec::new(foreign_keys, Duration::from_secs(3600));

        let token = foreign.issue(&Identity::admin("Pi Wallet")).unwrap();
        assert_eq!(ours.verify(&token), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_algorithm_confusion_rejected() {
        let codec = codec(Duration::from_secs(3600));
        let claims = SessionClaims {
            admin: true,
            name: "Pi Wallet".to_string(),
            iat: current_timestamp(),
            exp: current_timestamp() + 3600,
        };
        // HMAC keyed with the public key bytes: the classic confusion attack
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM),
        )
        .unwrap();

        assert_eq!(codec.verify(&forged), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let codec = codec(Duration::from_secs(3600));
        // {"alg":"none","typ":"JWT"}.{"admin":true,"name":"x","iat":1,"exp":9999999999}.
        let none_token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
            eyJhZG1pbiI6dHJ1ZSwibmFtZSI6IngiLCJpYXQiOjEsImV4cCI6OTk5OTk5OTk5OX0.";

        assert!(codec.verify(none_token).is_err());
    }

    #[test]
    fn test_garbage_is_unsigned() {
        let codec = codec(Duration::from_secs(3600));
        assert_eq!(codec.verify("not-a-token"), Err(AuthError::Unsigned));
        assert_eq!(codec.verify(""), Err(AuthError::Unsigned));
    }

    #[test]
    fn test_verify_only_codec_cannot_issue() {
        let keys = SigningKeys::verify_only(PUBLIC_PEM, EcAlgorithm::ES256).unwrap();
        assert!(!keys.can_sign());

        let codec = TokenCodec::new(keys, Duration::from_secs(60));
        assert!(matches!(
            codec.issue(&Identity::admin("Pi Wallet")),
            Err(SigningError::MissingKey)
        ));
    }

    #[test]
    fn test_verify_only_codec_accepts_tokens_from_signer() {
        let signer = codec(Duration::from_secs(3600));
        let token = signer.issue(&Identity::admin("Pi Wallet")).unwrap();

        let verifier = TokenCodec::new(
            SigningKeys::verify_only(PUBLIC_PEM, EcAlgorithm::ES256).unwrap(),
            Duration::from_secs(3600),
        );
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_missing_key_file() {
        let result = SigningKeys::from_pem_files(
            "/nonexistent/session.key",
            "/nonexistent/session.pub",
            EcAlgorithm::ES256,
        );
        assert!(matches!(result, Err(KeyError::Io { .. })));
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("es384".parse::<EcAlgorithm>(), Ok(EcAlgorithm::ES384));
        assert!("HS256".parse::<EcAlgorithm>().is_err());
    }
}

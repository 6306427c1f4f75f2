//! Persistence for the enrolled one-time-password secret.

use super::totp::OtpAlgorithm;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Everything needed to recompute codes for the enrolled authenticator.
///
/// Code parameters are stored with the secret so later configuration changes
/// cannot silently desynchronise an already-provisioned authenticator app.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub account: String,
    pub issuer: String,
    /// Base32-encoded secret key material
    pub secret: String,
    pub algorithm: OtpAlgorithm,
    pub digits: usize,
    pub step: u64,
}

impl std::fmt::Debug for OtpRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpRecord")
            .field("account", &self.account)
            .field("issuer", &self.issuer)
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("digits", &self.digits)
            .field("step", &self.step)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a secret is already persisted")]
    AlreadyExists,
    #[error("secret storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("persisted secret is unreadable: {0}")]
    Corrupt(String),
}

/// Storage for the single enrolled secret.
///
/// `create` is the enrollment gate: it must be an atomic create-if-absent,
/// failing with [`StoreError::AlreadyExists`] and leaving the existing
/// record untouched when one is present.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the persisted record (None if not enrolled).
    async fn load(&self) -> Result<Option<OtpRecord>, StoreError>;

    /// Persist a new record.
    async fn create(&self, record: &OtpRecord) -> Result<(), StoreError>;
}

/// Stores the secret as JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` to a private temp file, then hard-link it into place.
    ///
    /// Linking fails with `AlreadyExists` when the target is present, and the
    /// target only ever appears fully written. Filesystems without hard links
    /// get an exclusive `create_new` on the target instead.
    async fn write_new(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = self.temp_path();
        let result = async {
            write_private(&tmp, bytes).await?;
            tokio::fs::hard_link(&tmp, &self.path).await
        }
        .await;

        let _ = tokio::fs::remove_file(&tmp).await;
        match result {
            Err(e) if links_unsupported(&e) => {
                tracing::debug!(
                    error = %e,
                    path = %self.path.display(),
                    "Hard link refused, creating secret file directly"
                );
                write_private(&self.path, bytes).await
            }
            other => other,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

fn links_unsupported(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied)
}

async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn load(&self) -> Result<Option<OtpRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn create(&self, record: &OtpRecord) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        match self.write_new(&bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(secret: &str) -> OtpRecord {
        OtpRecord {
            account: "admin".to_string(),
            issuer: "Pi Wallet".to_string(),
            secret: secret.to_string(),
            algorithm: OtpAlgorithm::SHA1,
            digits: 6,
            step: 30,
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("otp.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("otp.json"));

        store.create(&record("JBSWY3DPEHPK3PXP")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record("JBSWY3DPEHPK3PXP")));
    }

    #[tokio::test]
    async fn test_create_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("otp.json"));

        store.create(&record("FIRSTSECRETAAAAA")).await.unwrap();
        let second = store.create(&record("SECONDSECRETBBBB")).await;

        assert!(matches!(second, Err(StoreError::AlreadyExists)));
        assert_eq!(store.load().await.unwrap().unwrap().secret, "FIRSTSECRETAAAAA");
    }

    #[tokio::test]
    async fn test_create_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("otp.json"));
        store.create(&record("FIRSTSECRETAAAAA")).await.unwrap();
        let _ = store.create(&record("SECONDSECRETBBBB")).await;

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("otp.json")]);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otp.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = FileSecretStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("otp.json"));
        store.create(&record("JBSWY3DPEHPK3PXP")).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_link_fallback_kinds() {
        let err = |kind| std::io::Error::from(kind);
        assert!(links_unsupported(&err(ErrorKind::Unsupported)));
        assert!(links_unsupported(&err(ErrorKind::PermissionDenied)));
        assert!(!links_unsupported(&err(ErrorKind::AlreadyExists)));
        assert!(!links_unsupported(&err(ErrorKind::NotFound)));
    }

    #[tokio::test]
    async fn test_direct_create_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otp.json");

        write_private(&path, b"first").await.unwrap();
        let err = write_private(&path, b"second").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", record("JBSWY3DPEHPK3PXP")).contains("JBSWY3DPEHPK3PXP"));
    }
}

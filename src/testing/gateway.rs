//! A fully wired gateway over in-memory collaborators.

use super::scenario;
use super::wallet::{MockWallet, RecordingDevice};
use crate::auth::{AdminCredentials, EcAlgorithm, Identity, SigningKeys, TokenCodec};
use crate::gateway::{GatewayState, TicketsConfig, router};
use crate::mfa::{OtpRecord, SecretStore, StoreError, TotpConfig, TotpGuard};
use crate::rpc::RpcManager;
use async_trait::async_trait;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/session_private.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/session_public.pem");

pub const TEST_USERNAME: &str = "admin";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Secret store that keeps the record in memory.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    record: Arc<Mutex<Option<OtpRecord>>>,
}

impl MemorySecretStore {
    pub fn record(&self) -> Option<OtpRecord> {
        self.record.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn load(&self) -> Result<Option<OtpRecord>, StoreError> {
        Ok(self.record())
    }

    async fn create(&self, record: &OtpRecord) -> Result<(), StoreError> {
        let mut slot = self.record.lock().unwrap();
        if slot.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        *slot = Some(record.clone());
        Ok(())
    }
}

/// Gateway router plus handles on everything behind it.
pub struct TestGateway {
    pub state: GatewayState,
    pub wallet: MockWallet,
    pub device: RecordingDevice,
    pub secrets: MemorySecretStore,
}

impl TestGateway {
    pub async fn new() -> Self {
        Self::with_wallet(MockWallet::default()).await
    }

    pub async fn with_wallet(wallet: MockWallet) -> Self {
        let rpc = wallet.connect().await;
        Self::build(wallet, rpc, TicketsConfig::default())
    }

    pub fn build(wallet: MockWallet, rpc: RpcManager, tickets: TicketsConfig) -> Self {
        let device = RecordingDevice::default();
        let secrets = MemorySecretStore::default();
        let totp = TotpGuard::new(TotpConfig::default(), Arc::new(secrets.clone()));

        let state = GatewayState::new(test_codec(), totp, rpc, Arc::new(device.clone()))
            .with_credentials(AdminCredentials::new(TEST_USERNAME, TEST_PASSWORD.to_string()))
            .with_identity(Identity::admin("Pi Wallet"))
            .with_tickets(tickets);

        Self {
            state,
            wallet,
            device,
            secrets,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Log in with the test credentials and return the session token.
    pub async fn login(&self) -> String {
        let body: serde_json::Value = scenario::post(self.router(), "/login")
            .json_body(&serde_json::json!({
                "username": TEST_USERNAME,
                "password": TEST_PASSWORD,
            }))
            .execute()
            .await
            .assert_ok()
            .json()
            .await;
        body["token"].as_str().unwrap().to_string()
    }

    /// Enroll directly through the guard, skipping HTTP.
    pub async fn enroll(&self) {
        self.state.totp.enroll().await.unwrap();
    }

    /// The code an authenticator app would show right now.
    pub fn current_code(&self) -> String {
        let record = self.secrets.record().expect("two factor not enrolled");
        let now = chrono::Utc::now().timestamp() as u64;
        record.code_at(now).unwrap()
    }
}

/// Codec over the fixture key pair.
pub fn test_codec() -> TokenCodec {
    let keys = SigningKeys::from_pem(PRIVATE_PEM, PUBLIC_PEM, EcAlgorithm::ES256).unwrap();
    TokenCodec::new(keys, Duration::from_secs(3600))
}

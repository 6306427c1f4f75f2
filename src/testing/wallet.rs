//! In-memory stand-ins for the wallet and the host device.

use crate::device::{DeviceControl, DeviceError};
use crate::rpc::{
    Balance, NotificationSink, ReconnectPolicy, RpcConfig, RpcError, RpcManager, StakeInfo,
    TicketPurchase, WalletClient, WalletDialer,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct WalletState {
    balance: Mutex<f64>,
    stake: Mutex<Option<StakeInfo>>,
    purchases: Mutex<Vec<TicketPurchase>>,
    purchase_error: Mutex<Option<String>>,
    broken: AtomicBool,
    broken_client: Mutex<Option<usize>>,
}

/// Scriptable wallet shared by every client a [`MockDialer`] hands out.
#[derive(Clone, Default)]
pub struct MockWallet {
    state: Arc<WalletState>,
}

impl MockWallet {
    pub fn with_balance(self, amount: f64) -> Self {
        *self.state.balance.lock().unwrap() = amount;
        self
    }

    pub fn with_stake_info(self, stake: StakeInfo) -> Self {
        *self.state.stake.lock().unwrap() = Some(stake);
        self
    }

    /// Make every call on every client fail with a transport error.
    pub fn set_broken(&self, broken: bool) {
        self.state.broken.store(broken, Ordering::SeqCst);
    }

    /// Make calls on the `n`th dialed client fail with a transport error.
    pub fn break_client(&self, n: usize) {
        *self.state.broken_client.lock().unwrap() = Some(n);
    }

    /// Reject ticket purchases with a wallet-side error.
    pub fn reject_purchases(&self, message: &str) {
        *self.state.purchase_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn purchases(&self) -> Vec<TicketPurchase> {
        self.state.purchases.lock().unwrap().clone()
    }

    /// A manager already connected to this wallet, with reconnects disabled.
    pub async fn connect(&self) -> RpcManager {
        let config = RpcConfig {
            retry_interval_seconds: 0,
            reconnect: ReconnectPolicy::Never,
            ..Default::default()
        };
        RpcManager::connect(
            Arc::new(MockDialer::new(self.clone())),
            config,
            NotificationSink::channel(8).0,
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }
}

#[derive(Default)]
struct DialerState {
    dials: AtomicUsize,
    failing_dials: AtomicUsize,
    failing_probes: AtomicUsize,
    registrations: AtomicUsize,
}

/// Counts dials and can fail the first few dials or probes.
pub struct MockDialer {
    wallet: MockWallet,
    state: Arc<DialerState>,
}

impl MockDialer {
    pub fn new(wallet: MockWallet) -> Self {
        Self {
            wallet,
            state: Arc::default(),
        }
    }

    pub fn fail_dials(self, n: usize) -> Self {
        self.state.failing_dials.store(n, Ordering::SeqCst);
        self
    }

    pub fn fail_probes(self, n: usize) -> Self {
        self.state.failing_probes.store(n, Ordering::SeqCst);
        self
    }

    /// Dial attempts so far, failed ones included.
    pub fn dials(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> usize {
        self.state.registrations.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl WalletDialer for MockDialer {
    async fn dial(&self) -> Result<Arc<dyn WalletClient>, RpcError> {
        let id = self.state.dials.fetch_add(1, Ordering::SeqCst) + 1;
        if take_one(&self.state.failing_dials) {
            return Err(RpcError::transport("connection refused"));
        }
        Ok(Arc::new(MockClient {
            id,
            wallet: self.wallet.clone(),
            dialer: self.state.clone(),
        }))
    }
}

struct MockClient {
    id: usize,
    wallet: MockWallet,
    dialer: Arc<DialerState>,
}

impl MockClient {
    fn check_link(&self) -> Result<(), RpcError> {
        let state = &self.wallet.state;
        if state.broken.load(Ordering::SeqCst)
            || *state.broken_client.lock().unwrap() == Some(self.id)
        {
            return Err(RpcError::transport("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletClient for MockClient {
    async fn probe(&self) -> Result<(), RpcError> {
        self.check_link()?;
        if take_one(&self.dialer.failing_probes) {
            return Err(RpcError::Rpc {
                code: -1,
                message: "wallet not ready".to_string(),
            });
        }
        Ok(())
    }

    async fn register_notifications(&self, _sink: NotificationSink) -> Result<(), RpcError> {
        self.check_link()?;
        self.dialer.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, RpcError> {
        self.check_link()?;
        Ok(Balance {
            amount: *self.wallet.state.balance.lock().unwrap(),
        })
    }

    async fn stake_info(&self) -> Result<StakeInfo, RpcError> {
        self.check_link()?;
        Ok(self.wallet.state.stake.lock().unwrap().clone().unwrap_or(StakeInfo {
            own_mempool: 0,
            immature: 0,
            live: 0,
            total_subsidy: 0.0,
        }))
    }

    async fn purchase_ticket(&self, purchase: &TicketPurchase) -> Result<Vec<String>, RpcError> {
        self.check_link()?;
        if let Some(message) = self.wallet.state.purchase_error.lock().unwrap().clone() {
            return Err(RpcError::Rpc { code: -4, message });
        }

        let mut purchases = self.wallet.state.purchases.lock().unwrap();
        purchases.push(purchase.clone());
        Ok((0..purchase.num_tickets)
            .map(|i| format!("{:064x}", purchases.len() * 1000 + i as usize))
            .collect())
    }
}

/// Records power-off requests instead of shutting anything down.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl RecordingDevice {
    pub fn power_off_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceControl for RecordingDevice {
    async fn power_off(&self) -> Result<String, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "sudo: a password is required".to_string(),
            });
        }
        Ok("Shutdown scheduled".to_string())
    }
}

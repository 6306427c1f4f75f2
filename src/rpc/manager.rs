//! Owner of the single shared wallet connection.

use super::client::{WalletClient, WalletDialer};
use super::config::{ReconnectPolicy, RpcConfig};
use super::error::RpcError;
use super::notification::NotificationSink;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Keeps exactly one live wallet connection for the life of the process.
///
/// Handlers never hold on to a client: they resolve it through
/// [`RpcManager::handle`] or [`RpcManager::with_client`] on every call, so a
/// reconnect is visible to the next request without any coordination.
///
/// # Example
///
/// ```rust,ignore
/// let manager = RpcManager::connect(dialer, config, sink, shutdown.child_token()).await?;
/// let balance = manager.with_client(|c| async move { c.balance().await }).await?;
/// ```
#[derive(Clone)]
pub struct RpcManager {
    inner: Arc<Inner>,
}

struct Inner {
    dialer: Arc<dyn WalletDialer>,
    config: RpcConfig,
    sink: NotificationSink,
    cancel: CancellationToken,
    handle: RwLock<Arc<dyn WalletClient>>,
    reconnecting: AtomicBool,
}

impl RpcManager {
    /// Block until the wallet is reachable and return a manager owning the connection.
    ///
    /// Each attempt dials a throw-away connection and probes it; only after a
    /// successful probe is the long-lived connection dialed and notification
    /// handlers registered on it. Failed attempts are retried after
    /// `config.retry_interval()` with no upper bound. The only error is
    /// [`RpcError::Cancelled`], returned once `cancel` fires.
    pub async fn connect(
        dialer: Arc<dyn WalletDialer>,
        config: RpcConfig,
        sink: NotificationSink,
        cancel: CancellationToken,
    ) -> Result<Self, RpcError> {
        tracing::info!(url = %config.url(), "Starting wallet RPC client");

        let client = establish(dialer.as_ref(), &config, &sink, &cancel).await?;

        Ok(Self {
            inner: Arc::new(Inner {
                dialer,
                config,
                sink,
                cancel,
                handle: RwLock::new(client),
                reconnecting: AtomicBool::new(false),
            }),
        })
    }

    /// The current shared client. Do not cache it across requests.
    pub async fn handle(&self) -> Arc<dyn WalletClient> {
        self.inner.handle.read().await.clone()
    }

    /// Run one operation against the current client.
    ///
    /// Transport failures are returned to the caller unchanged and also
    /// reported to the reconnect policy.
    pub async fn with_client<T, F, Fut>(&self, f: F) -> Result<T, RpcError>
    where
        F: FnOnce(Arc<dyn WalletClient>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let client = self.handle().await;
        let result = f(client.clone()).await;

        if let Err(err) = &result {
            if err.is_transport() {
                self.report_failure(&client, err).await;
            }
        }
        result
    }

    /// Note that `failed` hit a transport error.
    ///
    /// Under [`ReconnectPolicy::OnTransportError`] this starts a background
    /// reconnect unless one is already running or `failed` has already been
    /// replaced. Returns immediately either way.
    pub async fn report_failure(&self, failed: &Arc<dyn WalletClient>, err: &RpcError) {
        if self.inner.config.reconnect == ReconnectPolicy::Never {
            tracing::warn!(error = %err, "Wallet transport failure, reconnect disabled");
            return;
        }

        if !same_client(&*self.inner.handle.read().await, failed) {
            tracing::debug!("Failure reported for a replaced wallet client");
            return;
        }

        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(error = %err, "Wallet transport failure, reconnecting");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            match establish(inner.dialer.as_ref(), &inner.config, &inner.sink, &inner.cancel).await
            {
                Ok(client) => {
                    *inner.handle.write().await = client;
                    tracing::info!("Wallet connection restored");
                }
                Err(e) => tracing::debug!(error = %e, "Wallet reconnect abandoned"),
            }
            inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }
}

fn same_client(a: &Arc<dyn WalletClient>, b: &Arc<dyn WalletClient>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

async fn establish(
    dialer: &dyn WalletDialer,
    config: &RpcConfig,
    sink: &NotificationSink,
    cancel: &CancellationToken,
) -> Result<Arc<dyn WalletClient>, RpcError> {
    let mut attempt_no: u64 = 0;

    loop {
        attempt_no += 1;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(RpcError::Cancelled),
            outcome = attempt(dialer, sink) => outcome,
        };

        match outcome {
            Ok(client) => {
                tracing::info!(attempts = attempt_no, "Connected to wallet RPC");
                return Ok(client);
            }
            Err(e) => {
                tracing::warn!(
                    attempt = attempt_no,
                    error = %e,
                    retry_in = ?config.retry_interval(),
                    "Failed to connect to wallet, waiting to try again"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RpcError::Cancelled),
            _ = tokio::time::sleep(config.retry_interval()) => {}
        }
    }
}

async fn attempt(
    dialer: &dyn WalletDialer,
    sink: &NotificationSink,
) -> Result<Arc<dyn WalletClient>, RpcError> {
    let probe = dialer.dial().await?;
    probe.probe().await?;
    drop(probe);
    tracing::debug!("Wallet probe succeeded");

    let client = dialer.dial().await?;
    client.register_notifications(sink.clone()).await?;
    tracing::trace!("Wallet notification registration complete");

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDialer, MockWallet};
    use std::time::Duration;

    fn config(reconnect: ReconnectPolicy) -> RpcConfig {
        RpcConfig {
            retry_interval_seconds: 0,
            reconnect,
            ..Default::default()
        }
    }

    fn sink() -> NotificationSink {
        NotificationSink::channel(8).0
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_connect_retries_failed_probes() {
        let dialer = Arc::new(MockDialer::new(MockWallet::default()).fail_probes(3));

        let manager = RpcManager::connect(
            dialer.clone(),
            config(ReconnectPolicy::Never),
            sink(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        // 4 probe connections plus the long-lived one
        assert_eq!(dialer.dials(), 5);
        assert!(manager.handle().await.balance().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_retries_failed_dials() {
        let dialer = Arc::new(MockDialer::new(MockWallet::default()).fail_dials(2));

        RpcManager::connect(dialer.clone(), config(ReconnectPolicy::Never), sink(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(dialer.dials(), 4);
    }

    #[tokio::test]
    async fn test_notifications_registered_on_long_lived_client_only() {
        let dialer = Arc::new(MockDialer::new(MockWallet::default()));

        RpcManager::connect(dialer.clone(), config(ReconnectPolicy::Never), sink(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(dialer.registrations(), 1);
        assert_eq!(dialer.dials(), 2);
    }

    #[tokio::test]
    async fn test_connect_cancelled() {
        let dialer = Arc::new(MockDialer::new(MockWallet::default()).fail_probes(usize::MAX));
        let config = RpcConfig {
            retry_interval_seconds: 60,
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let connecting = tokio::spawn(RpcManager::connect(dialer, config, sink(), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), connecting)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RpcError::Cancelled)));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_without_reconnect() {
        let wallet = MockWallet::default();
        let dialer = Arc::new(MockDialer::new(wallet.clone()));
        let manager = RpcManager::connect(
            dialer.clone(),
            config(ReconnectPolicy::Never),
            sink(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        wallet.set_broken(true);
        let err = manager.with_client(|c| async move { c.balance().await }).await.unwrap_err();

        assert!(err.is_transport());
        assert!(!manager.is_reconnecting());
        assert_eq!(dialer.dials(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_swaps_handle() {
        let wallet = MockWallet::default();
        let dialer = Arc::new(MockDialer::new(wallet.clone()));
        let manager = RpcManager::connect(
            dialer.clone(),
            config(ReconnectPolicy::OnTransportError),
            sink(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let before = manager.handle().await;

        wallet.break_client(dialer.dials());
        let err = manager.with_client(|c| async move { c.balance().await }).await.unwrap_err();
        assert!(err.is_transport());

        let m = manager.clone();
        eventually(move || !m.is_reconnecting() && dialer.dials() >= 4).await;

        let after = manager.handle().await;
        assert!(!same_client(&before, &after));
        assert!(manager.with_client(|c| async move { c.balance().await }).await.is_ok());
    }

    #[tokio::test]
    async fn test_wallet_error_does_not_reconnect() {
        let wallet = MockWallet::default();
        let dialer = Arc::new(MockDialer::new(wallet.clone()));
        let manager = RpcManager::connect(
            dialer.clone(),
            config(ReconnectPolicy::OnTransportError),
            sink(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        wallet.reject_purchases("insufficient funds");
        let err = manager
            .with_client(|c| async move {
                c.purchase_ticket(&crate::rpc::TicketPurchase::new(1.0, 1)).await
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Rpc { .. }));
        assert!(!manager.is_reconnecting());
        assert_eq!(dialer.dials(), 2);
    }
}

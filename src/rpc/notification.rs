//! Asynchronous wallet notifications.
//!
//! The transport never runs user callbacks itself. It pushes decoded events
//! into a bounded queue with [`NotificationSink::deliver`], which never
//! waits; a dispatcher task drains the queue and invokes the registered
//! [`NotificationHandlers`].

use super::error::RpcError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Balance change for one wallet account.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceNotification {
    pub account: String,
    /// Amount in coins
    pub amount: f64,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalletNotification {
    AccountBalance(BalanceNotification),
}

impl WalletNotification {
    /// Decode a server-initiated JSON-RPC message.
    ///
    /// Returns `None` for notification methods this gateway does not track.
    pub fn from_rpc(method: &str, params: &[Value]) -> Option<Result<Self, RpcError>> {
        match method {
            "accountbalance" => Some(decode_account_balance(params).map(Self::AccountBalance)),
            _ => None,
        }
    }
}

fn decode_account_balance(params: &[Value]) -> Result<BalanceNotification, RpcError> {
    match params {
        [account, amount, confirmed, ..] => Ok(BalanceNotification {
            account: account
                .as_str()
                .ok_or_else(|| RpcError::decode("accountbalance: account is not a string"))?
                .to_string(),
            amount: amount
                .as_f64()
                .ok_or_else(|| RpcError::decode("accountbalance: amount is not a number"))?,
            confirmed: confirmed
                .as_bool()
                .ok_or_else(|| RpcError::decode("accountbalance: confirmed is not a bool"))?,
        }),
        _ => Err(RpcError::decode(format!(
            "accountbalance: expected 3 params, got {}",
            params.len()
        ))),
    }
}

/// Callbacks for wallet notifications.
///
/// Runs on the dispatcher task. Implementations should only log or enqueue.
pub trait NotificationHandlers: Send + Sync + 'static {
    fn on_account_balance(&self, event: &BalanceNotification) {
        tracing::trace!(
            account = %event.account,
            amount = event.amount,
            confirmed = event.confirmed,
            "New balance for account"
        );
    }
}

/// Default handlers: log every event at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandlers;

impl NotificationHandlers for LoggingHandlers {}

/// Non-blocking entry point into the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::Sender<WalletNotification>,
}

impl NotificationSink {
    /// Sink plus the receiving end, for callers that drain the queue themselves.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<WalletNotification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue a notification. Returns false if it was dropped.
    pub fn deliver(&self, notification: WalletNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(notification = ?dropped, "Notification queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Notification dispatcher stopped, dropping event");
                false
            }
        }
    }
}

/// Runs [`NotificationHandlers`] on its own task.
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// Start the dispatcher; it stops when `cancel` fires or every sink is dropped.
    pub fn spawn(
        handlers: Arc<dyn NotificationHandlers>,
        buffer: usize,
        cancel: CancellationToken,
    ) -> (NotificationSink, JoinHandle<()>) {
        let (sink, mut rx) = NotificationSink::channel(buffer);

        let task = tokio::spawn(async move {
            tracing::debug!("Notification dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(notification) => dispatch(handlers.as_ref(), &notification),
                        None => break,
                    },
                }
            }
            tracing::debug!("Notification dispatcher stopped");
        });

        (sink, task)
    }
}

fn dispatch(handlers: &dyn NotificationHandlers, notification: &WalletNotification) {
    match notification {
        WalletNotification::AccountBalance(event) => handlers.on_account_balance(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<BalanceNotification>>,
    }

    impl NotificationHandlers for Recorder {
        fn on_account_balance(&self, event: &BalanceNotification) {
            self.seen.lock().unwrap().push(event.clone());
        }
    }

    fn balance(account: &str, amount: f64) -> WalletNotification {
        WalletNotification::AccountBalance(BalanceNotification {
            account: account.to_string(),
            amount,
            confirmed: true,
        })
    }

    #[test]
    fn test_decode_account_balance() {
        let params = [json!("default"), json!(12.5), json!(false)];
        let decoded = WalletNotification::from_rpc("accountbalance", &params).unwrap().unwrap();

        assert_eq!(
            decoded,
            WalletNotification::AccountBalance(BalanceNotification {
                account: "default".to_string(),
                amount: 12.5,
                confirmed: false,
            })
        );
    }

    #[test]
    fn test_decode_rejects_short_params() {
        let result = WalletNotification::from_rpc("accountbalance", &[json!("default")]).unwrap();
        assert!(matches!(result, Err(RpcError::Decode(_))));
    }

    #[test]
    fn test_untracked_method_ignored() {
        assert!(WalletNotification::from_rpc("blockconnected", &[]).is_none());
    }

    #[test]
    fn test_deliver_drops_when_full() {
        let (sink, mut rx) = NotificationSink::channel(1);

        assert!(sink.deliver(balance("default", 1.0)));
        assert!(!sink.deliver(balance("default", 2.0)));
        assert_eq!(rx.try_recv().unwrap(), balance("default", 1.0));
    }

    #[test]
    fn test_deliver_after_receiver_dropped() {
        let (sink, rx) = NotificationSink::channel(4);
        drop(rx);
        assert!(!sink.deliver(balance("default", 1.0)));
    }

    #[tokio::test]
    async fn test_dispatcher_runs_handlers_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (sink, task) =
            NotificationDispatcher::spawn(recorder.clone(), 8, CancellationToken::new());

        sink.deliver(balance("default", 1.0));
        sink.deliver(balance("voting", 2.0));
        drop(sink);
        task.await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        let accounts: Vec<_> = seen.iter().map(|e| e.account.as_str()).collect();
        assert_eq!(accounts, ["default", "voting"]);
    }

    #[tokio::test]
    async fn test_dispatcher_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let (_sink, task) = NotificationDispatcher::spawn(Arc::new(LoggingHandlers), 8, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}

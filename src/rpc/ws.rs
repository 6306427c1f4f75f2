//! JSON-RPC 1.0 over websocket, as spoken by the wallet daemon.

use super::client::{Balance, StakeInfo, TicketPurchase, WalletClient, WalletDialer};
use super::config::RpcConfig;
use super::error::RpcError;
use super::notification::{NotificationSink, WalletNotification};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rustls::RootCertStore;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// Dials [`WsWalletClient`] connections from an [`RpcConfig`].
pub struct WsDialer {
    config: RpcConfig,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WsDialer {
    /// Build a dialer, loading the pinned certificate if one is configured.
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let tls = match (&config.cert_path, config.disable_tls) {
            (Some(path), false) => Some(pinned_tls_config(path)?),
            _ => None,
        };
        Ok(Self { config, tls })
    }
}

#[async_trait]
impl WalletDialer for WsDialer {
    async fn dial(&self) -> Result<Arc<dyn WalletClient>, RpcError> {
        let client = WsWalletClient::connect(&self.config, self.tls.clone()).await?;
        Ok(Arc::new(client))
    }
}

fn pinned_tls_config(path: &Path) -> Result<Arc<rustls::ClientConfig>, RpcError> {
    let roots = load_root_store(path)
        .map_err(|e| RpcError::Config(format!("wallet certificate {}: {}", path.display(), e)))?;
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn load_root_store(path: &Path) -> io::Result<RootCertStore> {
    let mut reader = BufReader::new(File::open(path)?);
    let certificates = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certificates);
    if added == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no valid certificates found",
        ));
    }
    Ok(roots)
}

fn basic_auth(user: &str, pass: &str) -> Result<HeaderValue, RpcError> {
    let encoded = STANDARD.encode(format!("{}:{}", user, pass));
    HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|_| RpcError::Config("RPC credentials are not valid header text".to_string()))
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorObject>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
}

struct Shared {
    pending: Mutex<PendingMap>,
    sink: Mutex<Option<NotificationSink>>,
    closed: AtomicBool,
}

impl Shared {
    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Result<Value, RpcError>>> {
        self.pending.lock().ok()?.remove(&id)
    }

    fn handle_text(&self, text: &str) {
        let incoming: Incoming = match serde_json::from_str(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable message from wallet");
                return;
            }
        };

        if let Some(method) = incoming.method.as_deref() {
            if incoming.id.is_null() {
                self.handle_notification(method, &incoming.params);
                return;
            }
        }

        let Some(id) = incoming.id.as_u64() else {
            tracing::warn!(id = %incoming.id, "Wallet response without a usable id");
            return;
        };
        let Some(reply) = self.take_pending(id) else {
            tracing::debug!(id, "Response for unknown or expired call");
            return;
        };

        let outcome = match incoming.error {
            Some(err) => Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(incoming.result),
        };
        let _ = reply.send(outcome);
    }

    fn handle_notification(&self, method: &str, params: &[Value]) {
        let notification = match WalletNotification::from_rpc(method, params) {
            Some(Ok(notification)) => notification,
            Some(Err(e)) => {
                tracing::warn!(method, error = %e, "Malformed wallet notification");
                return;
            }
            None => {
                tracing::trace!(method, "Ignoring wallet notification");
                return;
            }
        };

        let sink = self.sink.lock().ok().and_then(|s| s.clone());
        match sink {
            Some(sink) => {
                sink.deliver(notification);
            }
            None => tracing::trace!(method, "No notification handlers registered"),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, tx)| tx).collect(),
            Err(_) => Vec::new(),
        };
        for reply in drained {
            let _ = reply.send(Err(RpcError::Closed));
        }
    }
}

/// One websocket connection to the wallet.
///
/// A reader task correlates responses with pending calls by id and routes
/// notifications to the registered sink. Dropping the client closes the socket.
pub struct WsWalletClient {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    call_timeout: Duration,
    reader: JoinHandle<()>,
}

impl WsWalletClient {
    pub async fn connect(
        config: &RpcConfig,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<Self, RpcError> {
        let url = config.url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RpcError::Config(format!("invalid wallet URL {}: {}", url, e)))?;
        request.headers_mut().insert(
            AUTHORIZATION,
            basic_auth(&config.user, config.pass.expose_secret())?,
        );

        let connector = tls.map(Connector::Rustls);
        let connect =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector);

        let (stream, _response) = tokio::time::timeout(config.call_timeout(), connect)
            .await
            .map_err(|_| RpcError::Timeout(config.call_timeout()))?
            .map_err(|e| RpcError::transport(e.to_string()))?;

        tracing::debug!(url = %url, "Connected to wallet RPC");
        Ok(Self::from_stream(stream, config.call_timeout()))
    }

    fn from_stream(stream: WsStream, call_timeout: Duration) -> Self {
        let (writer, reader) = stream.split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            sink: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(reader, shared.clone()));

        Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_id: AtomicU64::new(1),
            call_timeout,
            reader,
        }
    }

    /// Issue one call and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::decode(format!("{}: {}", method, e)))
    }

    async fn call_raw(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .map_err(|_| RpcError::transport("pending call table poisoned"))?
            .insert(id, tx);

        // The reader may have drained the table between the check and the insert
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.take_pending(id);
            return Err(RpcError::Closed);
        }

        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::trace!(id, method, "Wallet RPC call");

        let sent = self
            .writer
            .lock()
            .await
            .send(Message::Text(body.to_string()))
            .await;
        if let Err(e) = sent {
            self.shared.take_pending(id);
            return Err(RpcError::transport(e.to_string()));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                self.shared.take_pending(id);
                Err(RpcError::Timeout(self.call_timeout))
            }
        }
    }
}

impl Drop for WsWalletClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut reader: SplitStream<WsStream>, shared: Arc<Shared>) {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => shared.handle_text(&text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => shared.handle_text(text),
                Err(_) => tracing::warn!("Non UTF-8 binary frame from wallet"),
            },
            Ok(Message::Close(frame)) => {
                tracing::info!(frame = ?frame, "Wallet closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                break;
            }
        }
    }
    shared.close();
}

#[derive(Debug, Deserialize)]
struct GetBalanceResult {
    #[serde(default)]
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    #[serde(default)]
    total: f64,
}

#[derive(Debug, Deserialize)]
struct GetStakeInfoResult {
    #[serde(rename = "ownmempool", default)]
    own_mempool: u32,
    #[serde(default)]
    immature: u32,
    #[serde(default)]
    live: u32,
    #[serde(rename = "totalsubsidy", default)]
    total_subsidy: f64,
}

fn purchase_params(purchase: &TicketPurchase) -> Vec<Value> {
    let mut params = vec![
        json!(purchase.from_account),
        json!(purchase.spend_limit),
        json!(purchase.min_conf),
        json!(purchase.ticket_address),
        json!(purchase.num_tickets),
        json!(purchase.pool_address),
        json!(purchase.pool_fees),
        json!(purchase.expiry),
        Value::Null, // comment (unused)
        json!(purchase.ticket_fee),
    ];
    while params.last().is_some_and(Value::is_null) {
        params.pop();
    }
    params
}

#[async_trait]
impl WalletClient for WsWalletClient {
    async fn probe(&self) -> Result<(), RpcError> {
        self.call::<Value>("listunspent", vec![]).await.map(|_| ())
    }

    async fn register_notifications(&self, sink: NotificationSink) -> Result<(), RpcError> {
        let mut slot = self
            .shared
            .sink
            .lock()
            .map_err(|_| RpcError::transport("notification slot poisoned"))?;
        *slot = Some(sink);
        tracing::trace!("Wallet notification handlers registered");
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, RpcError> {
        let result: GetBalanceResult = self.call("getbalance", vec![json!("*"), json!(1)]).await?;
        Ok(Balance {
            amount: result.balances.iter().map(|b| b.total).sum(),
        })
    }

    async fn stake_info(&self) -> Result<StakeInfo, RpcError> {
        let result: GetStakeInfoResult = self.call("getstakeinfo", vec![]).await?;
        Ok(StakeInfo {
            own_mempool: result.own_mempool,
            immature: result.immature,
            live: result.live,
            total_subsidy: result.total_subsidy,
        })
    }

    async fn purchase_ticket(&self, purchase: &TicketPurchase) -> Result<Vec<String>, RpcError> {
        self.call("purchaseticket", purchase_params(purchase)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::notification::BalanceNotification;
    use secrecy::SecretString;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    /// Minimal wallet: answers a few methods and pushes one notification.
    async fn spawn_wallet() -> (String, tokio::sync::oneshot::Receiver<Option<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (auth_tx, auth_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = auth_tx.send(auth);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: Value = serde_json::from_str(&text).unwrap();
                let id = req["id"].clone();
                let reply = match req["method"].as_str().unwrap() {
                    "listunspent" => json!({"id": id, "result": [], "error": null}),
                    "getbalance" => {
                        ws.send(Message::Text(
                            json!({"jsonrpc": "1.0", "id": null, "method": "accountbalance",
                                   "params": ["default", 3.5, true]})
                            .to_string(),
                        ))
                        .await
                        .unwrap();
                        json!({"id": id, "error": null, "result": {"balances": [
                            {"accountname": "default", "total": 3.5},
                            {"accountname": "voting", "total": 1.25}
                        ]}})
                    }
                    "getstakeinfo" => json!({"id": id, "error": null, "result": {
                        "ownmempool": 1, "immature": 2, "live": 3, "totalsubsidy": 130.32
                    }}),
                    _ => json!({"id": id, "result": null,
                                "error": {"code": -32601, "message": "Method not found"}}),
                };
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });

        (addr, auth_rx)
    }

    fn config(host: String) -> RpcConfig {
        RpcConfig {
            host,
            user: "rpcuser".to_string(),
            pass: SecretString::from("rpcpass"),
            disable_tls: true,
            call_timeout_seconds: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_calls_against_local_wallet() {
        let (addr, auth_rx) = spawn_wallet().await;
        let client = WsDialer::new(config(addr)).unwrap().dial().await.unwrap();

        let expected = format!("Basic {}", STANDARD.encode("rpcuser:rpcpass"));
        assert_eq!(auth_rx.await.unwrap(), Some(expected));

        client.probe().await.unwrap();

        let (sink, mut rx) = NotificationSink::channel(4);
        client.register_notifications(sink).await.unwrap();

        assert_eq!(client.balance().await.unwrap(), Balance { amount: 4.75 });
        assert_eq!(
            rx.recv().await.unwrap(),
            WalletNotification::AccountBalance(BalanceNotification {
                account: "default".to_string(),
                amount: 3.5,
                confirmed: true,
            })
        );

        let stake = client.stake_info().await.unwrap();
        assert_eq!(stake.live, 3);
        assert_eq!(stake.total_subsidy, 130.32);
    }

    /// Wallet that reads one request and then either hangs up or goes quiet.
    async fn spawn_unresponsive_wallet(hang_up: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
            if hang_up {
                let _ = ws.close(None).await;
            } else {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_hang_up_fails_pending_and_later_calls() {
        let addr = spawn_unresponsive_wallet(true).await;
        let client = WsWalletClient::connect(&config(addr), None).await.unwrap();

        let err = client.probe().await.unwrap_err();
        assert_eq!(err, RpcError::Closed);
        assert!(err.is_transport());

        let err = client.balance().await.unwrap_err();
        assert_eq!(err, RpcError::Closed);
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_silent_wallet_times_out() {
        let addr = spawn_unresponsive_wallet(false).await;
        let config = RpcConfig {
            call_timeout_seconds: 1,
            ..config(addr)
        };
        let client = WsWalletClient::connect(&config, None).await.unwrap();

        let err = client.stake_info().await.unwrap_err();
        assert_eq!(err, RpcError::Timeout(Duration::from_secs(1)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_wallet_error_is_rpc_error() {
        let (addr, _auth) = spawn_wallet().await;
        let client = WsDialer::new(config(addr)).unwrap().dial().await.unwrap();

        let err = client
            .purchase_ticket(&TicketPurchase::new(10.0, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Rpc {
                code: -32601,
                message: "Method not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dial_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = WsDialer::new(config(addr)).unwrap().dial().await.err().unwrap();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }

    #[test]
    fn test_missing_certificate_is_config_error() {
        let config = RpcConfig {
            cert_path: Some("/nonexistent/rpc.cert".into()),
            ..Default::default()
        };
        assert!(matches!(WsDialer::new(config), Err(RpcError::Config(_))));
    }

    #[test]
    fn test_purchase_params_trim_trailing_nulls() {
        let params = purchase_params(&TicketPurchase::new(25.0, 2));
        assert_eq!(params, vec![json!("default"), json!(25.0), json!(1), Value::Null, json!(2)]);

        let purchase = TicketPurchase {
            ticket_fee: Some(0.01),
            expiry: Some(10),
            ..TicketPurchase::new(25.0, 2)
        };
        let params = purchase_params(&purchase);
        assert_eq!(params.len(), 10);
        assert_eq!(params[7], json!(10));
        assert_eq!(params[8], Value::Null);
    }
}

use super::error::RpcError;
use super::notification::NotificationSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Total balance across all wallet accounts, in coins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: f64,
}

/// Proof-of-stake ticket summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    pub own_mempool: u32,
    pub immature: u32,
    pub live: u32,
    /// Coins earned from voting so far
    pub total_subsidy: f64,
}

/// Parameters for a ticket purchase. Amounts are in coins.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketPurchase {
    pub from_account: String,
    pub spend_limit: f64,
    pub min_conf: u32,
    pub ticket_address: Option<String>,
    pub num_tickets: u32,
    pub pool_address: Option<String>,
    pub pool_fees: Option<f64>,
    pub expiry: Option<u32>,
    pub ticket_fee: Option<f64>,
}

impl TicketPurchase {
    pub fn new(spend_limit: f64, num_tickets: u32) -> Self {
        Self {
            from_account: "default".to_string(),
            spend_limit,
            min_conf: 1,
            ticket_address: None,
            num_tickets,
            pool_address: None,
            pool_fees: None,
            expiry: None,
            ticket_fee: None,
        }
    }
}

/// An authenticated connection to the wallet.
///
/// Implementations must be cheap to share: the manager hands the same
/// `Arc<dyn WalletClient>` to every request.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Trivial call proving the wallet accepts requests.
    async fn probe(&self) -> Result<(), RpcError>;

    /// Route server-initiated notifications into `sink`.
    async fn register_notifications(&self, sink: NotificationSink) -> Result<(), RpcError>;

    async fn balance(&self) -> Result<Balance, RpcError>;

    async fn stake_info(&self) -> Result<StakeInfo, RpcError>;

    /// Returns the hashes of the purchased tickets.
    async fn purchase_ticket(&self, purchase: &TicketPurchase) -> Result<Vec<String>, RpcError>;
}

/// Opens new wallet connections.
#[async_trait]
pub trait WalletDialer: Send + Sync {
    async fn dial(&self) -> Result<Arc<dyn WalletClient>, RpcError>;
}

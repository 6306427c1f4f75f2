//! Wallet RPC connectivity.
//!
//! [`RpcManager`] owns the single shared connection to the wallet daemon.
//! It waits out an unavailable wallet at startup, optionally reconnects after
//! transport failures and feeds wallet notifications to a
//! [`NotificationDispatcher`].
//!
//! The wire protocol lives behind the [`WalletDialer`] / [`WalletClient`]
//! traits; [`WsDialer`] is the websocket JSON-RPC implementation.

mod client;
mod config;
mod error;
mod manager;
mod notification;
mod ws;

pub use client::{Balance, StakeInfo, TicketPurchase, WalletClient, WalletDialer};
pub use config::{ReconnectPolicy, RpcConfig};
pub use error::RpcError;
pub use manager::RpcManager;
pub use notification::{
    BalanceNotification, LoggingHandlers, NotificationDispatcher, NotificationHandlers,
    NotificationSink, WalletNotification,
};
pub use ws::{WsDialer, WsWalletClient};

//! Walletgate - a two-factor security gateway for a headless staking wallet
//!
//! The gateway sits between a remote operator and a wallet daemon reachable
//! over websocket JSON-RPC. It exposes a small HTTP API:
//!
//! - **Sessions**: `/login` exchanges admin credentials for a signed token
//! - **Two factor**: a single TOTP enrollment, rendered as a QR code
//! - **Wallet**: balance, staking summary and ticket purchases
//! - **Device**: a code-gated power-off of the host
//! - **Health**: wallet connectivity reported on `/health`
//!
//! Anything that spends funds or affects the device needs a fresh one-time
//! code on top of the session token.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use walletgate::{
//!     ConfigBuilder, GatewayState, ShutdownCommand, TokenCodec, TotpGuard,
//!     rpc::{LoggingHandlers, NotificationDispatcher, RpcManager, WsDialer},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     walletgate::init_tracing_with_config(&config);
//!
//!     let cancel = CancellationToken::new();
//!     let codec = TokenCodec::from_config(&config.auth)?;
//!     let (sink, _dispatcher) =
//!         NotificationDispatcher::spawn(Arc::new(LoggingHandlers), 64, cancel.clone());
//!     let dialer = Arc::new(WsDialer::new(config.rpc.clone())?);
//!     let rpc = RpcManager::connect(dialer, config.rpc.clone(), sink, cancel.clone()).await?;
//!
//!     let state = GatewayState::new(
//!         codec,
//!         TotpGuard::with_file_store(config.totp.clone()),
//!         rpc,
//!         Arc::new(ShutdownCommand::new(config.device.clone())),
//!     );
//!
//!     walletgate::serve(walletgate::router(state), &config.server, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
mod config;
pub mod device;
mod error;
pub mod gateway;
pub mod health;
pub mod mfa;
pub mod rpc;
mod server;
pub mod testing;
mod utils;

// Re-exports for public API
pub use auth::{AdminCredentials, Identity, SessionClaims, SigningKeys, TokenCodec};
pub use config::{Config, ConfigBuilder, ConfigError, LoggingConfig, ServerConfig};
pub use device::{DeviceConfig, DeviceControl, DeviceError, ShutdownCommand};
pub use error::{ErrorResponse, GatewayError, Result};
pub use gateway::{GatewayState, TicketsConfig, router};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus, WalletHealthCheck};
pub use mfa::{TotpConfig, TotpGuard};
pub use server::{MakeRequestUuid, build_cors_layer, serve, with_middleware};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "walletgate=debug")
/// - `WALLETGATE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("WALLETGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
///
/// `RUST_LOG` still wins over the configured level when it is set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

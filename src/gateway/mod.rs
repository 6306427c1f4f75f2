//! The HTTP boundary.
//!
//! `/login`, `/about` and `/health` are public. Everything under `/api`
//! sits behind [`RequireSession`]; the ticket purchase and power-off
//! handlers additionally check a one-time code before touching the wallet
//! or the device.

pub mod routes;
pub mod types;

use crate::auth::{AdminCredentials, Identity, RequireSession, TokenCodec};
use crate::device::DeviceControl;
use crate::health::{HealthChecker, WalletHealthCheck};
use crate::mfa::TotpGuard;
use crate::rpc::RpcManager;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

pub use types::TicketsConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub codec: TokenCodec,
    pub credentials: Arc<AdminCredentials>,
    /// Identity placed in issued session tokens
    pub identity: Identity,
    pub totp: TotpGuard,
    pub rpc: RpcManager,
    pub device: Arc<dyn DeviceControl>,
    pub tickets: Arc<TicketsConfig>,
    pub health: Arc<HealthChecker>,
}

impl GatewayState {
    /// State with no usable login until [`with_credentials`](Self::with_credentials) is called.
    pub fn new(
        codec: TokenCodec,
        totp: TotpGuard,
        rpc: RpcManager,
        device: Arc<dyn DeviceControl>,
    ) -> Self {
        let health = HealthChecker::new().with_check(Arc::new(WalletHealthCheck::new(rpc.clone())));

        Self {
            codec,
            credentials: Arc::new(AdminCredentials::new("admin", String::new())),
            identity: Identity::admin("Pi Wallet"),
            totp,
            rpc,
            device,
            tickets: Arc::new(TicketsConfig::default()),
            health: Arc::new(health),
        }
    }

    pub fn with_credentials(mut self, credentials: AdminCredentials) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_tickets(mut self, tickets: TicketsConfig) -> Self {
        self.tickets = Arc::new(tickets);
        self
    }
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    let api = Router::new()
        .route("/twofactor", get(routes::two_factor))
        .route("/balance", get(routes::balance))
        .route("/tickets", get(routes::tickets))
        .route("/tickets/buy", post(routes::buy_tickets))
        .route("/turnoff/{code}", get(routes::turn_off))
        .layer(middleware::from_fn_with_state(
            state.codec.clone(),
            RequireSession::middleware,
        ));

    Router::new()
        .route("/login", post(routes::login))
        .route("/about", get(routes::about))
        .route("/health", get(routes::health))
        .nest("/api", api)
        .with_state(state)
}

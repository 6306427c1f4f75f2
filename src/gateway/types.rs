use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Atoms per coin
pub const ATOMS_PER_COIN: f64 = 1e8;

/// `POST /login` body. The password never appears in Debug output.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// `POST /api/tickets/buy` body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketBuyRequest {
    /// Maximum to spend, in atoms
    pub spend_limit: i64,
    pub num_tickets: u32,
    /// One-time code authorising the purchase
    pub code_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketBuyResponse {
    pub hashes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub message: String,
}

/// Fixed parameters applied to every ticket purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketsConfig {
    #[serde(default = "default_from_account")]
    pub from_account: String,

    #[serde(default = "default_min_conf")]
    pub min_conf: u32,

    /// Address granted voting rights for purchased tickets
    #[serde(default)]
    pub voting_address: Option<String>,

    /// Stake pool fee address
    #[serde(default)]
    pub pool_address: Option<String>,

    /// Stake pool fee percentage
    #[serde(default)]
    pub pool_fees: Option<f64>,

    /// Ticket fee rate in coins per kB
    #[serde(default)]
    pub ticket_fee: Option<f64>,

    /// Block height at which unmined purchases expire
    #[serde(default)]
    pub expiry: Option<u32>,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            from_account: default_from_account(),
            min_conf: default_min_conf(),
            voting_address: None,
            pool_address: None,
            pool_fees: None,
            ticket_fee: None,
            expiry: None,
        }
    }
}

impl TicketsConfig {
    /// Overlay `WALLETGATE_TICKETS_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(account) = get_env_with_prefix("TICKETS_FROM_ACCOUNT") {
            self.from_account = account;
        }
        if let Some(min_conf) = parse_env_with_prefix("TICKETS_MIN_CONF") {
            self.min_conf = min_conf;
        }
        if let Some(address) = get_env_with_prefix("TICKETS_VOTING_ADDRESS") {
            self.voting_address = Some(address);
        }
        if let Some(address) = get_env_with_prefix("TICKETS_POOL_ADDRESS") {
            self.pool_address = Some(address);
        }
        if let Some(fees) = parse_env_with_prefix("TICKETS_POOL_FEES") {
            self.pool_fees = Some(fees);
        }
        if let Some(fee) = parse_env_with_prefix("TICKETS_TICKET_FEE") {
            self.ticket_fee = Some(fee);
        }
        if let Some(expiry) = parse_env_with_prefix("TICKETS_EXPIRY") {
            self.expiry = Some(expiry);
        }
    }
}

fn default_from_account() -> String {
    "default".to_string()
}

fn default_min_conf() -> u32 {
    1
}

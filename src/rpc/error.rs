use std::time::Duration;

/// Failures talking to the wallet RPC service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("wallet returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not decode wallet response: {0}")]
    Decode(String),

    #[error("connection closed")]
    Closed,

    #[error("connect cancelled")]
    Cancelled,

    #[error("invalid RPC configuration: {0}")]
    Config(String),
}

impl RpcError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// True when the connection itself is suspect and a reconnect may help.
    ///
    /// Errors reported by the wallet (`Rpc`) or undecodable payloads mean the
    /// link works and are not transport failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_) | Self::Closed)
    }
}

use crate::auth::{AuthError, SigningError};
use crate::mfa::{EnrollError, VerifyError};
use crate::rpc::RpcError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the gateway.
///
/// Every failure a handler can produce ends up here, so the mapping to an HTTP
/// status and a client-safe message lives in one place.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Two factor enrollment failed: {0}")]
    Enroll(#[from] EnrollError),

    #[error("Two factor verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("Token signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Wallet RPC failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Device control failed: {0}")]
    Device(String),

}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl GatewayError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Enroll(_)
            | Self::Verify(_)
            | Self::Signing(_)
            | Self::Rpc(_)
            | Self::Device(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human-readable reason that is safe to hand to the client.
    ///
    /// Never includes key material, the one-time secret or RPC credentials;
    /// the full error is only written to the server log.
    pub fn safe_message(&self) -> String {
        match self {
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Unauthorized(err) => format!("Unauthorized: {}", err),
            Self::Forbidden(msg) => format!("Forbidden: {}", msg),
            Self::Enroll(EnrollError::AlreadyEnrolled) => {
                "Two factor authentication already set".to_string()
            }
            Self::Enroll(_) => "Error setting 2FA token".to_string(),
            Self::Verify(_) => "Error validating 2FA token".to_string(),
            Self::Signing(_) => "Error while signing the token".to_string(),
            Self::Rpc(_) => "Wallet RPC error".to_string(),
            Self::Device(_) => "Error turning off device".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for gateway handlers
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_unauthorized() {
        for err in [AuthError::Missing, AuthError::Unsigned, AuthError::BadSignature, AuthError::Expired] {
            assert_eq!(GatewayError::from(err).status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_step_up_failures_are_server_errors() {
        let err = GatewayError::from(VerifyError::InvalidCode);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.safe_message(), "Error validating 2FA token");

        let err = GatewayError::from(EnrollError::AlreadyEnrolled);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.safe_message().contains("already set"));
    }

    #[test]
    fn test_rpc_cause_not_exposed() {
        let err = GatewayError::from(RpcError::Rpc {
            code: -4,
            message: "rpcuser=alice rejected".to_string(),
        });
        assert_eq!(err.safe_message(), "Wallet RPC error");
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn test_request_level_errors() {
        let err = GatewayError::bad_request("numTickets must be at least 1");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.safe_message(), "Bad request: numTickets must be at least 1");

        let err = GatewayError::forbidden("Invalid credentials");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = GatewayError::device("sudo: a password is required");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.safe_message(), "Error turning off device");
    }
}

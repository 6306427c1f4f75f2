use super::GatewayState;
use super::types::{
    ATOMS_PER_COIN, DeviceResponse, LoginRequest, TicketBuyRequest, TicketBuyResponse,
    TokenResponse,
};
use crate::auth::Session;
use crate::error::{GatewayError, Result};
use crate::health::HealthResponse;
use crate::rpc::{Balance, StakeInfo, TicketPurchase};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;

/// `POST /login`: exchange the admin credentials for a session token.
///
/// Malformed bodies and wrong credentials are both answered with 403.
pub async fn login(
    State(state): State<GatewayState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Malformed login request");
        GatewayError::forbidden("Invalid credentials")
    })?;

    if !state
        .credentials
        .verify(&request.username, request.password.expose_secret())
    {
        tracing::warn!(username = %request.username, "Login rejected");
        return Err(GatewayError::forbidden("Invalid credentials"));
    }

    let token = state.codec.issue(&state.identity)?;
    tracing::info!(username = %request.username, "Session token issued");

    Ok(Json(TokenResponse { token }))
}

/// `GET /about`
pub async fn about() -> String {
    format!("Version: {}", env!("CARGO_PKG_VERSION"))
}

/// `GET /health`
pub async fn health(State(state): State<GatewayState>) -> HealthResponse {
    state.health.check_health().await
}

/// `GET /api/twofactor`: one-shot enrollment, answers with the QR code.
pub async fn two_factor(
    State(state): State<GatewayState>,
    Session(session): Session,
) -> Result<Response> {
    let png = state.totp.enroll().await?;
    tracing::info!(subject = %session.name, "Two factor enrollment completed");

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// `GET /api/balance`
pub async fn balance(State(state): State<GatewayState>) -> Result<Json<Balance>> {
    let balance = state
        .rpc
        .with_client(|client| async move { client.balance().await })
        .await?;
    Ok(Json(balance))
}

/// `GET /api/tickets`
pub async fn tickets(State(state): State<GatewayState>) -> Result<Json<StakeInfo>> {
    let stake = state
        .rpc
        .with_client(|client| async move { client.stake_info().await })
        .await?;
    Ok(Json(stake))
}

/// `POST /api/tickets/buy`: requires a valid one-time code in `codeToken`.
pub async fn buy_tickets(
    State(state): State<GatewayState>,
    Session(session): Session,
    payload: std::result::Result<Json<TicketBuyRequest>, JsonRejection>,
) -> Result<Json<TicketBuyResponse>> {
    let Json(request) =
        payload.map_err(|rejection| GatewayError::bad_request(rejection.body_text()))?;

    if request.spend_limit <= 0 {
        return Err(GatewayError::bad_request("spendLimit must be positive"));
    }
    if request.num_tickets == 0 {
        return Err(GatewayError::bad_request("numTickets must be at least 1"));
    }

    state.totp.verify_code(&request.code_token).await?;

    let tickets = &state.tickets;
    let purchase = TicketPurchase {
        from_account: tickets.from_account.clone(),
        spend_limit: request.spend_limit as f64 / ATOMS_PER_COIN,
        min_conf: tickets.min_conf,
        ticket_address: tickets.voting_address.clone(),
        num_tickets: request.num_tickets,
        pool_address: tickets.pool_address.clone(),
        pool_fees: tickets.pool_fees,
        expiry: tickets.expiry,
        ticket_fee: tickets.ticket_fee,
    };

    let hashes = state
        .rpc
        .with_client(|client| async move { client.purchase_ticket(&purchase).await })
        .await?;

    tracing::info!(
        subject = %session.name,
        tickets = hashes.len(),
        "Ticket purchase submitted"
    );
    Ok(Json(TicketBuyResponse { hashes }))
}

/// `GET /api/turnoff/{code}`: requires a valid one-time code in the path.
pub async fn turn_off(
    State(state): State<GatewayState>,
    Session(session): Session,
    Path(code): Path<String>,
) -> Result<Json<DeviceResponse>> {
    state.totp.verify_code(&code).await?;

    tracing::warn!(subject = %session.name, "Device power-off requested");
    let output = state
        .device
        .power_off()
        .await
        .map_err(|e| GatewayError::device(e.to_string()))?;

    Ok(Json(DeviceResponse {
        message: format!("Device Response: {}", output.trim()),
    }))
}

use super::{codec::TokenCodec, token::TokenExtractor};
use crate::error::GatewayError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid session token for all routes it wraps
///
/// On success the verified [`SessionClaims`](super::SessionClaims) are stored
/// in the request extensions and the request is forwarded unchanged. Any
/// failure short-circuits with 401 and the wrapped handler never runs.
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware, routing::get};
/// use walletgate::auth::RequireSession;
///
/// let protected = Router::new()
///     .route("/balance", get(balance))
///     .layer(middleware::from_fn_with_state(codec.clone(), RequireSession::middleware));
/// ```
pub struct RequireSession;

impl RequireSession {
    pub async fn middleware(
        State(codec): State<TokenCodec>,
        request: Request,
        next: Next,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let token = TokenExtractor::from_header(&parts)?;

        let claims = codec.verify(&token)?;
        tracing::debug!(subject = %claims.name, exp = claims.exp, "Session token accepted");

        let mut request = Request::from_parts(parts, body);
        request.extensions_mut().insert(claims);

        Ok(next.run(request).await)
    }
}

use super::codec::{AuthError, SessionClaims};
use crate::error::GatewayError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::future::Future;

/// Axum extractor for the claims of the current session
///
/// Only usable behind [`RequireSession`](super::RequireSession), which
/// verifies the token and stores the claims. Outside of it the request is
/// rejected with 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(Session(claims): Session) -> String {
///     claims.name
/// }
/// ```
pub struct Session(pub SessionClaims);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let claims = parts.extensions.get::<SessionClaims>().cloned();
        async move {
            claims
                .map(Session)
                .ok_or(GatewayError::Unauthorized(AuthError::Missing))
        }
    }
}

use super::codec::AuthError;
use axum::http::{header, request::Parts};

/// Extracts bearer token from request headers
pub struct TokenExtractor;

impl TokenExtractor {
    /// Extract token from Authorization header
    pub fn from_header(parts: &Parts) -> Result<String, AuthError> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::Missing)?;

        // Scheme is case-insensitive; some clients send "bearer"
        let (scheme, token) = auth_header.split_once(' ').ok_or(AuthError::Unsigned)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::Unsigned);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        Ok(token.to_string())
    }
}

//! The single admin credential pair accepted by `/login`.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Username/password of the one admin identity.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: SecretString,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check a login attempt.
    ///
    /// Both fields are always compared so the response time does not reveal
    /// which one was wrong. An unset password never matches.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let expected = self.password.expose_secret();
        if expected.is_empty() {
            tracing::warn!("Login attempted but no admin password is configured");
            return false;
        }

        let user_ok = constant_time_compare(&self.username, username);
        let pass_ok = constant_time_compare(expected, password);
        user_ok & pass_ok
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

//! Session authentication: admin credentials, signed session tokens and the
//! middleware that enforces them on protected routes.

pub mod codec;
pub mod config;
pub mod credentials;
pub mod extractors;
pub mod middleware;
pub mod token;

pub use codec::{
    AuthError, EcAlgorithm, Identity, KeyError, SessionClaims, SigningError, SigningKeys,
    TokenCodec,
};
pub use config::AuthConfig;
pub use credentials::AdminCredentials;
pub use extractors::Session;
pub use middleware::RequireSession;
pub use token::TokenExtractor;

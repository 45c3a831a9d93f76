//! Optional bearer-token gate for WebSocket upgrade paths.
//!
//! Tokens travel in the `token` query parameter of the upgrade request. A
//! missing token is allowed; a present token must decode, carry a valid HMAC
//! signature when a shared secret is configured, and not be past its `exp`.

pub mod error;
pub mod extract;
pub mod models;
pub mod secret;
pub mod stream;
pub mod validator;

pub use error::{AuthError, Result};
pub use extract::extract_token;
pub use models::{Claims, TokenValidationResult};
pub use secret::{get_secret, set_secret, SecretStore};
pub use stream::validate_stream_settings;
pub use validator::TokenValidator;

/// Validate the token in `path_and_query` against the process-wide secret
/// and the current time.
pub fn validate_path(path_and_query: &str) -> bool {
    TokenValidator::default().is_valid_now(path_and_query)
}

//! WebSocket upgrade gate.
//!
//! [`proxy::ForwardingProxy`] is a standalone TCP proxy that checks the
//! optional `token` query parameter of WebSocket upgrade requests before
//! splicing the connection to a backend. [`middleware::token_gate`] applies
//! the same check in front of an existing axum router.

pub mod error;
pub mod middleware;
pub mod proxy;
pub mod upgrade;

pub use middleware::{require_valid_token, token_gate};
pub use proxy::{ForwardingProxy, ProxyConfig, ProxyError};
pub use token_auth::{SecretStore, TokenValidator, set_secret};
pub use upgrade::is_websocket_upgrade;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

/// Holder for the shared HMAC secret.
///
/// The first successful `set` wins; every later call is a no-op whatever
/// its argument. Reads need no lock once the value is initialized.
#[derive(Default)]
pub struct SecretStore {
    secret: OnceCell<Vec<u8>>,
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("is_set", &self.is_set())
            .finish_non_exhaustive()
    }
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `secret` if nothing was stored yet. Returns true only for the
    /// call that actually initialized the store.
    pub fn set(&self, secret: impl Into<Vec<u8>>) -> bool {
        self.secret.set(secret.into()).is_ok()
    }

    /// The stored secret, or `None` when none was set. An empty secret is
    /// reported as `None` since it cannot key a signature check.
    pub fn get(&self) -> Option<&[u8]> {
        self.secret
            .get()
            .map(Vec::as_slice)
            .filter(|secret| !secret.is_empty())
    }

    pub fn is_set(&self) -> bool {
        self.secret.get().is_some()
    }
}

static SECRET_STORE: Lazy<Arc<SecretStore>> = Lazy::new(|| Arc::new(SecretStore::new()));

/// The process-wide store.
pub fn global() -> Arc<SecretStore> {
    Arc::clone(&SECRET_STORE)
}

/// Set the process-wide secret. Only the first call has any effect.
pub fn set_secret(secret: impl Into<Vec<u8>>) {
    if !SECRET_STORE.set(secret) {
        tracing::debug!("JWT secret already initialized, ignoring new value");
    }
}

/// The process-wide secret, if one was set.
pub fn get_secret() -> Option<Vec<u8>> {
    SECRET_STORE.get().map(<[u8]>::to_vec)
}

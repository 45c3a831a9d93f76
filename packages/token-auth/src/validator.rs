use crate::{error::*, extract::extract_token, models::*, secret::SecretStore};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Decides whether a gate token is acceptable.
///
/// With a secret configured the token must carry a valid HMAC signature;
/// without one only the expiration is checked. The secret is read from the
/// store on every check, so a secret set after construction is honoured.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    secrets: Arc<SecretStore>,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new(crate::secret::global())
    }
}

impl TokenValidator {
    /// Create a validator backed by the given store
    pub fn new(secrets: Arc<SecretStore>) -> Self {
        Self { secrets }
    }

    /// Check the `token` parameter of a path and query string at time `now`.
    ///
    /// A missing token yields `Absent`, which is allowed.
    pub fn check_path(&self, path_and_query: &str, now: DateTime<Utc>) -> TokenValidationResult {
        let token = extract_token(path_and_query);
        if token.is_empty() {
            return TokenValidationResult::Absent;
        }
        self.check_token(token, now)
    }

    /// Check a bare token string at time `now`.
    pub fn check_token(&self, token: &str, now: DateTime<Utc>) -> TokenValidationResult {
        if token.is_empty() {
            return TokenValidationResult::Absent;
        }

        match self.validate_token(token, now) {
            Ok(claims) => TokenValidationResult::Valid { claims },
            Err(AuthError::TokenExpired) => {
                tracing::warn!("JWT token in WebSocket path has expired");
                TokenValidationResult::Expired
            }
            Err(e) => {
                tracing::debug!("Failed to validate JWT token from path: {}", e);
                TokenValidationResult::Invalid {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// True unless the path carries a token that is invalid or expired at `now`.
    pub fn is_valid(&self, path_and_query: &str, now: DateTime<Utc>) -> bool {
        self.check_path(path_and_query, now).is_allowed()
    }

    /// [`is_valid`](Self::is_valid) against the current wall clock.
    pub fn is_valid_now(&self, path_and_query: &str) -> bool {
        self.is_valid(path_and_query, Utc::now())
    }

    /// True unless `token` is non-empty and invalid or expired right now.
    pub fn is_token_valid(&self, token: &str) -> bool {
        self.check_token(token, Utc::now()).is_allowed()
    }

    fn validate_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let claims = match self.secrets.get() {
            Some(secret) => decode_signed(token, secret)?,
            None => decode_unverified(token)?,
        };

        if claims.is_expired_at(now.timestamp()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

/// Verify the HMAC signature and decode the claims. Expiry is left to the
/// caller so that it is judged against the caller's clock.
fn decode_signed(token: &str, secret: &[u8]) -> Result<Claims> {
    let header = decode_header(token)?;
    if !HMAC_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::UnsupportedAlgorithm { alg: header.alg });
    }

    let mut validation = Validation::new(header.alg);
    validation.algorithms = HMAC_ALGORITHMS.to_vec();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// Decode the claims without checking the signature (unsafe - only used when
/// no secret is configured).
fn decode_unverified(token: &str) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidTokenFormat);
    }

    // The header still has to be well-formed and name a known algorithm,
    // though `none` is acceptable here
    let header = general_purpose::URL_SAFE_NO_PAD.decode(parts[0])?;
    let header: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&header)?;
    match header.get("alg").and_then(|alg| alg.as_str()) {
        Some("none") => {}
        Some(alg) => {
            alg.parse::<Algorithm>()?;
        }
        None => return Err(AuthError::InvalidTokenFormat),
    }

    let payload = general_purpose::URL_SAFE_NO_PAD.decode(parts[1])?;
    let claims: Claims = serde_json::from_slice(&payload)?;
    Ok(claims)
}

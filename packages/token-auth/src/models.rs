use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// Timestamps may arrive as either int or float; anything else is rejected
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64().filter(|f| fits_i64(*f)) {
                Ok(Some(f as i64))
            } else {
                Err(D::Error::custom("timestamp is not representable"))
            }
        }
        other => Err(D::Error::custom(format!(
            "expected numeric timestamp, found {}",
            other
        ))),
    }
}

fn fits_i64(f: f64) -> bool {
    f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Claims carried by a gate token.
///
/// Only `exp` is interpreted; everything else is kept untyped so that
/// unexpected shapes in other claims never affect the decision.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Claims {
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>, // Expiration time

    #[serde(flatten)]
    pub additional_claims: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// True when `exp` is present and `now` (epoch seconds) is strictly past it.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.exp, Some(exp) if now > exp)
    }

    pub fn subject(&self) -> Option<&str> {
        self.additional_claims.get("sub").and_then(|v| v.as_str())
    }
}

/// Token validation result
#[derive(Debug)]
pub enum TokenValidationResult {
    /// No token was supplied; the gate is optional so this is allowed.
    Absent,
    Valid { claims: Claims },
    Invalid { reason: String },
    Expired,
}

impl TokenValidationResult {
    /// Only `Invalid` and `Expired` block a connection.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Absent | Self::Valid { .. })
    }
}

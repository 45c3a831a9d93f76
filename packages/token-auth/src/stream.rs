use crate::validator::TokenValidator;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamSettings {
    network: Option<String>,
    #[serde(rename = "wsSettings")]
    ws_settings: Option<serde_json::Value>,
}

/// Validate the token embedded in an inbound's WebSocket path.
///
/// Only `vless` inbounds on the `ws` network are gated. Settings that cannot
/// be parsed, or that carry no path, are allowed.
pub fn validate_stream_settings(stream_settings: &[u8], protocol: &str) -> bool {
    validate_stream_settings_with(&TokenValidator::default(), stream_settings, protocol)
}

pub fn validate_stream_settings_with(
    validator: &TokenValidator,
    stream_settings: &[u8],
    protocol: &str,
) -> bool {
    if protocol != "vless" {
        return true;
    }

    let settings: StreamSettings = match serde_json::from_slice(stream_settings) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::debug!("Failed to unmarshal stream settings: {}", e);
            return true;
        }
    };

    if settings.network.as_deref() != Some("ws") {
        return true;
    }

    match settings
        .ws_settings
        .as_ref()
        .and_then(|ws| ws.get("path"))
        .and_then(|path| path.as_str())
    {
        Some(path) => validator.is_valid_now(path),
        None => true,
    }
}

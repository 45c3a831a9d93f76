use axum::http::{HeaderMap, header};

/// True when the request asks to switch to WebSocket: `Upgrade` equals
/// `websocket` and `Connection` contains `upgrade`, both case-insensitive.
///
/// Only header content is checked; the handshake key and subprotocols are
/// left to the backend.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = header_lowercase(headers, header::UPGRADE);
    let connection = header_lowercase(headers, header::CONNECTION);
    upgrade == "websocket" && connection.contains("upgrade")
}

fn header_lowercase(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default()
}

use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use token_auth::TokenValidator;

use crate::{error::HttpError, upgrade::is_websocket_upgrade};

/// Rejects WebSocket upgrade requests whose `token` query parameter is
/// present but invalid or expired. Everything else passes through untouched.
pub async fn require_valid_token(
    State(validator): State<TokenValidator>,
    request: Request,
    next: Next,
) -> Response {
    if is_websocket_upgrade(request.headers()) {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        if !validator.is_valid_now(path_and_query) {
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            tracing::warn!(
                %remote_addr,
                "JWT token validation failed or expired for connection"
            );
            return HttpError::Unauthorized.into_response();
        }
    }

    next.run(request).await
}

/// Wrap `router` so that every request goes through [`require_valid_token`].
pub fn token_gate<S>(router: Router<S>, validator: TokenValidator) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(validator, require_valid_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use token_auth::SecretStore;
    use tower::ServiceExt; // For oneshot()

    const SECRET: &[u8] = b"middleware-secret";

    fn create_test_app() -> Router {
        let store = SecretStore::new();
        store.set(SECRET);
        let validator = TokenValidator::new(Arc::new(store));

        token_gate(Router::new().route("/ws", get(|| async { "upgraded" })), validator)
    }

    fn token(exp_offset: i64, secret: &[u8]) -> String {
        encode(
            &Header::default(),
            &json!({"sub": "user123", "exp": Utc::now().timestamp() + exp_offset}),
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn upgrade_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_passes() {
        let uri = format!("/ws?token={}&type=ws", token(3600, SECRET));
        let response = create_test_app()
            .oneshot(upgrade_request(&uri))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "upgraded");
    }

    #[tokio::test]
    async fn test_missing_token_passes() {
        let response = create_test_app()
            .oneshot(upgrade_request("/ws"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let uri = format!("/ws?token={}", token(-10, SECRET));
        let response = create_test_app()
            .oneshot(upgrade_request(&uri))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "Token expired or invalid");
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let uri = format!("/ws?token={}", token(3600, b"someone-else"));
        let response = create_test_app()
            .oneshot(upgrade_request(&uri))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_upgrade_not_inspected() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/ws?token=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

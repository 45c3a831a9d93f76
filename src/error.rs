use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// Message returned to clients whose token failed validation.
pub const UNAUTHORIZED_MESSAGE: &str = "Token expired or invalid";

#[derive(Debug)]
pub enum HttpError {
    Unauthorized,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::CONTENT_TYPE, "text/plain")],
                UNAUTHORIZED_MESSAGE,
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unauthorized_response() {
        let response = HttpError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], UNAUTHORIZED_MESSAGE.as_bytes());
    }
}

//! Axum Handlers for the plain HTTP endpoints
//!
//! Load balancers and uptime checks probe these; the voice traffic itself
//! goes through the WebSocket handler in `ws`.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Readiness {
    pub status: &'static str,
}

/// Readiness probe. Always approves once the server is accepting connections.
pub async fn readiness() -> impl IntoResponse {
    Json(Readiness { status: "approved" })
}

/// Liveness probe.
pub async fn liveness() -> &'static str {
    "I am alive!"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[tokio::test]
    async fn test_readiness_body() {
        let response = readiness().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"approved"}"#);
    }

    #[tokio::test]
    async fn test_liveness_body() {
        assert_eq!(liveness().await, "I am alive!");
    }
}

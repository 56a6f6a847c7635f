//! Health check endpoint
//!
//! Fixed liveness response for orchestrators and load balancers. It does not
//! reflect upstream availability; failed polls show up in the error counter.

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
}

/// Health check handler
///
/// Always returns 200 OK while the server is accepting requests.
pub async fn handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "OK" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler_returns_ok() {
        let (status, Json(body)) = handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "OK");
    }

    #[test]
    fn test_health_response_serializes() {
        let json = serde_json::to_string(&HealthResponse { status: "OK" }).unwrap();
        assert_eq!(json, r#"{"status":"OK"}"#);
    }
}

//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::{extract::State, http::header};

use crate::error::AppError;
use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// Reads the sink's current state; safe to call while the poll loop is
/// recording.
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics encoding fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:8081/metrics
/// # HELP obloc_utilization_percent The current O'Bloc utilization
/// # TYPE obloc_utilization_percent gauge
/// obloc_utilization_percent 42
/// ```
pub async fn handler(
    State(state): State<AppState>,
) -> Result<([(header::HeaderName, &'static str); 1], String), AppError> {
    let output = state.metrics().gather().map_err(|e| {
        tracing::error!(
            error = %e,
            "Failed to gather metrics for Prometheus scraping"
        );
        AppError::Metrics(e)
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], output))
}

//! HTTP request handlers for the scrape and health endpoints

use crate::config::{Config, HEALTH_PATH};
use crate::metrics::Metrics;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// Holds the immutable configuration and the metrics sink the poll loop
/// writes to. Both are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    metrics: Metrics,
}

impl AppState {
    /// Create a new AppState from configuration and a metrics sink
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Self {
        Self { config, metrics }
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the metrics sink
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the HTTP router
///
/// - `GET <server.metrics_path>`: Prometheus text exposition
/// - `GET /healthz`: liveness
pub fn router(state: AppState) -> Router {
    let metrics_path = state.config().server.metrics_path.clone();

    Router::new()
        .route(&metrics_path, get(metrics::handler))
        .route(HEALTH_PATH, get(health::handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::str::FromStr;
    use tower::ServiceExt;

    fn create_test_state(toml: &str) -> AppState {
        let config = Config::from_str(toml).expect("should parse test config");
        let metrics = Metrics::new().expect("should create metrics");
        AppState::new(Arc::new(config), metrics)
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_appstate_is_clonable_and_shares_metrics() {
        let state = create_test_state("");
        let state2 = state.clone();

        state.metrics().record_error();
        assert_eq!(state2.metrics().error_count(), 1);
        assert_eq!(state2.config().server.metrics_path, "/metrics");
    }

    #[tokio::test]
    async fn test_router_serves_default_paths() {
        let app = router(create_test_state(""));
        assert_eq!(get_status(app.clone(), "/metrics").await, StatusCode::OK);
        assert_eq!(get_status(app.clone(), "/healthz").await, StatusCode::OK);
        assert_eq!(get_status(app, "/nope").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_router_honours_custom_metrics_path() {
        let app = router(create_test_state("[server]\nmetrics_path = \"/prom\"\n"));
        assert_eq!(get_status(app.clone(), "/prom").await, StatusCode::OK);
        assert_eq!(get_status(app, "/metrics").await, StatusCode::NOT_FOUND);
    }
}

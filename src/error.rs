//! Error types for the O'Bloc exporter
//!
//! Two families live here:
//! - [`AppError`]: process-level failures (configuration, startup, encoding).
//!   Only [`AppError::ServerStartup`] is allowed to terminate a running process.
//! - [`CycleError`]: failures of a single poll cycle. These are always absorbed
//!   by the poll loop (logged and counted) and never leave it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to start scrape endpoint on {address}: {source}")]
    ServerStartup {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// Stage of a poll cycle at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    /// Connection refused, DNS failure, timeout before a response arrived
    Network,
    /// Upstream answered with a non-2xx status
    UnexpectedStatus,
    /// Response arrived but its body could not be read to the end
    Body,
    /// Body was read but is not an integer
    Parse,
}

impl FetchStage {
    /// Label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStage::Network => "network",
            FetchStage::UnexpectedStatus => "unexpected_status",
            FetchStage::Body => "body",
            FetchStage::Parse => "parse",
        }
    }
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single fetch + parse cycle
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("failed to fetch data: {0}")]
    Network(#[source] reqwest::Error),

    #[error("unexpected status code: {code}")]
    UnexpectedStatus { code: u16 },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to parse response {body:?}: {reason}")]
    Parse { body: String, reason: String },
}

impl CycleError {
    /// The stage that produced this error
    pub fn stage(&self) -> FetchStage {
        match self {
            CycleError::Network(_) => FetchStage::Network,
            CycleError::UnexpectedStatus { .. } => FetchStage::UnexpectedStatus,
            CycleError::Body(_) => FetchStage::Body,
            CycleError::Parse { .. } => FetchStage::Parse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_server_startup_error_names_address() {
        let err = AppError::ServerStartup {
            address: "0.0.0.0:8081".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:8081"));
        assert!(err.to_string().contains("in use"));
    }

    #[test]
    fn test_app_error_response_status() {
        let err = AppError::Config("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unexpected_status_stage_and_message() {
        let err = CycleError::UnexpectedStatus { code: 503 };
        assert_eq!(err.stage(), FetchStage::UnexpectedStatus);
        assert_eq!(err.to_string(), "unexpected status code: 503");
    }

    #[test]
    fn test_parse_error_stage() {
        let err = CycleError::Parse {
            body: "abc".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(err.stage(), FetchStage::Parse);
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn test_fetch_stage_labels() {
        assert_eq!(FetchStage::Network.as_str(), "network");
        assert_eq!(FetchStage::UnexpectedStatus.as_str(), "unexpected_status");
        assert_eq!(FetchStage::Body.as_str(), "body");
        assert_eq!(FetchStage::Parse.to_string(), "parse");
    }
}

//! O'Bloc exporter - telemetry bridge for a metrics-less upstream
//!
//! Periodically polls a single numeric value from an HTTP endpoint and
//! republishes it as a Prometheus gauge, alongside counters and histograms
//! describing the polling process itself.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod parser;
pub mod poller;
pub mod telemetry;

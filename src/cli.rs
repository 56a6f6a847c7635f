//! Command-line interface for the O'Bloc exporter
//!
//! Provides argument parsing and subcommand handling for the binary.

use clap::{Parser, Subcommand};

/// Configuration file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Republishes O'Bloc utilization as Prometheus metrics
#[derive(Parser)]
#[command(name = "obloc-exporter")]
#[command(version)]
#[command(about = "Republishes O'Bloc utilization as Prometheus metrics")]
#[command(
    long_about = "Polls a single integer from an HTTP endpoint on a fixed interval and \
    exposes it as a Prometheus gauge, together with scrape duration and error metrics. \
    FETCH_URL, SCRAPE_INTERVAL and LISTEN_ADDRESS override the configuration file."
)]
pub struct Cli {
    /// Path to configuration file (optional; defaults apply when config.toml is absent)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Configuration path and whether it must exist
    ///
    /// An explicitly passed path is required; the implicit default is not.
    pub fn config_source(&self) -> (&str, bool) {
        match &self.config {
            Some(path) => (path.as_str(), true),
            None => (DEFAULT_CONFIG_PATH, false),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Run a single poll cycle against the upstream and print the value
    Probe,
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# O'Bloc Exporter Configuration
# =============================
#
# Every setting is optional. Environment variables take precedence:
#   FETCH_URL       -> upstream.url
#   SCRAPE_INTERVAL -> poll.interval
#   LISTEN_ADDRESS  -> server.listen_address

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM
# ─────────────────────────────────────────────────────────────────────────────

[upstream]
# Endpoint returning a single integer, optionally quoted (e.g. "42")
url = "https://obloc.ch/_cmsbox_backends_/obloc/guestcounter/"

# Per-request timeout in seconds (1-300)
request_timeout_seconds = 10

# ─────────────────────────────────────────────────────────────────────────────
# POLLING
# ─────────────────────────────────────────────────────────────────────────────

[poll]
# Time between polls; units ns, us, ms, s, m, h (e.g. "300s", "5m", "1.5m").
# The first poll happens one interval after startup.
interval = "300s"

# ─────────────────────────────────────────────────────────────────────────────
# SCRAPE ENDPOINT
# ─────────────────────────────────────────────────────────────────────────────

[server]
# host:port, or :port for all interfaces
listen_address = ":8081"

# Path serving Prometheus text format (/healthz is reserved for liveness)
metrics_path = "/metrics"

# Grace period for in-flight scrapes at shutdown, in seconds
drain_timeout_seconds = 5

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
"#
}

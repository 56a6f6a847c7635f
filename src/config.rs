//! Configuration management for the O'Bloc exporter
//!
//! Parses TOML configuration files, applies environment overrides
//! (`FETCH_URL`, `SCRAPE_INTERVAL`, `LISTEN_ADDRESS`) and validates the result.
//! Every field has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Environment variable overriding `upstream.url`
pub const ENV_FETCH_URL: &str = "FETCH_URL";
/// Environment variable overriding `poll.interval`
pub const ENV_SCRAPE_INTERVAL: &str = "SCRAPE_INTERVAL";
/// Environment variable overriding `server.listen_address`
pub const ENV_LISTEN_ADDRESS: &str = "LISTEN_ADDRESS";

/// Path reserved for the liveness endpoint
pub const HEALTH_PATH: &str = "/healthz";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Upstream data source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_fetch_url")]
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_fetch_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_fetch_url() -> String {
    "https://obloc.ch/_cmsbox_backends_/obloc/guestcounter/".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

/// Polling cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(300)
}

/// Scrape endpoint server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// `host:port`, or `:port` to listen on all interfaces
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            metrics_path: default_metrics_path(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

impl ServerConfig {
    /// Listen address in a form `TcpListener::bind` accepts
    ///
    /// `":8081"` becomes `"0.0.0.0:8081"`; anything else is returned as is.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    /// Bound on the graceful drain of in-flight scrapes at shutdown
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

fn default_listen_address() -> String {
    ":8081".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_drain_timeout() -> u64 {
    5
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a duration string such as `300s`, `5m`, `1m30s`, `1.5m` or `500us`
///
/// Follows Go's `time.ParseDuration` grammar for non-negative values: a sequence
/// of decimal numbers, each with an optional fraction and a unit suffix.
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Every number needs a unit;
/// a bare `300` is rejected, only `0` may stand alone.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let overflow = || format!("duration '{}' is too large", input);

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let whole_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let whole = &rest[..whole_len];
        rest = &rest[whole_len..];

        let fraction = match rest.strip_prefix('.') {
            Some(after_dot) => {
                let len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                rest = &after_dot[len..];
                &after_dot[..len]
            }
            None => "",
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(format!("expected a number in duration '{}'", input));
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration '{}'", input)),
            other => {
                return Err(format!(
                    "unknown unit '{}' in duration '{}' (expected ns, us, ms, s, m or h)",
                    other, input
                ));
            }
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut part = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        if !fraction.is_empty() {
            // Digits past nanosecond precision of an hour cannot change the result
            let digits = &fraction[..fraction.len().min(18)];
            let numerator: u128 = digits.parse().map_err(|_| overflow())?;
            let scale = 10u128.pow(digits.len() as u32);
            part = part
                .checked_add(numerator * unit_nanos / scale)
                .ok_or_else(overflow)?;
        }

        total_nanos = total_nanos.checked_add(part).ok_or_else(overflow)?;
    }

    let nanos = u64::try_from(total_nanos).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a duration in the format accepted by [`parse_duration`]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        format!("{}ns", duration.as_nanos())
    } else if duration.subsec_millis() != 0 || duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

/// An environment override that was present but could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

/// Result of [`Config::load`]
///
/// Loading happens before logging is initialised, so anything worth reporting
/// is carried here and emitted by [`LoadedConfig::log_notices`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub file_found: bool,
    pub ignored_overrides: Vec<IgnoredOverride>,
}

impl LoadedConfig {
    /// Log what happened while loading; call once tracing is initialised
    pub fn log_notices(&self, path: &str) {
        if !self.file_found {
            tracing::debug!(path = %path, "No configuration file found, using defaults");
        }

        for ignored in &self.ignored_overrides {
            tracing::warn!(
                variable = ignored.variable,
                value = %ignored.value,
                reason = %ignored.reason,
                interval = %format_duration(self.config.poll.interval),
                "Ignoring unparseable scrape interval override"
            );
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();
        let config = Self::parse_file(path.as_ref())?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load the effective process configuration
    ///
    /// Reads `path` if it exists (or fails if `required` and it doesn't), then
    /// applies environment overrides from `lookup` and validates the result.
    pub fn load<P, F>(path: P, required: bool, lookup: F) -> AppResult<LoadedConfig>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let path_display = path.display().to_string();

        let file_found = path.exists();
        let mut config = if file_found || required {
            Self::parse_file(path)?
        } else {
            Self::default()
        };

        let ignored_overrides = config.apply_env_overrides(lookup);

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(LoadedConfig {
            config,
            file_found,
            ignored_overrides,
        })
    }

    fn parse_file(path: &Path) -> AppResult<Self> {
        let path_display = path.display().to_string();

        let content =
            std::fs::read_to_string(path).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display,
            source,
        })
    }

    /// Apply `FETCH_URL`, `SCRAPE_INTERVAL` and `LISTEN_ADDRESS` overrides
    ///
    /// `lookup` abstracts the environment so callers can inject values.
    /// An unparseable interval keeps the previous value and is returned as
    /// an [`IgnoredOverride`].
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<IgnoredOverride>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();

        if let Some(url) = lookup(ENV_FETCH_URL) {
            self.upstream.url = url;
        }

        if let Some(raw) = lookup(ENV_SCRAPE_INTERVAL) {
            match parse_duration(&raw) {
                Ok(interval) => self.poll.interval = interval,
                Err(reason) => ignored.push(IgnoredOverride {
                    variable: ENV_SCRAPE_INTERVAL,
                    value: raw,
                    reason,
                }),
            }
        }

        if let Some(address) = lookup(ENV_LISTEN_ADDRESS) {
            self.server.listen_address = address;
        }

        ignored
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        let url = self.upstream.url.trim();
        if url.is_empty() {
            return Err(AppError::Config("upstream.url must not be empty".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "upstream.url '{}' must start with 'http://' or 'https://'",
                url
            )));
        }

        let timeout = self.upstream.request_timeout_seconds;
        if timeout == 0 || timeout > 300 {
            return Err(AppError::Config(format!(
                "upstream.request_timeout_seconds must be in 1..=300, got {}",
                timeout
            )));
        }

        if self.poll.interval.is_zero() {
            return Err(AppError::Config(
                "poll.interval must be greater than zero".to_string(),
            ));
        }

        if self.server.drain_timeout_seconds == 0 {
            return Err(AppError::Config(
                "server.drain_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let path = &self.server.metrics_path;
        if !path.starts_with('/') || path.len() < 2 {
            return Err(AppError::Config(format!(
                "server.metrics_path '{}' must start with '/' and name a path",
                path
            )));
        }
        if path == HEALTH_PATH {
            return Err(AppError::Config(format!(
                "server.metrics_path must not be '{}' (reserved for health checks)",
                HEALTH_PATH
            )));
        }

        let bind = self.server.bind_address();
        let valid_address = bind
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid_address {
            return Err(AppError::Config(format!(
                "server.listen_address '{}' must be 'host:port' or ':port'",
                self.server.listen_address
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

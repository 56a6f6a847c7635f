//! Exporter lifecycle
//!
//! [`Exporter::start`] binds the scrape endpoint, then runs the poll loop and
//! the HTTP server as two background tasks. [`RunningExporter::shutdown`]
//! stops the poll loop through its cancellation token and drains the server
//! with a bounded grace period. The two stop mechanisms are independent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::fetcher::{Fetch, HttpFetcher};
use crate::handlers::{AppState, router};
use crate::metrics::Metrics;
use crate::poller::{PollHandle, PollLoop};

/// How a shutdown request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Poll loop stopped and in-flight scrapes drained within the bound
    Drained,
    /// Drain exceeded the bound; the server task was aborted
    DrainTimedOut,
    /// A previous call already performed the shutdown
    AlreadyShutDown,
}

/// Components of the exporter, ready to start
pub struct Exporter {
    config: Arc<Config>,
    metrics: Metrics,
    poll: PollLoop,
}

impl Exporter {
    /// Assemble an exporter polling through `fetcher`
    ///
    /// # Errors
    ///
    /// Returns an error if the poll loop rejects the configuration.
    pub fn new(config: Arc<Config>, metrics: Metrics, fetcher: Arc<dyn Fetch>) -> AppResult<Self> {
        let poll = PollLoop::new(fetcher, metrics.clone(), config.poll.interval)?;
        Ok(Self {
            config,
            metrics,
            poll,
        })
    }

    /// Assemble an exporter polling the configured upstream over HTTP
    pub fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let metrics = Metrics::new()?;
        let fetcher = Arc::new(HttpFetcher::from_config(&config.upstream)?);
        Self::new(config, metrics, fetcher)
    }

    /// Metrics sink shared by the poll loop and the scrape endpoint
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Bind the scrape endpoint and start both background tasks
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ServerStartup`] if the listen address cannot be
    /// bound. Nothing is spawned in that case.
    pub async fn start(self) -> AppResult<RunningExporter> {
        let address = self.config.server.bind_address();
        let listener =
            TcpListener::bind(&address)
                .await
                .map_err(|source| AppError::ServerStartup {
                    address: address.clone(),
                    source,
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AppError::ServerStartup {
                address: address.clone(),
                source,
            })?;

        let poll_cancel = CancellationToken::new();
        let poll = self.poll.spawn(poll_cancel.clone());

        let server_shutdown = CancellationToken::new();
        let app = router(AppState::new(self.config.clone(), self.metrics.clone()));
        let graceful = server_shutdown.clone();
        let server = tokio::spawn(async move {
            tracing::info!(address = %local_addr, "Starting server");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        tracing::info!(
            address = %local_addr,
            metrics_path = %self.config.server.metrics_path,
            upstream = %self.config.upstream.url,
            "Exporter started"
        );

        Ok(RunningExporter {
            local_addr,
            drain_timeout: self.config.server.drain_timeout(),
            metrics: self.metrics,
            poll_cancel,
            server_shutdown,
            tasks: Mutex::new(Some(Tasks { poll, server })),
        })
    }
}

struct Tasks {
    poll: PollHandle,
    server: JoinHandle<std::io::Result<()>>,
}

/// A started exporter
pub struct RunningExporter {
    local_addr: SocketAddr,
    drain_timeout: Duration,
    metrics: Metrics,
    poll_cancel: CancellationToken,
    server_shutdown: CancellationToken,
    tasks: Mutex<Option<Tasks>>,
}

impl RunningExporter {
    /// Address the scrape endpoint is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Metrics sink shared by the poll loop and the scrape endpoint
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop polling and drain the scrape endpoint
    ///
    /// Only the first call performs the sequence; later (or concurrent) calls
    /// wait for it and return [`ShutdownOutcome::AlreadyShutDown`]. A drain
    /// that exceeds the configured bound is logged and the server task is
    /// aborted; it never fails the caller.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        let mut guard = self.tasks.lock().await;
        let Some(Tasks { poll, mut server }) = guard.take() else {
            tracing::debug!("Shutdown already performed, ignoring request");
            return ShutdownOutcome::AlreadyShutDown;
        };

        tracing::info!("Shutting down server...");

        self.poll_cancel.cancel();
        self.server_shutdown.cancel();

        let drain_timeout = self.drain_timeout;
        let outcome = match tokio::time::timeout(drain_timeout, &mut server).await {
            Ok(Ok(Ok(()))) => ShutdownOutcome::Drained,
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Server shutdown error");
                ShutdownOutcome::Drained
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Server task terminated abnormally");
                ShutdownOutcome::Drained
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = drain_timeout.as_secs_f64(),
                    "Server shutdown error: graceful drain exceeded timeout, aborting"
                );
                server.abort();
                ShutdownOutcome::DrainTimedOut
            }
        };

        // An in-flight cycle is allowed to finish before the loop exits
        poll.stopped().await;

        tracing::info!("Server stopped");
        outcome
    }
}

/// Resolve when the process receives Ctrl-C or SIGTERM
///
/// If a handler cannot be installed the failure is logged and that branch
/// never resolves.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CycleError;
    use async_trait::async_trait;
    use std::str::FromStr;

    struct FixedFetcher;

    #[async_trait]
    impl Fetch for FixedFetcher {
        async fn fetch(&self) -> Result<Vec<u8>, CycleError> {
            Ok(b"3".to_vec())
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(
            Config::from_str(
                r#"
[server]
listen_address = "127.0.0.1:0"
drain_timeout_seconds = 1
"#,
            )
            .expect("should parse test config"),
        )
    }

    fn exporter(config: Arc<Config>) -> Exporter {
        let metrics = Metrics::new().expect("metrics");
        Exporter::new(config, metrics, Arc::new(FixedFetcher)).expect("should build exporter")
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let running = exporter(test_config()).start().await.expect("should start");
        assert_ne!(running.local_addr().port(), 0);
        assert_eq!(running.shutdown().await, ShutdownOutcome::Drained);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let running = exporter(test_config()).start().await.expect("should start");
        assert_eq!(running.shutdown().await, ShutdownOutcome::Drained);
        assert_eq!(running.shutdown().await, ShutdownOutcome::AlreadyShutDown);
        assert_eq!(running.shutdown().await, ShutdownOutcome::AlreadyShutDown);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_runs_once() {
        let running = exporter(test_config()).start().await.expect("should start");
        let (a, b) = tokio::join!(running.shutdown(), running.shutdown());
        let mut outcomes = [a, b];
        outcomes.sort_by_key(|o| *o == ShutdownOutcome::AlreadyShutDown);
        assert_eq!(
            outcomes,
            [ShutdownOutcome::Drained, ShutdownOutcome::AlreadyShutDown]
        );
    }

    #[tokio::test]
    async fn test_stalled_connection_hits_drain_timeout() {
        use tokio::io::AsyncWriteExt;

        let running = exporter(test_config()).start().await.expect("should start");

        // Request head without the terminating blank line keeps the connection busy
        let mut stalled = tokio::net::TcpStream::connect(running.local_addr())
            .await
            .expect("connect");
        stalled
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: x\r\n")
            .await
            .expect("write partial request");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        let outcome = running.shutdown().await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ShutdownOutcome::DrainTimedOut);
        assert!(
            elapsed >= Duration::from_millis(950),
            "returned before the drain bound: {:?}",
            elapsed
        );
        assert!(
            elapsed < Duration::from_secs(3),
            "drain was not bounded: {:?}",
            elapsed
        );
        assert_eq!(running.shutdown().await, ShutdownOutcome::AlreadyShutDown);
        drop(stalled);
    }

    #[tokio::test]
    async fn test_bind_failure_is_server_startup_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = occupied.local_addr().expect("addr").port();

        let mut config = (*test_config()).clone();
        config.server.listen_address = format!("127.0.0.1:{}", port);

        let result = exporter(Arc::new(config)).start().await;
        assert!(matches!(result, Err(AppError::ServerStartup { .. })));
    }

    #[test]
    fn test_zero_interval_rejected_before_start() {
        let mut config = (*test_config()).clone();
        config.poll.interval = Duration::ZERO;
        let metrics = Metrics::new().expect("metrics");
        let result = Exporter::new(Arc::new(config), metrics, Arc::new(FixedFetcher));
        assert!(result.is_err());
    }
}

//! O'Bloc exporter binary
//!
//! Polls the upstream counter in the background and serves the resulting
//! metrics until SIGINT/SIGTERM.

use clap::Parser;
use obloc_exporter::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    fetcher::HttpFetcher,
    lifecycle::{Exporter, shutdown_signal},
    metrics::Metrics,
    poller::{CycleOutcome, PollLoop},
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let (config_path, required) = cli.config_source();
    let loaded = Config::load(config_path, required, |key| std::env::var(key).ok())?;

    telemetry::init(&loaded.config.observability.log_level);
    loaded.log_notices(config_path);
    let config = Arc::new(loaded.config);

    if matches!(cli.command, Some(Command::Probe)) {
        return probe(config).await;
    }

    tracing::info!(
        upstream = %config.upstream.url,
        interval_secs = config.poll.interval.as_secs_f64(),
        listen_address = %config.server.listen_address,
        "Starting O'Bloc exporter"
    );

    let running = Exporter::from_config(config)?.start().await?;

    shutdown_signal().await;
    running.shutdown().await;

    Ok(())
}

/// Run one cycle and print its value
async fn probe(config: Arc<Config>) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Metrics::new()?;
    let fetcher = Arc::new(HttpFetcher::from_config(&config.upstream)?);
    let poll = PollLoop::new(fetcher, metrics, config.poll.interval)?;

    match poll.run_cycle().await {
        CycleOutcome::Success { value } => {
            println!("{}", value);
            Ok(())
        }
        CycleOutcome::Failure { cause, .. } => Err(cause.into()),
    }
}

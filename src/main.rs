mod api;
mod check;
mod cli;
mod config;
mod expiry;
mod exporter;
mod metrics;
mod query;
mod transport;
mod trust;

#[cfg(test)]
mod proptest_helpers;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::Config;
use exporter::{Exporter, Settings};
use metrics::ExporterStats;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::TcpExchange;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_file(&cli.config)
        .context(format!("Failed to load config from {}", cli.config.display()))?;

    // Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dnssec_exporter={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dnssec-exporter");
    tracing::info!("Configuration loaded from: {}", cli.config.display());

    // Validate configuration; secrets are installed here, before any cycle runs
    let registry = config
        .build_registry()
        .context("Configuration validation failed")?;

    let settings = Settings {
        resolvers: cli.resolvers(),
        timeout: cli.timeout,
    };

    for resolver in &settings.resolvers {
        transport::parse_resolver(resolver)
            .with_context(|| format!("Invalid resolver {}", resolver))?;
    }

    tracing::info!(
        "Monitoring {} records on {} resolvers (primary {}), timeout {:?}",
        registry.len(),
        settings.resolvers.len(),
        settings.resolvers.first().map(String::as_str).unwrap_or("-"),
        settings.timeout
    );

    let exchange = TcpExchange::new(settings.timeout);
    let exporter = Arc::new(
        Exporter::new(settings, Arc::new(registry), exchange)
            .context("Failed to create exporter")?,
    );

    // Spawn signal handler task
    let stats = exporter.stats();
    tokio::spawn(async move {
        handle_signals(stats).await;
    });

    let app = api::create_router(exporter);
    let listener = tokio::net::TcpListener::bind(cli.listen_address)
        .await
        .context(format!("Failed to bind to {}", cli.listen_address))?;

    tracing::info!("Metrics endpoint listening on http://{}/metrics", cli.listen_address);

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}

async fn handle_signals(stats: Arc<ExporterStats>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigusr1 = match signal(SignalKind::user_defined1()) {
            Ok(sigusr1) => sigusr1,
            Err(e) => {
                tracing::error!("Failed to register SIGUSR1 handler: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigusr1.recv() => {
                    tracing::info!("Received SIGUSR1, logging stats...");
                    stats.log_summary();
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down...");
                    stats.log_summary();
                    std::process::exit(0);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down...");
        stats.log_summary();
        std::process::exit(0);
    }
}

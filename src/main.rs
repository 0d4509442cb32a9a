use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use fuel_watcher::AppConfig;
use fuel_watcher::notifier::Notifier;
use fuel_watcher::pipeline::PricePipeline;
use fuel_watcher::plugins::SmtpMailer;
use fuel_watcher::scheduler::{PriceScheduler, ShutdownStatus, SystemClock};
use fuel_watcher::scraper::ChromeLauncher;
use fuel_watcher::session::ScrapeSession;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; the guard flushes buffered lines on exit
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fuel_watcher=info")),
        )
        .with_writer(writer)
        .init();

    info!("Starting Fuel Watcher...");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let window = config.schedule.window()?;

    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Metrics exporter listening");
    }

    let clock = Arc::new(SystemClock);
    let mailer = SmtpMailer::new(&config.smtp).context("Failed to configure SMTP transport")?;
    if !mailer.test_connection().await {
        tracing::warn!(host = %config.smtp.host, "SMTP server not reachable, alerts may not be delivered");
    }
    let session = ScrapeSession::new(
        Arc::new(ChromeLauncher::new(&config.session)),
        config.credentials.clone(),
        config.session.clone(),
        config.site.clone(),
    );
    let pipeline = PricePipeline::new(
        Arc::new(session),
        config.thresholds.clone(),
        Notifier::new(Arc::new(mailer)),
        clock.clone(),
    );

    info!(
        window_start = %window.start(),
        window_end = %window.end(),
        recipients = config.thresholds.recipients.len(),
        "Configuration loaded"
    );

    let scheduler = PriceScheduler::new(Arc::new(pipeline), window, clock).start();

    shutdown_signal().await?;

    match scheduler
        .shutdown(config.schedule.shutdown_grace(), config.schedule.shutdown_force())
        .await
    {
        ShutdownStatus::Graceful => info!("Shut down cleanly"),
        ShutdownStatus::Forced => info!("Shut down after aborting the in-flight tick"),
        ShutdownStatus::Unclean => tracing::warn!("Shutdown did not complete cleanly"),
    }

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => result?,
        result = terminate => result?,
    }

    info!("Received shutdown signal, stopping scheduler");
    Ok(())
}

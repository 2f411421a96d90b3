//! Venue telemetry agent
//!
//! Periodically reads venue sensors (mock, local HTTP API, or shared JSON
//! file), normalizes them into the canonical message and publishes it over
//! MQTT with mutual TLS.
//!
//! Module structure:
//! - `domain/` - Canonical types and error taxonomy
//! - `io/` - Sensor sources and the delivery channel
//! - `services/` - Normalizer, assembler and the publish loop
//! - `infra/` - Config, metrics, logging

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use venue_telemetry::domain::error::StartupError;
use venue_telemetry::infra::{logging, Config, Metrics};
use venue_telemetry::io::{build_source, MqttChannel};
use venue_telemetry::services::{LoopSettings, PublishLoop};

/// Venue telemetry agent - publishes venue sensor readings to the cloud
#[derive(Parser, Debug)]
#[command(name = "venue-telemetry", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

fn report_fatal(config: &Config, err: &StartupError) {
    error!(error = %err, "fatal_startup_error");
    for step in config.troubleshooting(err) {
        error!("{}", step);
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    logging::init(config.log_format());

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        profile = %env!("BUILD_PROFILE"),
        "venue_telemetry_starting"
    );
    info!(
        config_file = %config.config_file(),
        venue_id = %config.venue_id(),
        location_id = %config.location_id(),
        device_id = %config.device_id(),
        mqtt_endpoint = %format!("{}:{}", config.mqtt_host(), config.mqtt_port()),
        mqtt_topic = %config.mqtt_topic(),
        source = %config.source_kind().as_str(),
        interval_secs = %config.publish_interval().as_secs(),
        capacity = %config.capacity(),
        "config_loaded"
    );

    if let Err(e) = config.validate() {
        report_fatal(&config, &StartupError::from(e));
        return ExitCode::FAILURE;
    }

    let source = match build_source(&config) {
        Ok(source) => source,
        Err(e) => {
            report_fatal(&config, &StartupError::from(e));
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Periodic metrics summary
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let reporter_metrics = metrics.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(metrics_interval);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter_metrics.report().log(),
                    _ = reporter_shutdown.changed() => return,
                }
            }
        });
    }

    // Handle shutdown on Ctrl+C / SIGTERM
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let channel = MqttChannel::new(config.mqtt_settings());
    let mut publish_loop =
        PublishLoop::new(channel, source, LoopSettings::from_config(&config), metrics.clone());

    match publish_loop.run(shutdown_rx).await {
        Ok(()) => {
            metrics.totals().log();
            info!("venue_telemetry shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_fatal(&config, &StartupError::from(e));
            ExitCode::FAILURE
        }
    }
}

//! Speedtest Exporter - periodic bandwidth measurements as Prometheus metrics
//!
//! Runs `speedtest-cli` on a fixed interval and serves the latest results on
//! `/metrics`, with a liveness check on `/health`.

mod config;
mod http;
mod metrics;
mod probe;
mod scheduler;
mod shutdown;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::BoolishValueParser;
use config::{Config, Overrides};
use metrics::MetricsSink;
use payload::{
    ENV_LISTEN_ADDRESS, ENV_LOG_LEVEL, ENV_NO_DOWNLOAD, ENV_NO_UPLOAD, ENV_PORT,
    ENV_SCRAPE_INTERVAL, ENV_SPEEDTEST_BIN, ENV_SPEEDTEST_TIMEOUT, ENV_TEST_SERVER,
    ENV_USE_FALLBACK_TEST,
};
use probe::{ProbeConfig, SpeedtestCli};
use scheduler::{ScheduleSettings, Scheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speedtest-exporter")]
#[command(version)]
#[command(about = "Periodic speedtest runs exported as Prometheus metrics", long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single measurement cycle, print the metrics and exit
    #[arg(long)]
    once: bool,

    /// Pin the measurement to this server id
    #[arg(long, env = ENV_TEST_SERVER)]
    test_server: Option<String>,

    /// Seconds between the end of one cycle and the start of the next
    #[arg(long, env = ENV_SCRAPE_INTERVAL, allow_negative_numbers = true)]
    scrape_interval: Option<i64>,

    /// Maximum seconds a single speedtest run may take
    #[arg(long, env = ENV_SPEEDTEST_TIMEOUT)]
    timeout: Option<u64>,

    /// Skip the download leg
    #[arg(long, env = ENV_NO_DOWNLOAD, value_parser = BoolishValueParser::new())]
    no_download: Option<bool>,

    /// Skip the upload leg
    #[arg(long, env = ENV_NO_UPLOAD, value_parser = BoolishValueParser::new())]
    no_upload: Option<bool>,

    /// Retry without the pinned server when the pinned run fails
    #[arg(long, env = ENV_USE_FALLBACK_TEST, value_parser = BoolishValueParser::new())]
    use_fallback: Option<bool>,

    /// HTTP listen port
    #[arg(short, long, env = ENV_PORT)]
    port: Option<u16>,

    /// HTTP listen address
    #[arg(long, env = ENV_LISTEN_ADDRESS)]
    listen_address: Option<String>,

    /// Path of the speedtest binary
    #[arg(long, env = ENV_SPEEDTEST_BIN)]
    speedtest_bin: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = ENV_LOG_LEVEL)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            target_server: self.test_server.clone(),
            scrape_interval_secs: self.scrape_interval,
            timeout_secs: self.timeout,
            no_download: self.no_download,
            no_upload: self.no_upload,
            use_fallback: self.use_fallback,
            port: self.port,
            listen_address: self.listen_address.clone(),
            binary: self.speedtest_bin.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::resolve(args.config.as_deref(), args.overrides())
        .context("Invalid configuration")?;

    init_tracing(&config.logging.level)?;

    info!("Speedtest Exporter v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }
    info!(
        "Test server: {}",
        config.probe.target_server.as_deref().unwrap_or("auto")
    );
    info!("Scrape interval: {}s", config.general.scrape_interval_secs);
    info!("Speedtest timeout: {}s", config.probe.timeout_secs);
    info!(
        "Download: {}, upload: {}, fallback: {}",
        !config.probe.no_download, !config.probe.no_upload, config.probe.use_fallback
    );

    let sink = Arc::new(MetricsSink::new().context("Failed to create metrics registry")?);
    let cancel = CancellationToken::new();

    let settings = ScheduleSettings {
        primary: ProbeConfig::from_settings(&config.probe, config.probe_timeout()),
        use_fallback: config.probe.use_fallback,
        interval: config.scrape_interval(),
    };
    let mut scheduler = Scheduler::new(
        SpeedtestCli::new(config.probe.binary.clone()),
        sink.clone(),
        settings,
        cancel.clone(),
    );

    if args.once {
        let report = scheduler.run_cycle().await;
        info!("Cycle finished after {} speedtest run(s)", report.invocations());
        print!("{}", sink.render().await?);

        return Ok(if report.succeeded {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let listener = http::bind(config.listen_addr()?).await?;
    let server_cancel = CancellationToken::new();
    let server = tokio::spawn(http::serve(listener, sink.clone(), server_cancel.clone()));

    let signals = shutdown::spawn_signal_handler(cancel.clone());

    // Runs until a signal cancels the token and the current cycle is done
    scheduler.run().await;

    server_cancel.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server failed: {}", e),
        Err(e) => error!("HTTP server task panicked: {}", e),
    }
    // The handler returns on its own once the token is cancelled
    let _ = signals.await;

    info!("Shutdown complete (scheduler {:?})", scheduler.state());
    Ok(ExitCode::SUCCESS)
}

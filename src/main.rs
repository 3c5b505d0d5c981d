//! smartctl exporter
//!
//! Prometheus exporter for S.M.A.R.T. data of physical and RAID-enclosed
//! storage devices.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      smartctl_exporter                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │  │  Discovery   │───▶│  Inventory   │◀───│  Collector   │    │
//! │  │  (rescans)   │    │   (mutex)    │    │  (scrapes)   │    │
//! │  └──────────────┘    └──────────────┘    └──────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smartctl_exporter::collector::{CollectorConfig, DeviceCollector};
use smartctl_exporter::config::{parse_duration, ExporterConfig, ServerConfig};
use smartctl_exporter::hardware::{restrict, ControllerExpander, Discovery, DiscoveryConfig};
use smartctl_exporter::inventory::{Inventory, RescanScheduler};
use smartctl_exporter::metrics::{ExporterMetrics, SmartctlTranslator};
use smartctl_exporter::server::MetricsServer;
use smartctl_exporter::smartctl::{CachingReader, DiagnosticReader, FixtureReader, Smartctl, SmartctlConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Prometheus Exporter for S.M.A.R.T. devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The path to the smartctl binary
    #[arg(long = "smartctl.path", env = "SMARTCTL_PATH", default_value = "/usr/sbin/smartctl")]
    smartctl_path: PathBuf,

    /// The interval between smartctl polls
    #[arg(long = "smartctl.interval", env = "SMARTCTL_INTERVAL", default_value = "60s", value_parser = duration_arg)]
    smartctl_interval: Duration,

    /// The interval between rescanning for new/disappeared devices. If the
    /// interval is smaller than 1s no rescanning takes place. If any devices
    /// are configured with smartctl.device also no rescanning takes place.
    #[arg(long = "smartctl.rescan", env = "SMARTCTL_RESCAN", default_value = "10m", value_parser = duration_arg)]
    smartctl_rescan: Duration,

    /// The device to monitor (repeatable)
    #[arg(long = "smartctl.device")]
    smartctl_device: Vec<String>,

    /// Regexp of devices to exclude from automatic scanning (mutually exclusive to device-include)
    #[arg(long = "smartctl.device-exclude", env = "SMARTCTL_DEVICE_EXCLUDE", default_value = "")]
    smartctl_device_exclude: String,

    /// Regexp of devices to include in automatic scanning (mutually exclusive to device-exclude)
    #[arg(long = "smartctl.device-include", env = "SMARTCTL_DEVICE_INCLUDE", default_value = "")]
    smartctl_device_include: String,

    /// Upper bound for one device read; 0s waits forever
    #[arg(long = "smartctl.read-timeout", env = "SMARTCTL_READ_TIMEOUT", default_value = "0s", value_parser = duration_arg)]
    smartctl_read_timeout: Duration,

    /// Serve canned smartctl JSON instead of running smartctl
    #[arg(long = "smartctl.fake-data", hide = true)]
    smartctl_fake_data: bool,

    /// Directory holding the canned smartctl JSON
    #[arg(long = "smartctl.fake-data-dir", hide = true, default_value = "debug")]
    smartctl_fake_data_dir: PathBuf,

    /// The path to the cciss_vol_status binary
    #[arg(long = "ccissvolstatus.path", env = "CCISSVOLSTATUS_PATH", default_value = "/usr/bin/cciss_vol_status")]
    ccissvolstatus_path: PathBuf,

    /// Address on which to expose metrics
    #[arg(long = "web.listen-address", env = "WEB_LISTEN_ADDRESS", default_value = "0.0.0.0:9633")]
    web_listen_address: SocketAddr,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", env = "WEB_TELEMETRY_PATH", default_value = "/metrics")]
    web_telemetry_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log.level", env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long = "log.format", env = "LOG_FORMAT", default_value = "logfmt", value_parser = ["logfmt", "json"])]
    log_format: String,
}

fn duration_arg(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

fn non_empty(raw: &str) -> Option<String> {
    Some(raw.to_string()).filter(|s| !s.is_empty())
}

impl Args {
    fn into_config(self) -> ExporterConfig {
        ExporterConfig {
            smartctl: SmartctlConfig {
                path: self.smartctl_path,
            },
            poll_interval: self.smartctl_interval,
            rescan_interval: self.smartctl_rescan,
            explicit_devices: self.smartctl_device,
            discovery: DiscoveryConfig {
                exclude: non_empty(&self.smartctl_device_exclude),
                include: non_empty(&self.smartctl_device_include),
                ..Default::default()
            },
            collector: CollectorConfig {
                read_timeout: Some(self.smartctl_read_timeout).filter(|t| !t.is_zero()),
            },
            fake_data_dir: self.smartctl_fake_data.then_some(self.smartctl_fake_data_dir),
            cciss_vol_status: self.ccissvolstatus_path,
            server: ServerConfig {
                listen_address: self.web_listen_address,
                telemetry_path: self.web_telemetry_path,
            },
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting smartctl_exporter");
    info!("  smartctl path: {}", config.smartctl.path.display());
    info!("  Poll interval: {:?}", config.poll_interval);
    info!("  Rescan interval: {:?}", config.rescan_interval);

    // Reader stack: smartctl (or fixtures) behind the polling cache
    let source: Arc<dyn DiagnosticReader> = match &config.fake_data_dir {
        Some(dir) => {
            warn!("Serving fake data from {}", dir.display());
            Arc::new(FixtureReader::new(dir))
        }
        None => Arc::new(Smartctl::new(config.smartctl.clone())),
    };
    let reader: Arc<dyn DiagnosticReader> = Arc::new(CachingReader::new(source, config.poll_interval));

    let discovery = Discovery::new(config.discovery.clone(), reader.clone())
        .context("invalid device filter")?
        .with_expander(Arc::new(ControllerExpander::new(&config.cciss_vol_status)));
    let discovery = Arc::new(discovery);

    let mut devices = discovery.scan().await;
    info!(count = devices.len(), "Number of devices found");
    if !config.explicit_devices.is_empty() {
        info!(devices = %config.explicit_devices.join(", "), "Devices specified");
        devices = restrict(devices, &config.explicit_devices);
        info!(count = devices.len(), "Devices filtered");
    }

    let inventory = Arc::new(Inventory::new(devices));
    let metrics = ExporterMetrics::new().context("failed to register exporter metrics")?;
    let shutdown = CancellationToken::new();

    if config.rescan_enabled() {
        info!("Start background scan process");
        let scheduler = RescanScheduler::new(discovery.clone(), inventory.clone(), config.rescan_interval)
            .with_metrics(metrics.clone());
        tokio::spawn(scheduler.run(shutdown.clone()));
    } else if !config.explicit_devices.is_empty() {
        info!("Devices configured explicitly, background rescan disabled");
    } else {
        info!("Rescan interval below 1s, background rescan disabled");
    }

    let collector = DeviceCollector::new(
        config.collector.clone(),
        inventory,
        reader,
        Arc::new(SmartctlTranslator),
    )
    .with_metrics(metrics.clone());

    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    MetricsServer::new(config.server.clone(), Arc::new(collector), metrics)
        .run(shutdown)
        .await
        .context("metrics server failed")?;

    info!("Exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(log_level: &str, log_format: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Shutdown
// =============================================================================

async fn shutdown_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

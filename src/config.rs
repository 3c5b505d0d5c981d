//! Exporter configuration
//!
//! The validated form of the command line. Flag parsing itself lives in
//! `main.rs`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::CollectorConfig;
use crate::error::{Error, Result};
use crate::hardware::{DeviceFilter, DiscoveryConfig};
use crate::inventory::RescanScheduler;
use crate::smartctl::SmartctlConfig;

/// HTTP surface settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the metrics server binds to
    pub listen_address: SocketAddr,
    /// Path serving the metrics
    pub telemetry_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9633)),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

/// Complete exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// smartctl binary
    pub smartctl: SmartctlConfig,

    /// How long a device reading is reused
    pub poll_interval: Duration,

    /// Interval between background rescans
    pub rescan_interval: Duration,

    /// Operator-supplied device allowlist (substring match)
    pub explicit_devices: Vec<String>,

    /// Discovery settings (filter patterns, raid pass arguments)
    pub discovery: DiscoveryConfig,

    /// Collection settings
    pub collector: CollectorConfig,

    /// Serve canned JSON from this directory instead of running smartctl
    pub fake_data_dir: Option<PathBuf>,

    /// cciss_vol_status binary used to expand HP Smart Array controllers
    pub cciss_vol_status: PathBuf,

    /// HTTP settings
    pub server: ServerConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            smartctl: SmartctlConfig::default(),
            poll_interval: Duration::from_secs(60),
            rescan_interval: Duration::from_secs(600),
            explicit_devices: Vec::new(),
            discovery: DiscoveryConfig::default(),
            collector: CollectorConfig::default(),
            fake_data_dir: None,
            cciss_vol_status: PathBuf::from("/usr/bin/cciss_vol_status"),
            server: ServerConfig::default(),
        }
    }
}

impl ExporterConfig {
    /// Reject configurations the exporter cannot run with.
    pub fn validate(&self) -> Result<()> {
        DeviceFilter::new(
            self.discovery.exclude.as_deref(),
            self.discovery.include.as_deref(),
        )?;

        if !self.server.telemetry_path.starts_with('/') {
            return Err(Error::Config(format!(
                "telemetry path must start with '/': {}",
                self.server.telemetry_path
            )));
        }
        Ok(())
    }

    /// Whether the background rescan should run.
    ///
    /// Off when the interval is below one second, and off when devices were
    /// listed explicitly: a rescan would drop the operator's allowlist.
    pub fn rescan_enabled(&self) -> bool {
        self.explicit_devices.is_empty() && RescanScheduler::enabled(self.rescan_interval)
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse durations such as `90s`, `10m`, `1h30m`, `1.5h` or `250ms`.
///
/// A bare `0` is accepted as zero.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(Error::DurationParse("empty duration".to_string()));
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(Error::DurationParse(format!("expected number in '{}'", input)));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in '{}'", input)))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => {
                return Err(Error::DurationParse(format!("missing unit in '{}'", input)));
            }
            unit => {
                return Err(Error::DurationParse(format!(
                    "unknown unit '{}' in '{}'",
                    unit, input
                )));
            }
        };
        total += value * seconds_per_unit;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total)
        .map_err(|e| Error::DurationParse(format!("'{}': {}", input, e)))
}

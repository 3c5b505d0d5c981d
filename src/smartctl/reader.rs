//! smartctl process reader

use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{parse_scan, well_formed, DiagnosticReader};
use crate::error::{Error, Result};
use crate::hardware::{Device, ScanEntry};

/// Exit status bit: command line did not parse.
const EXIT_BAD_COMMAND_LINE: i32 = 1 << 0;
/// Exit status bit: device open failed or device is in a low-power mode.
const EXIT_OPEN_FAILED: i32 = 1 << 1;

/// Configuration for the smartctl reader
#[derive(Debug, Clone)]
pub struct SmartctlConfig {
    /// Path to the smartctl binary
    pub path: PathBuf,
}

impl Default for SmartctlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/sbin/smartctl"),
        }
    }
}

/// Reads device listings and diagnostic trees by running smartctl.
#[derive(Debug, Clone)]
pub struct Smartctl {
    config: SmartctlConfig,
}

impl Smartctl {
    pub fn new(config: SmartctlConfig) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        debug!(path = %self.config.path.display(), ?args, "Running smartctl");

        Command::new(&self.config.path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Smartctl {
                command: format!("{} {}", self.config.path.display(), args.join(" ")),
                reason: e.to_string(),
            })
    }

    fn read_args(device: &Device) -> Vec<String> {
        [
            "--json",
            "--info",
            "--health",
            "--attributes",
            "--tolerance=verypermissive",
            "--nocheck=standby",
            "--format=brief",
            "--log=error",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .chain([
            format!("--device={}", device.device_type),
            device.path.clone(),
        ])
        .collect()
    }
}

#[async_trait]
impl DiagnosticReader for Smartctl {
    #[instrument(skip(self))]
    async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>> {
        let mut full_args = vec!["--json".to_string(), "--scan".to_string()];
        full_args.extend_from_slice(args);

        let output = self.run(&full_args).await?;
        if !output.status.success() {
            // smartctl still prints a listing on most non-zero exits
            debug!(status = ?output.status.code(), "smartctl --scan exited non-zero");
        }

        parse_scan(&output.stdout).map_err(|e| Error::Smartctl {
            command: format!("smartctl {}", full_args.join(" ")),
            reason: e.to_string(),
        })
    }

    #[instrument(skip(self), fields(device = %device.canonical_name))]
    async fn read_device(&self, device: &Device) -> Result<Option<Value>> {
        let output = self.run(&Self::read_args(device)).await?;

        if let Some(code) = output.status.code() {
            if code & (EXIT_BAD_COMMAND_LINE | EXIT_OPEN_FAILED) != 0 {
                warn!(
                    device = %device.canonical_name,
                    status = code,
                    "smartctl could not read device"
                );
                return Ok(None);
            }
            if code != 0 {
                debug!(status = code, "smartctl reported device problems");
            }
        }

        match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(reading) => Ok(well_formed(reading)),
            Err(e) => {
                warn!(device = %device.canonical_name, "smartctl output is not JSON: {}", e);
                Ok(None)
            }
        }
    }
}

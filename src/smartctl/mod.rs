//! Diagnostic tool access
//!
//! Everything that talks to smartctl goes through the [`DiagnosticReader`]
//! port so discovery and collection can run against fixtures in tests.
//!
//! # Readers
//!
//! - [`Smartctl`] - runs the binary with `--json`
//! - [`CachingReader`] - keeps device readings for a polling interval
//! - [`FixtureReader`] - serves canned JSON from a directory

mod cache;
mod fixture;
mod reader;

pub use cache::CachingReader;
pub use fixture::FixtureReader;
pub use reader::{Smartctl, SmartctlConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::hardware::{Device, ScanEntry};

/// Port for the external diagnostic tool.
#[async_trait]
pub trait DiagnosticReader: Send + Sync {
    /// List the devices visible with the given addressing arguments.
    ///
    /// An empty slice is the default (direct-attached) addressing.
    async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>>;

    /// Read the full diagnostic tree of one device.
    ///
    /// `Ok(None)` means the tool ran but produced nothing usable.
    async fn read_device(&self, device: &Device) -> Result<Option<Value>>;
}

#[async_trait]
impl<R: DiagnosticReader + ?Sized> DiagnosticReader for Arc<R> {
    async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>> {
        (**self).list_devices(args).await
    }

    async fn read_device(&self, device: &Device) -> Result<Option<Value>> {
        (**self).read_device(device).await
    }
}

/// Parse `smartctl --scan --json` output into entries.
pub fn parse_scan(output: &[u8]) -> Result<Vec<ScanEntry>> {
    #[derive(serde::Deserialize)]
    struct ScanOutput {
        #[serde(default)]
        devices: Vec<ScanEntry>,
    }

    let scan: ScanOutput = serde_json::from_slice(output)?;
    Ok(scan.devices)
}

/// Keep only readings that are a JSON object, which is what smartctl
/// produces whenever it managed to say anything about the device.
pub fn well_formed(reading: Value) -> Option<Value> {
    match reading {
        Value::Object(ref map) if !map.is_empty() => Some(reading),
        _ => None,
    }
}

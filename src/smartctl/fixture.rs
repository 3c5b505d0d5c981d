//! Canned smartctl output
//!
//! Layout of the fixture directory:
//!
//! ```text
//! scan.json            base pass (`smartctl --scan`)
//! scan-d-sat.json      pass with `-d sat` (dashes stripped, joined by '-')
//! <canonical>.json     per-device reading, e.g. sda.json
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{parse_scan, well_formed, DiagnosticReader};
use crate::error::Result;
use crate::hardware::{Device, ScanEntry};

/// Serves smartctl JSON captured from real machines.
#[derive(Debug, Clone)]
pub struct FixtureReader {
    dir: PathBuf,
}

impl FixtureReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding the listing for these addressing arguments.
    pub fn scan_file(&self, args: &[String]) -> PathBuf {
        if args.is_empty() {
            return self.dir.join("scan.json");
        }
        let suffix = args
            .iter()
            .map(|arg| arg.trim_start_matches('-'))
            .filter(|arg| !arg.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        self.dir.join(format!("scan-{}.json", suffix))
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No fixture");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DiagnosticReader for FixtureReader {
    async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>> {
        match Self::read_optional(&self.scan_file(args)).await? {
            Some(bytes) => parse_scan(&bytes),
            None => Ok(vec![]),
        }
    }

    async fn read_device(&self, device: &Device) -> Result<Option<Value>> {
        let path = self.dir.join(format!("{}.json", device.canonical_name));
        let Some(bytes) = Self::read_optional(&path).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice::<Value>(&bytes).ok().and_then(well_formed))
    }
}

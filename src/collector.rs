//! Collection Orchestrator
//!
//! Runs once per scrape: takes the inventory hold, reads every device in
//! inventory order and hands each usable reading to the translator.
//!
//! The hold is kept across every device read. A slow device therefore delays
//! the whole scrape and any pending rescan; `read_timeout` bounds that.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::hardware::Device;
use crate::inventory::Inventory;
use crate::metrics::{ExporterMetrics, MetricSink, MetricTranslator, Sample, SmartctlInfo};
use crate::smartctl::DiagnosticReader;

/// Configuration for the collector
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// Upper bound for a single device read; `None` waits forever
    pub read_timeout: Option<Duration>,
}

/// Summary of one collection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionReport {
    /// Devices in the inventory during the pass
    pub devices: usize,
    /// Devices that produced a usable reading
    pub read: usize,
    /// Devices skipped (absent, malformed, failed or timed out)
    pub skipped: usize,
}

/// Polls every inventoried device and emits its metrics.
pub struct DeviceCollector {
    config: CollectorConfig,
    inventory: Arc<Inventory>,
    reader: Arc<dyn DiagnosticReader>,
    translator: Arc<dyn MetricTranslator>,
    metrics: Option<ExporterMetrics>,
}

impl DeviceCollector {
    pub fn new(
        config: CollectorConfig,
        inventory: Arc<Inventory>,
        reader: Arc<dyn DiagnosticReader>,
        translator: Arc<dyn MetricTranslator>,
    ) -> Self {
        Self {
            config,
            inventory,
            reader,
            translator,
            metrics: None,
        }
    }

    /// Record scrape durations in the exporter's own metrics.
    pub fn with_metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// Run one collection pass into `sink`.
    ///
    /// Never fails: unreadable devices are skipped and logged.
    #[instrument(skip_all)]
    pub async fn collect(&self, sink: &mut dyn MetricSink) -> CollectionReport {
        let started = Instant::now();
        let mut info = SmartctlInfo::new();

        let hold = self.inventory.hold().await;
        let mut report = CollectionReport {
            devices: hold.len(),
            ..Default::default()
        };

        for device in hold.iter() {
            match self.read(device).await {
                Some(reading) => {
                    info.observe(&reading);
                    self.translator.translate(device, &reading, sink);
                    report.read += 1;
                }
                None => report.skipped += 1,
            }
        }

        sink.emit(Sample::gauge(
            "smartctl_devices",
            "Number of devices configured or dynamically discovered",
            report.devices as f64,
        ));
        info.emit(sink);
        drop(hold);

        if let Some(metrics) = &self.metrics {
            metrics.scrape_duration.observe(started.elapsed().as_secs_f64());
        }
        debug!(?report, elapsed = ?started.elapsed(), "Collection pass finished");
        report
    }

    async fn read(&self, device: &Device) -> Option<serde_json::Value> {
        match self.read_device(device).await {
            Ok(Some(reading)) => Some(reading),
            Ok(None) => {
                debug!(device = %device.canonical_name, "No usable reading");
                None
            }
            Err(e) => {
                warn!(device = %device.canonical_name, "Device read failed: {}", e);
                None
            }
        }
    }

    /// Read one device, bounded by `read_timeout` when set.
    async fn read_device(&self, device: &Device) -> Result<Option<serde_json::Value>> {
        let read = self.reader.read_device(device);
        match self.config.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::ReadTimeout {
                        device: device.canonical_name.clone(),
                        timeout: limit,
                    })
                }),
            None => read.await,
        }
    }
}

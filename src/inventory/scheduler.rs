//! Rescan Scheduler
//!
//! Background task that re-runs discovery on a fixed interval and swaps the
//! result into the inventory.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::Inventory;
use crate::hardware::Discovery;
use crate::metrics::ExporterMetrics;

/// Intervals below this disable rescanning.
pub const MIN_RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically refreshes the inventory.
pub struct RescanScheduler {
    discovery: Arc<Discovery>,
    inventory: Arc<Inventory>,
    interval: Duration,
    metrics: Option<ExporterMetrics>,
}

impl RescanScheduler {
    pub fn new(discovery: Arc<Discovery>, inventory: Arc<Inventory>, interval: Duration) -> Self {
        Self {
            discovery,
            inventory,
            interval,
            metrics: None,
        }
    }

    /// Record rescans in the exporter's own metrics.
    pub fn with_metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether `interval` is long enough to schedule rescans at all.
    pub fn enabled(interval: Duration) -> bool {
        interval >= MIN_RESCAN_INTERVAL
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one discovery pass and replace the inventory with its result.
    ///
    /// The degraded result of a failed scan is adopted as-is.
    pub async fn rescan_once(&self) -> u64 {
        let devices = self.discovery.scan().await;
        let count = devices.len();
        let names: Vec<String> = devices.iter().map(|d| d.canonical_name.clone()).collect();

        let generation = self.inventory.replace(devices).await;

        info!(
            count,
            generation,
            devices = %names.join(", "),
            "Inventory replaced"
        );
        if let Some(metrics) = &self.metrics {
            metrics.rescans.inc();
            metrics.inventory_generation.set(generation as i64);
        }
        generation
    }

    /// Rescan every `interval` until `shutdown` is cancelled.
    #[instrument(skip_all, fields(interval = ?self.interval))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Rescanning for devices every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Rescan scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            info!("Rescanning for devices");
            self.rescan_once().await;
        }
    }
}

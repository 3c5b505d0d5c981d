//! Metrics module
//!
//! Sample sinks, the smartctl translator and the exporter's own metrics.

mod sink;
mod translator;

pub use sink::{MetricKind, MetricSink, PrometheusSink, Sample};
pub use translator::{MetricTranslator, SmartctlInfo, SmartctlTranslator};

use prometheus::proto::MetricFamily;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

use crate::error::Result;

/// Metrics about the exporter itself, kept across scrapes.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    /// Wall time of one collection pass, lock wait included
    pub scrape_duration: Histogram,
    /// Completed background rescans
    pub rescans: IntCounter,
    /// Inventory replacements since startup
    pub inventory_generation: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "smartctl_exporter_scrape_duration_seconds",
                "Time spent collecting device metrics for one scrape",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let rescans = IntCounter::new(
            "smartctl_exporter_rescans_total",
            "Number of completed background device rescans",
        )?;
        let inventory_generation = IntGauge::new(
            "smartctl_exporter_inventory_generation",
            "Number of times the device inventory has been replaced",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(rescans.clone()))?;
        registry.register(Box::new(inventory_generation.clone()))?;

        Ok(Self {
            registry,
            scrape_duration,
            rescans,
            inventory_generation,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

//! Metric samples and sinks

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use tracing::warn;

use crate::error::{Error, Result};

/// Prometheus metric type of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// One point-in-time value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub value: f64,
    pub labels: Vec<(&'static str, String)>,
}

impl Sample {
    pub fn gauge(name: &'static str, help: &'static str, value: f64) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            value,
            labels: Vec::new(),
        }
    }

    pub fn counter(name: &'static str, help: &'static str, value: f64) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(name, help, value)
        }
    }

    pub fn label(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.labels.push((name, value.into()));
        self
    }

    /// Value of a label, if set.
    pub fn label_value(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Accepts samples produced during a collection pass.
pub trait MetricSink: Send {
    fn emit(&mut self, sample: Sample);
}

impl MetricSink for Vec<Sample> {
    fn emit(&mut self, sample: Sample) {
        self.push(sample);
    }
}

/// Builds Prometheus metric families out of the samples of one scrape.
///
/// Every scrape gets a fresh sink, so devices that disappeared between
/// scrapes leave no stale series behind.
pub struct PrometheusSink {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
    counters: HashMap<&'static str, CounterVec>,
    dropped: usize,
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: HashMap::new(),
            counters: HashMap::new(),
            dropped: 0,
        }
    }

    /// Samples that could not be recorded.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    fn record(&mut self, sample: &Sample) -> Result<()> {
        let label_names: Vec<&str> = sample.labels.iter().map(|(name, _)| *name).collect();
        let labels: HashMap<&str, &str> = sample
            .labels
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();

        match sample.kind {
            MetricKind::Gauge => {
                let vec = match self.gauges.entry(sample.name) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let vec = GaugeVec::new(Opts::new(sample.name, sample.help), &label_names)?;
                        self.registry.register(Box::new(vec.clone()))?;
                        entry.insert(vec)
                    }
                };
                vec.get_metric_with(&labels)?.set(sample.value);
            }
            MetricKind::Counter => {
                if sample.value < 0.0 || !sample.value.is_finite() {
                    return Err(Error::Internal(format!(
                        "counter {} cannot hold {}",
                        sample.name, sample.value
                    )));
                }
                let vec = match self.counters.entry(sample.name) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let vec = CounterVec::new(Opts::new(sample.name, sample.help), &label_names)?;
                        self.registry.register(Box::new(vec.clone()))?;
                        entry.insert(vec)
                    }
                };
                let counter = vec.get_metric_with(&labels)?;
                counter.reset();
                counter.inc_by(sample.value);
            }
        }
        Ok(())
    }
}

impl MetricSink for PrometheusSink {
    fn emit(&mut self, sample: Sample) {
        if let Err(e) = self.record(&sample) {
            warn!(metric = sample.name, "Dropping sample: {}", e);
            self.dropped += 1;
        }
    }
}

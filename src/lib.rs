//! smartctl exporter
//!
//! Discovers physical and RAID-enclosed storage devices, polls smartctl for
//! each of them and republishes the readings as Prometheus metrics on every
//! scrape.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!   startup ────▶ │ Discovery + restrict │
//!                 └──────────┬───────────┘
//!                           ▼
//!  RescanScheduler ──▶  Inventory  ◀── DeviceCollector ◀── GET /metrics
//!   (background)     (one mutex)       (per scrape)
//! ```
//!
//! # Modules
//!
//! - [`hardware`] - Device model, discovery, filtering and RAID expansion
//! - [`smartctl`] - Diagnostic reader port and its implementations
//! - [`inventory`] - Shared device list and the rescan scheduler
//! - [`collector`] - Per-scrape collection pass
//! - [`metrics`] - Samples, sinks, translation and self metrics
//! - [`server`] - HTTP exposition
//! - [`config`] - Validated configuration
//! - [`error`] - Error types

pub mod collector;
pub mod config;
pub mod error;
pub mod hardware;
pub mod inventory;
pub mod metrics;
pub mod server;
pub mod smartctl;

// Re-export commonly used types
pub use collector::{CollectionReport, CollectorConfig, DeviceCollector};
pub use config::ExporterConfig;
pub use error::{Error, Result};
pub use hardware::{restrict, Device, DeviceType, Discovery, DiscoveryConfig};
pub use inventory::{Inventory, RescanScheduler};
pub use metrics::{MetricSink, MetricTranslator, Sample};
pub use server::MetricsServer;
pub use smartctl::DiagnosticReader;

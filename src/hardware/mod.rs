//! Hardware Discovery Module
//!
//! Finds the physical and RAID-enclosed devices smartctl can read.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use smartctl_exporter::hardware::{restrict, Discovery, DiscoveryConfig};
//! use smartctl_exporter::smartctl::{Smartctl, SmartctlConfig};
//!
//! # async fn example() -> smartctl_exporter::Result<()> {
//! let reader = Arc::new(Smartctl::new(SmartctlConfig::default()));
//! let discovery = Discovery::new(DiscoveryConfig::default(), reader)?;
//!
//! let devices = restrict(discovery.scan().await, &["sda".to_string()]);
//! for device in &devices {
//!     println!("{}", device);
//! }
//! # Ok(())
//! # }
//! ```

mod device;
pub mod discovery;

pub use device::{controller_tag, member_name, Device, DeviceType, ScanEntry};
pub use discovery::{
    filter::DeviceFilter,
    raid::{cciss_devices, ControllerExpander, RaidExpander},
    restrict, Discovery, DiscoveryConfig,
};

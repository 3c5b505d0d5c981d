//! Device Discovery
//!
//! Builds the device inventory from two smartctl scan passes:
//!
//! 1. the base pass with default addressing (direct-attached devices)
//! 2. the raid pass with enclosure addressing (`-d sat` by default)
//!
//! Raid-pass entries already seen in the base pass are dropped in favour of
//! the base entry; the rest are expanded into logical devices. The include /
//! exclude filter runs last.

pub mod filter;
pub mod raid;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::hardware::{Device, ScanEntry};
use crate::smartctl::DiagnosticReader;

pub use filter::DeviceFilter;
pub use raid::{ControllerExpander, RaidExpander};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for device discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Regex of canonical names to skip
    pub exclude: Option<String>,

    /// Regex of canonical names to keep (everything else is skipped)
    pub include: Option<String>,

    /// Addressing arguments for the raid pass
    pub raid_scan_args: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            exclude: None,
            include: None,
            raid_scan_args: vec!["-d".to_string(), "sat".to_string()],
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Scans the host for devices smartctl can read.
pub struct Discovery {
    config: DiscoveryConfig,
    filter: DeviceFilter,
    reader: Arc<dyn DiagnosticReader>,
    expander: Arc<dyn RaidExpander>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Create a discovery with the default controller expander.
    ///
    /// Fails if the filter patterns are invalid or both are set.
    pub fn new(config: DiscoveryConfig, reader: Arc<dyn DiagnosticReader>) -> Result<Self> {
        let filter = DeviceFilter::new(config.exclude.as_deref(), config.include.as_deref())?;

        Ok(Self {
            config,
            filter,
            reader,
            expander: Arc::new(ControllerExpander::default()),
        })
    }

    /// Replace the RAID expander.
    pub fn with_expander(mut self, expander: Arc<dyn RaidExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    /// Run both passes and return the filtered, deduplicated device list.
    ///
    /// Never fails: a pass that cannot be read contributes nothing.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Vec<Device> {
        let base = self.pass("base", &[]).await;
        let raid = self.pass("raid", &self.config.raid_scan_args).await;

        let base_names: HashSet<String> = base.iter().map(ScanEntry::canonical_name).collect();
        let mut seen: HashSet<String> = HashSet::with_capacity(base.len() + raid.len());
        let mut candidates = Vec::with_capacity(base.len() + raid.len());

        for entry in &base {
            debug!(?entry, "base device");
            let device = entry.to_device();
            if seen.insert(device.canonical_name.clone()) {
                candidates.push(device);
            }
        }

        for entry in &raid {
            if base_names.contains(&entry.canonical_name()) {
                continue;
            }
            debug!(?entry, "raid device");

            for device in self.expander.expand(entry).await {
                if seen.insert(device.canonical_name.clone()) {
                    candidates.push(device);
                } else {
                    warn!(
                        device = %device.canonical_name,
                        path = %device.path,
                        "Dropping device with a name already in use"
                    );
                }
            }
        }

        candidates
            .into_iter()
            .filter(|device| {
                if self.filter.ignored(&device.canonical_name) {
                    info!(name = %device.canonical_name, "Ignoring device");
                    false
                } else {
                    info!(name = %device.canonical_name, "Found device");
                    true
                }
            })
            .collect()
    }

    async fn pass(&self, label: &str, args: &[String]) -> Vec<ScanEntry> {
        match self.reader.list_devices(args).await {
            Ok(entries) => {
                debug!(pass = label, count = entries.len(), "Scan pass finished");
                entries
            }
            Err(e) => {
                warn!(pass = label, "Device scan failed: {}", e);
                Vec::new()
            }
        }
    }
}

// =============================================================================
// Explicit Device Override
// =============================================================================

/// Narrow `devices` to those whose canonical name contains any of `explicit`.
///
/// An empty list leaves the inventory untouched.
pub fn restrict(devices: Vec<Device>, explicit: &[String]) -> Vec<Device> {
    if explicit.is_empty() {
        return devices;
    }

    devices
        .into_iter()
        .filter(|device| {
            explicit.iter().any(|name| {
                debug!(device = %device.canonical_name, filter = %name, "Matching explicit device");
                device.canonical_name.contains(name.as_str())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hardware::DeviceType;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::Value;

    struct StaticReader {
        base: Option<Vec<ScanEntry>>,
        raid: Option<Vec<ScanEntry>>,
    }

    impl StaticReader {
        fn new(base: &[&str], raid: &[&str]) -> Self {
            Self {
                base: Some(base.iter().map(|n| entry(n)).collect()),
                raid: Some(raid.iter().map(|n| entry(n)).collect()),
            }
        }
    }

    #[async_trait]
    impl DiagnosticReader for StaticReader {
        async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>> {
            let pass = if args.is_empty() { &self.base } else { &self.raid };
            pass.clone().ok_or_else(|| Error::Smartctl {
                command: "smartctl --scan".to_string(),
                reason: "exit status 2".to_string(),
            })
        }

        async fn read_device(&self, _device: &Device) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    fn entry(name: &str) -> ScanEntry {
        ScanEntry::new(&format!("/dev/{}", name), &format!("/dev/{}", name), "sat")
    }

    fn names(devices: &[Device]) -> Vec<&str> {
        devices.iter().map(|d| d.canonical_name.as_str()).collect()
    }

    fn discovery(reader: StaticReader, config: DiscoveryConfig) -> Discovery {
        Discovery::new(config, Arc::new(reader)).unwrap()
    }

    /// Controller expander with a fixed drive count for bare cciss entries.
    struct FixedCciss {
        members: usize,
    }

    #[async_trait]
    impl RaidExpander for FixedCciss {
        async fn expand(&self, entry: &ScanEntry) -> Vec<Device> {
            if entry.device_type == DeviceType::Cciss(None) {
                raid::cciss_devices(&entry.name, self.members)
            } else {
                ControllerExpander::default().expand(entry).await
            }
        }
    }

    fn megaraid(bus: u8, slot: u16) -> ScanEntry {
        ScanEntry::new(
            &format!("/dev/bus/{}", bus),
            &format!("/dev/bus/{} [megaraid_disk_{:02}]", bus, slot),
            &format!("megaraid,{}", slot),
        )
    }

    fn cciss(sg: u8) -> ScanEntry {
        let name = format!("/dev/sg{}", sg);
        ScanEntry::new(&name, &name, "cciss")
    }

    #[tokio::test]
    async fn test_raid_pass_appended_and_deduplicated() {
        let discovery = discovery(
            StaticReader::new(&["sda", "sdb"], &["sda", "sdc"]),
            DiscoveryConfig::default(),
        );

        let devices = discovery.scan().await;
        assert_eq!(names(&devices), vec!["sda", "sdb", "sdc"]);
    }

    #[tokio::test]
    async fn test_base_entry_wins_over_raid_entry() {
        let reader = StaticReader {
            base: Some(vec![ScanEntry::new("/dev/sda", "/dev/sda", "scsi")]),
            raid: Some(vec![ScanEntry::new("/dev/sda", "/dev/sda [SAT]", "sat")]),
        };
        let devices = discovery(reader, DiscoveryConfig::default()).scan().await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_type, DeviceType::Scsi);
    }

    #[tokio::test]
    async fn test_exclude_pattern() {
        let config = DiscoveryConfig {
            exclude: Some("^loop".to_string()),
            ..Default::default()
        };
        let devices = discovery(StaticReader::new(&["sda", "loop0", "loop1"], &[]), config)
            .scan()
            .await;

        assert_eq!(names(&devices), vec!["sda"]);
    }

    #[tokio::test]
    async fn test_include_pattern() {
        let config = DiscoveryConfig {
            include: Some("^nvme".to_string()),
            ..Default::default()
        };
        let devices = discovery(StaticReader::new(&["sda", "nvme0"], &["nvme1"]), config)
            .scan()
            .await;

        assert_eq!(names(&devices), vec!["nvme0", "nvme1"]);
    }

    #[tokio::test]
    async fn test_failed_pass_degrades() {
        let reader = StaticReader {
            base: None,
            raid: Some(vec![entry("sdc")]),
        };
        let devices = discovery(reader, DiscoveryConfig::default()).scan().await;
        assert_eq!(names(&devices), vec!["sdc"]);

        let reader = StaticReader { base: None, raid: None };
        assert!(discovery(reader, DiscoveryConfig::default()).scan().await.is_empty());
    }

    #[tokio::test]
    async fn test_members_of_two_controllers_all_kept() {
        let reader = StaticReader {
            base: Some(vec![entry("sda")]),
            raid: Some(vec![megaraid(0, 0), megaraid(1, 0), cciss(0), cciss(1)]),
        };
        let discovery = discovery(reader, DiscoveryConfig::default())
            .with_expander(Arc::new(FixedCciss { members: 2 }));

        let devices = discovery.scan().await;
        let named: Vec<(&str, &str)> = devices
            .iter()
            .map(|d| (d.path.as_str(), d.canonical_name.as_str()))
            .collect();
        assert_eq!(
            named,
            vec![
                ("/dev/sda", "sda"),
                ("/dev/bus/0", "bus0_megaraid_disk_00"),
                ("/dev/bus/1", "bus1_megaraid_disk_00"),
                ("/dev/sg0", "sg0_cciss_disk_00"),
                ("/dev/sg0", "sg0_cciss_disk_01"),
                ("/dev/sg1", "sg1_cciss_disk_00"),
                ("/dev/sg1", "sg1_cciss_disk_01"),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_raid_entry_kept_once() {
        let reader = StaticReader {
            base: Some(vec![]),
            raid: Some(vec![megaraid(0, 3), megaraid(0, 3), cciss(0), cciss(0)]),
        };
        let discovery = discovery(reader, DiscoveryConfig::default())
            .with_expander(Arc::new(FixedCciss { members: 1 }));

        let devices = discovery.scan().await;
        assert_eq!(names(&devices), vec!["bus0_megaraid_disk_03", "sg0_cciss_disk_00"]);
    }

    #[test]
    fn test_conflicting_filter_rejected() {
        let config = DiscoveryConfig {
            exclude: Some("^loop".to_string()),
            include: Some("^sd".to_string()),
            ..Default::default()
        };
        let result = Discovery::new(config, Arc::new(StaticReader::new(&[], &[])));
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_restrict() {
        let devices = vec![
            Device::new("/dev/sda", "sda", DeviceType::Sat),
            Device::new("/dev/sdb", "sdb", DeviceType::Sat),
        ];

        let restricted = restrict(devices.clone(), &["sda".to_string()]);
        assert_eq!(names(&restricted), vec!["sda"]);

        let untouched = restrict(devices.clone(), &[]);
        assert_eq!(untouched, devices);

        let substring = restrict(devices, &["sd".to_string()]);
        assert_eq!(names(&substring), vec!["sda", "sdb"]);
    }

    fn device_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("(sd[a-e]|nvme[0-3]|loop[0-2])", 0..8)
    }

    fn raid_entries() -> impl Strategy<Value = Vec<ScanEntry>> {
        let entry = prop_oneof![
            "(sd[a-e]|nvme[0-3])".prop_map(|n| entry(&n)),
            (0u8..3, 0u16..4).prop_map(|(bus, slot)| megaraid(bus, slot)),
            (0u8..3).prop_map(cciss),
        ];
        prop::collection::vec(entry, 0..10)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_scan_keeps_every_physical_drive(base in device_names(), raid in raid_entries()) {
            const CCISS_MEMBERS: usize = 2;

            let base_entries: Vec<ScanEntry> = base.iter().map(|n| entry(n)).collect();
            let reader = StaticReader {
                base: Some(base_entries),
                raid: Some(raid.clone()),
            };
            let discovery = discovery(reader, DiscoveryConfig::default())
                .with_expander(Arc::new(FixedCciss { members: CCISS_MEMBERS }));

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let devices = runtime.block_on(discovery.scan());

            // One key per physical drive: plain name, or (controller, slot)
            let mut physical: HashSet<(String, String)> = HashSet::new();
            for name in &base {
                physical.insert((name.clone(), String::new()));
            }
            for raid_entry in &raid {
                match &raid_entry.device_type {
                    DeviceType::Megaraid(slot) => {
                        physical.insert((raid_entry.name.clone(), slot.to_string()));
                    }
                    DeviceType::Cciss(None) => {
                        for slot in 0..CCISS_MEMBERS {
                            physical.insert((raid_entry.name.clone(), slot.to_string()));
                        }
                    }
                    _ => {
                        physical.insert((raid_entry.canonical_name(), String::new()));
                    }
                }
            }

            let unique: HashSet<&str> = names(&devices).into_iter().collect();
            prop_assert_eq!(unique.len(), devices.len());
            prop_assert_eq!(devices.len(), physical.len());
            for name in &base {
                prop_assert!(unique.contains(name.as_str()));
            }
        }

        #[test]
        fn prop_restrict_narrows(names_in in device_names(), explicit in prop::collection::vec("[a-z0-9]{1,3}", 1..3)) {
            let devices: Vec<Device> = names_in
                .iter()
                .map(|n| Device::new(format!("/dev/{}", n), n.clone(), DeviceType::Auto))
                .collect();

            let restricted = restrict(devices.clone(), &explicit);
            prop_assert!(restricted.len() <= devices.len());
            for device in &restricted {
                prop_assert!(devices.contains(device));
                prop_assert!(explicit.iter().any(|e| device.canonical_name.contains(e.as_str())));
            }
        }
    }
}

//! RAID controller expansion
//!
//! A single raid-pass entry can stand for several logical devices. The
//! expander turns it into the devices smartctl can actually address.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::hardware::{Device, DeviceType, ScanEntry};

/// Turns one raid-pass entry into the devices behind it.
#[async_trait]
pub trait RaidExpander: Send + Sync {
    async fn expand(&self, entry: &ScanEntry) -> Vec<Device>;
}

/// Expander for MegaRAID and HP Smart Array (cciss) controllers.
///
/// Entries that already carry a member index map to one device. A bare
/// `cciss` controller is enumerated with `cciss_vol_status -V`.
#[derive(Debug, Clone)]
pub struct ControllerExpander {
    cciss_vol_status: PathBuf,
}

impl Default for ControllerExpander {
    fn default() -> Self {
        Self::new("/usr/bin/cciss_vol_status")
    }
}

impl ControllerExpander {
    pub fn new(cciss_vol_status: impl Into<PathBuf>) -> Self {
        Self {
            cciss_vol_status: cciss_vol_status.into(),
        }
    }

    async fn cciss_members(&self, controller: &str) -> Option<usize> {
        let output = Command::new(&self.cciss_vol_status)
            .arg("-V")
            .arg(controller)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let members = count_cciss_members(&String::from_utf8_lossy(&output.stdout));
                debug!(controller, members, "cciss_vol_status finished");
                Some(members).filter(|&n| n > 0)
            }
            Err(e) => {
                warn!(
                    controller,
                    path = %self.cciss_vol_status.display(),
                    "Failed to run cciss_vol_status: {}",
                    e
                );
                None
            }
        }
    }
}

#[async_trait]
impl RaidExpander for ControllerExpander {
    async fn expand(&self, entry: &ScanEntry) -> Vec<Device> {
        if entry.device_type != DeviceType::Cciss(None) {
            return vec![entry.to_device()];
        }

        let controller = entry.name.trim();
        let members = self.cciss_members(controller).await.unwrap_or(1);
        cciss_devices(controller, members)
    }
}

/// One `cciss,i` device per physical drive behind `controller`.
///
/// At least one device is produced so the controller stays visible.
pub fn cciss_devices(controller: &str, members: usize) -> Vec<Device> {
    (0..members.max(1))
        .filter_map(|index| u16::try_from(index).ok())
        .map(|index| Device::raid_member(controller, DeviceType::Cciss(Some(index))))
        .collect()
}

/// Count the physical drives listed by `cciss_vol_status -V`.
///
/// Every physical drive line starts with its `connector` location.
pub fn count_cciss_members(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.trim_start().to_ascii_lowercase().starts_with("connector"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CCISS_OUTPUT: &str = "\
Controller: Smart Array P420i
  Board ID: 0x3354103c
  Physical drives: 3
           connector 1I box 1 bay 1                 HP      EG0300FBDSP    serial1  HPD6 OK
           connector 1I box 1 bay 2                 HP      EG0300FBDSP    serial2  HPD6 OK
           connector 1I box 1 bay 3                 HP      EG0300FBDSP    serial3  HPD6 OK
/dev/sda: (Smart Array P420i) RAID 5 Volume 0 status: OK.
";

    #[test]
    fn test_count_cciss_members() {
        assert_eq!(count_cciss_members(CCISS_OUTPUT), 3);
        assert_eq!(count_cciss_members(""), 0);
    }

    #[tokio::test]
    async fn test_indexed_entries_map_to_one_device() {
        let expander = ControllerExpander::new("/nonexistent/cciss_vol_status");
        let entry = ScanEntry::new("/dev/bus/0", "/dev/bus/0 [megaraid_disk_05]", "megaraid,5");

        let devices = expander.expand(&entry).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].canonical_name, "bus0_megaraid_disk_05");
        assert_eq!(devices[0].device_type, DeviceType::Megaraid(5));
    }

    #[tokio::test]
    async fn test_bare_cciss_falls_back_when_tool_missing() {
        let expander = ControllerExpander::new("/nonexistent/cciss_vol_status");
        let entry = ScanEntry::new("/dev/sg0", "/dev/sg0", "cciss");

        let devices = expander.expand(&entry).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path, "/dev/sg0");
        assert_eq!(devices[0].canonical_name, "sg0_cciss_disk_00");
        assert_eq!(devices[0].device_type, DeviceType::Cciss(Some(0)));
    }

    #[test]
    fn test_cciss_devices_named_per_controller() {
        let first = cciss_devices("/dev/sg0", 2);
        let second = cciss_devices("/dev/sg1", 2);

        let names: Vec<&str> = first
            .iter()
            .chain(second.iter())
            .map(|d| d.canonical_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["sg0_cciss_disk_00", "sg0_cciss_disk_01", "sg1_cciss_disk_00", "sg1_cciss_disk_01"]
        );
        assert_eq!(second[1].path, "/dev/sg1");
        assert_eq!(second[1].device_type, DeviceType::Cciss(Some(1)));

        assert_eq!(cciss_devices("/dev/sg2", 0).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_two_cciss_controllers_expand_separately() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("cciss_vol_status");
        std::fs::write(
            &tool,
            "#!/bin/sh\necho '  connector 1I box 1 bay 1  HP  EG0300FBDSP  s1  HPD6 OK'\n\
             echo '  connector 1I box 1 bay 2  HP  EG0300FBDSP  s2  HPD6 OK'\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let expander = ControllerExpander::new(&tool);
        let mut devices = expander.expand(&ScanEntry::new("/dev/sg0", "/dev/sg0", "cciss")).await;
        devices.extend(expander.expand(&ScanEntry::new("/dev/sg1", "/dev/sg1", "cciss")).await);

        let named: Vec<(&str, &str)> = devices
            .iter()
            .map(|d| (d.path.as_str(), d.canonical_name.as_str()))
            .collect();
        assert_eq!(
            named,
            vec![
                ("/dev/sg0", "sg0_cciss_disk_00"),
                ("/dev/sg0", "sg0_cciss_disk_01"),
                ("/dev/sg1", "sg1_cciss_disk_00"),
                ("/dev/sg1", "sg1_cciss_disk_01"),
            ]
        );
    }
}

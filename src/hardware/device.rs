//! Device model
//!
//! A [`Device`] is what the rest of the exporter knows about a storage unit:
//! the handle smartctl opens, the stable name used for dedup and filtering,
//! and the `-d` addressing hint.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Bracketed RAID member token in smartctl's `info_name`,
/// e.g. `/dev/bus/0 [megaraid_disk_00]`.
static RAID_MEMBER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([A-Za-z0-9]+_disk_[0-9]+)\]").expect("RAID member pattern is valid")
});

// =============================================================================
// Device Type
// =============================================================================

/// How smartctl must address a device (`smartctl -d <type>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum DeviceType {
    /// Let smartctl guess
    Auto,
    /// Plain ATA
    Ata,
    /// SATA behind a SCSI-to-ATA translation layer
    Sat,
    /// SCSI / SAS
    Scsi,
    /// NVMe
    Nvme,
    /// Member `n` behind an LSI MegaRAID controller
    Megaraid(u16),
    /// Member behind an HP Smart Array controller; `None` for the bare
    /// controller entry that still needs expanding
    Cciss(Option<u16>),
    /// Anything smartctl reports that we do not model
    Other(String),
}

impl DeviceType {
    /// Whether the device sits behind a RAID controller.
    pub fn is_raid_member(&self) -> bool {
        matches!(self, DeviceType::Megaraid(_) | DeviceType::Cciss(_))
    }

    /// Vendor token for RAID members, e.g. `megaraid_disk_03`.
    ///
    /// The token only identifies a drive within its controller; see
    /// [`member_name`] for the host-wide name.
    pub fn raid_member_name(&self) -> Option<String> {
        match self {
            DeviceType::Megaraid(n) => Some(format!("megaraid_disk_{:02}", n)),
            DeviceType::Cciss(Some(n)) => Some(format!("cciss_disk_{:02}", n)),
            _ => None,
        }
    }
}

impl From<&str> for DeviceType {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        let (kind, index) = match raw.split_once(',') {
            Some((kind, index)) => (kind, index.trim().parse::<u16>().ok()),
            None => (raw, None),
        };

        match (kind.to_ascii_lowercase().as_str(), index) {
            ("" | "auto", None) => DeviceType::Auto,
            ("ata", None) => DeviceType::Ata,
            ("sat", None) => DeviceType::Sat,
            ("scsi", None) => DeviceType::Scsi,
            ("nvme", None) => DeviceType::Nvme,
            ("megaraid", Some(n)) => DeviceType::Megaraid(n),
            ("cciss", index) => DeviceType::Cciss(index),
            _ => DeviceType::Other(raw.to_string()),
        }
    }
}

impl From<String> for DeviceType {
    fn from(raw: String) -> Self {
        DeviceType::from(raw.as_str())
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Auto => write!(f, "auto"),
            DeviceType::Ata => write!(f, "ata"),
            DeviceType::Sat => write!(f, "sat"),
            DeviceType::Scsi => write!(f, "scsi"),
            DeviceType::Nvme => write!(f, "nvme"),
            DeviceType::Megaraid(n) => write!(f, "megaraid,{}", n),
            DeviceType::Cciss(Some(n)) => write!(f, "cciss,{}", n),
            DeviceType::Cciss(None) => write!(f, "cciss"),
            DeviceType::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Short form of a controller handle: `/dev/bus/0` becomes `bus0`.
pub fn controller_tag(controller: &str) -> String {
    let controller = controller.trim();
    controller
        .strip_prefix("/dev/")
        .unwrap_or(controller)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Host-wide name of a RAID member, e.g. `bus1_megaraid_disk_00`.
pub fn member_name(controller: &str, token: &str) -> String {
    match controller_tag(controller) {
        tag if tag.is_empty() => token.to_string(),
        tag => format!("{}_{}", tag, token),
    }
}

// =============================================================================
// Scan Entry
// =============================================================================

/// One row of `smartctl --scan --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanEntry {
    /// Device handle, e.g. `/dev/sda` or `/dev/bus/0`
    pub name: String,
    /// smartctl's description, e.g. `/dev/sda [SAT]`
    #[serde(default)]
    pub info_name: String,
    /// Addressing type
    #[serde(rename = "type", default = "default_type")]
    pub device_type: DeviceType,
    /// Protocol (ATA, SCSI, NVMe)
    #[serde(default)]
    pub protocol: Option<String>,
}

fn default_type() -> DeviceType {
    DeviceType::Auto
}

impl ScanEntry {
    /// Build an entry by hand (fixtures and tests).
    pub fn new(name: &str, info_name: &str, device_type: &str) -> Self {
        Self {
            name: name.to_string(),
            info_name: info_name.to_string(),
            device_type: DeviceType::from(device_type),
            protocol: None,
        }
    }

    /// Stable identifier for this entry.
    ///
    /// RAID members are named from their controller plus the member token;
    /// everything else from the device handle without its `/dev/` prefix.
    pub fn canonical_name(&self) -> String {
        let handle = match self.name.trim() {
            "" => self.info_name.split_whitespace().next().unwrap_or_default(),
            name => name,
        };

        if let Some(token) = RAID_MEMBER_TOKEN
            .captures(&self.info_name)
            .and_then(|caps| caps.get(1))
        {
            return member_name(handle, token.as_str());
        }

        if let Some(token) = self.device_type.raid_member_name() {
            return member_name(handle, &token);
        }

        handle.strip_prefix("/dev/").unwrap_or(handle).to_string()
    }

    /// Convert into a [`Device`] addressed exactly as scanned.
    pub fn to_device(&self) -> Device {
        Device {
            path: self.name.trim().to_string(),
            canonical_name: self.canonical_name(),
            device_type: self.device_type.clone(),
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// A storage unit known to the exporter.
///
/// Values are immutable once a discovery pass has produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    /// OS-level handle passed to smartctl
    pub path: String,
    /// Stable identifier used for dedup, filtering and the `device` label
    pub canonical_name: String,
    /// Addressing hint for smartctl
    pub device_type: DeviceType,
}

impl Device {
    pub fn new(path: impl Into<String>, canonical_name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            path: path.into(),
            canonical_name: canonical_name.into(),
            device_type,
        }
    }
}

impl Device {
    /// A drive behind `controller`, named after both.
    pub fn raid_member(controller: &str, device_type: DeviceType) -> Self {
        let name = match device_type.raid_member_name() {
            Some(token) => member_name(controller, &token),
            None => controller_tag(controller),
        };
        Self::new(controller.trim(), name, device_type)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -d {})", self.canonical_name, self.path, self.device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_parse() {
        assert_eq!(DeviceType::from("sat"), DeviceType::Sat);
        assert_eq!(DeviceType::from("NVMe"), DeviceType::Nvme);
        assert_eq!(DeviceType::from("megaraid,12"), DeviceType::Megaraid(12));
        assert_eq!(DeviceType::from("cciss,3"), DeviceType::Cciss(Some(3)));
        assert_eq!(DeviceType::from("cciss"), DeviceType::Cciss(None));
        assert_eq!(DeviceType::from(""), DeviceType::Auto);
        assert_eq!(
            DeviceType::from("areca,1/2"),
            DeviceType::Other("areca,1/2".to_string())
        );
    }

    #[test]
    fn test_device_type_display_matches_smartctl() {
        assert_eq!(DeviceType::Megaraid(0).to_string(), "megaraid,0");
        assert_eq!(DeviceType::Cciss(Some(7)).to_string(), "cciss,7");
        assert_eq!(DeviceType::Scsi.to_string(), "scsi");
        assert!(DeviceType::Megaraid(1).is_raid_member());
        assert!(!DeviceType::Nvme.is_raid_member());
    }

    #[test]
    fn test_canonical_name_plain_device() {
        let entry = ScanEntry::new("/dev/sda", "/dev/sda [SAT]", "sat");
        assert_eq!(entry.canonical_name(), "sda");

        let entry = ScanEntry::new("/dev/nvme0", "/dev/nvme0", "nvme");
        assert_eq!(entry.canonical_name(), "nvme0");
    }

    #[test]
    fn test_canonical_name_raid_member() {
        let entry = ScanEntry::new("/dev/bus/0", "/dev/bus/0 [megaraid_disk_04]", "megaraid,4");
        assert_eq!(entry.canonical_name(), "bus0_megaraid_disk_04");

        // No bracket token: fall back to the controller index
        let entry = ScanEntry::new("/dev/sg1", "/dev/sg1", "cciss,2");
        assert_eq!(entry.canonical_name(), "sg1_cciss_disk_02");
    }

    #[test]
    fn test_same_slot_on_two_controllers() {
        let first = ScanEntry::new("/dev/bus/0", "/dev/bus/0 [megaraid_disk_00]", "megaraid,0");
        let second = ScanEntry::new("/dev/bus/1", "/dev/bus/1 [megaraid_disk_00]", "megaraid,0");
        assert_ne!(first.canonical_name(), second.canonical_name());

        let first = Device::raid_member("/dev/sg0", DeviceType::Cciss(Some(1)));
        let second = Device::raid_member("/dev/sg1", DeviceType::Cciss(Some(1)));
        assert_eq!(first.canonical_name, "sg0_cciss_disk_01");
        assert_eq!(second.canonical_name, "sg1_cciss_disk_01");
        assert_eq!(second.path, "/dev/sg1");
    }

    #[test]
    fn test_controller_tag() {
        assert_eq!(controller_tag("/dev/bus/12"), "bus12");
        assert_eq!(controller_tag(" /dev/sg0 "), "sg0");
        assert_eq!(member_name("", "megaraid_disk_00"), "megaraid_disk_00");
    }

    #[test]
    fn test_scan_entry_deserialize() {
        let json = r#"{"name":"/dev/sdb","info_name":"/dev/sdb [SAT]","type":"sat","protocol":"ATA"}"#;
        let entry: ScanEntry = serde_json::from_str(json).unwrap();

        let device = entry.to_device();
        assert_eq!(device.path, "/dev/sdb");
        assert_eq!(device.canonical_name, "sdb");
        assert_eq!(device.device_type, DeviceType::Sat);
        assert_eq!(entry.protocol.as_deref(), Some("ATA"));
    }
}

//! smartctl JSON to metric samples

use serde_json::Value;

use super::sink::{MetricSink, Sample};
use crate::hardware::Device;

/// Turns one device's diagnostic tree into samples.
pub trait MetricTranslator: Send + Sync {
    fn translate(&self, device: &Device, reading: &Value, sink: &mut dyn MetricSink);
}

/// Default translator covering the fields every smartctl build reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartctlTranslator;

impl SmartctlTranslator {
    fn attributes(&self, device: &Device, reading: &Value, sink: &mut dyn MetricSink) {
        let Some(table) = reading
            .pointer("/ata_smart_attributes/table")
            .and_then(Value::as_array)
        else {
            return;
        };

        for attribute in table {
            let (Some(id), Some(name)) = (
                attribute.get("id").and_then(Value::as_u64),
                attribute.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };

            let fields = [
                ("value", attribute.get("value")),
                ("worst", attribute.get("worst")),
                ("thresh", attribute.get("thresh")),
                ("raw", attribute.pointer("/raw/value")),
            ];
            for (value_type, value) in fields {
                let Some(value) = value.and_then(Value::as_f64) else {
                    continue;
                };
                sink.emit(
                    Sample::gauge("smartctl_device_attribute", "Device attributes", value)
                        .label("device", device.canonical_name.clone())
                        .label("attribute_name", name)
                        .label("attribute_id", id.to_string())
                        .label("attribute_value_type", value_type),
                );
            }
        }
    }
}

impl MetricTranslator for SmartctlTranslator {
    fn translate(&self, device: &Device, reading: &Value, sink: &mut dyn MetricSink) {
        let name = device.canonical_name.as_str();
        let text = |pointer: &str| {
            reading
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        let number = |pointer: &str| reading.pointer(pointer).and_then(Value::as_f64);

        sink.emit(
            Sample::gauge("smartctl_device", "Device info", 1.0)
                .label("device", name)
                .label("interface", device.device_type.to_string())
                .label("model_name", text("/model_name"))
                .label("serial_number", text("/serial_number"))
                .label("firmware_version", text("/firmware_version")),
        );

        if let Some(passed) = reading.pointer("/smart_status/passed").and_then(Value::as_bool) {
            sink.emit(
                Sample::gauge("smartctl_device_smart_status", "General smart status", f64::from(u8::from(passed)))
                    .label("device", name),
            );
        }

        if let Some(celsius) = number("/temperature/current") {
            sink.emit(
                Sample::gauge("smartctl_device_temperature", "Device temperature celsius", celsius)
                    .label("device", name)
                    .label("temperature_type", "current"),
            );
        }

        if let Some(hours) = number("/power_on_time/hours") {
            let minutes = number("/power_on_time/minutes").unwrap_or_default();
            sink.emit(
                Sample::counter("smartctl_device_power_on_seconds", "Device power on seconds", hours * 3600.0 + minutes * 60.0)
                    .label("device", name),
            );
        }

        if let Some(cycles) = number("/power_cycle_count") {
            sink.emit(
                Sample::counter("smartctl_device_power_cycle_count", "Device power cycle count", cycles)
                    .label("device", name),
            );
        }

        if let Some(bytes) = number("/user_capacity/bytes") {
            sink.emit(
                Sample::gauge("smartctl_device_capacity_bytes", "Device capacity in bytes", bytes)
                    .label("device", name),
            );
        }

        if let Some(used) = number("/nvme_smart_health_information_log/percentage_used") {
            sink.emit(
                Sample::gauge("smartctl_device_percentage_used", "Device write percentage used", used)
                    .label("device", name),
            );
        }

        if let Some(status) = number("/smartctl/exit_status") {
            sink.emit(
                Sample::gauge("smartctl_device_exit_status", "Exit status of smartctl on device", status)
                    .label("device", name),
            );
        }

        self.attributes(device, reading, sink);
    }
}

// =============================================================================
// smartctl Build Info
// =============================================================================

/// Remembers which smartctl build answered during a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmartctlInfo {
    version: Option<String>,
    svn_revision: String,
    build_info: String,
}

impl SmartctlInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the version block of a reading. The first one wins.
    pub fn observe(&mut self, reading: &Value) {
        if self.version.is_some() {
            return;
        }
        let Some(smartctl) = reading.get("smartctl") else {
            return;
        };
        let Some(parts) = smartctl.get("version").and_then(Value::as_array) else {
            return;
        };

        let version = parts
            .iter()
            .filter_map(Value::as_u64)
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(".");
        if version.is_empty() {
            return;
        }

        let field = |key: &str| {
            smartctl
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        self.svn_revision = field("svn_revision");
        self.build_info = field("build_info");
        self.version = Some(version);
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn emit(&self, sink: &mut dyn MetricSink) {
        let Some(version) = &self.version else {
            return;
        };
        sink.emit(
            Sample::gauge("smartctl_version", "smartctl version", 1.0)
                .label("version", version.clone())
                .label("svn_revision", self.svn_revision.clone())
                .label("build_info", self.build_info.clone()),
        );
    }
}

//! Device include/exclude policy

use regex::Regex;

use crate::error::{Error, Result};

/// Regex policy deciding which discovered devices are ignored.
///
/// At most one of `exclude` and `include` may be set.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    exclude: Option<Regex>,
    include: Option<Regex>,
}

impl DeviceFilter {
    /// Build a filter from the raw flag values. Empty strings mean unset.
    pub fn new(exclude: Option<&str>, include: Option<&str>) -> Result<Self> {
        let exclude = compile(exclude)?;
        let include = compile(include)?;

        if exclude.is_some() && include.is_some() {
            return Err(Error::Config(
                "device-exclude and device-include are mutually exclusive".to_string(),
            ));
        }

        Ok(Self { exclude, include })
    }

    /// A filter that keeps every device.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether the device with this canonical name should be skipped.
    pub fn ignored(&self, canonical_name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            return exclude.is_match(canonical_name);
        }
        if let Some(include) = &self.include {
            return !include.is_match(canonical_name);
        }
        false
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        None | Some("") => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }),
    }
}

//! Polling-interval cache for device readings
//!
//! Scrapes can arrive far more often than disks should be woken up, so
//! readings are reused until they are older than the polling interval.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::DiagnosticReader;
use crate::error::Result;
use crate::hardware::{Device, ScanEntry};

#[derive(Debug, Clone)]
struct CacheEntry {
    reading: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Wraps a reader and keeps successful device readings for `ttl`.
///
/// Device listings are never cached.
pub struct CachingReader<R> {
    inner: R,
    ttl: Duration,
    cache: DashMap<String, CacheEntry>,
}

impl<R: DiagnosticReader> CachingReader<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Number of cached readings, expired ones not yet swept included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached reading.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl<R: DiagnosticReader> DiagnosticReader for CachingReader<R> {
    async fn list_devices(&self, args: &[String]) -> Result<Vec<ScanEntry>> {
        self.inner.list_devices(args).await
    }

    async fn read_device(&self, device: &Device) -> Result<Option<Value>> {
        if self.ttl.is_zero() {
            return self.inner.read_device(device).await;
        }

        if let Some(entry) = self.cache.get(&device.canonical_name) {
            if !entry.is_expired() {
                debug!(device = %device.canonical_name, "Using cached reading");
                return Ok(Some(entry.reading.clone()));
            }
        }

        let reading = self.inner.read_device(device).await?;
        match &reading {
            Some(value) => {
                // Readings of devices dropped by a rescan age out here
                self.cache.retain(|_, entry| !entry.is_expired());
                self.cache.insert(
                    device.canonical_name.clone(),
                    CacheEntry {
                        reading: value.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
            None => {
                self.cache.remove(&device.canonical_name);
            }
        }
        Ok(reading)
    }
}

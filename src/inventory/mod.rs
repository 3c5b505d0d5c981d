//! Inventory Registry
//!
//! Holds the current device list behind a single async mutex. The list is
//! only ever replaced whole; a collection pass keeps the lock for its full
//! duration so it always sees one complete list.
//!
//! ```text
//!   RescanScheduler ──replace()──┐
//!                                ▼
//!                      Mutex<InventoryState>
//!                                ▲
//!   DeviceCollector ───hold()────┘   (held across every device read)
//! ```

mod scheduler;

pub use scheduler::{RescanScheduler, MIN_RESCAN_INTERVAL};

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::hardware::Device;

#[derive(Debug)]
struct InventoryState {
    devices: Arc<Vec<Device>>,
    generation: u64,
    updated_at: DateTime<Utc>,
}

/// The authoritative device list.
#[derive(Debug)]
pub struct Inventory {
    state: Mutex<InventoryState>,
}

impl Inventory {
    /// Create the inventory from the startup discovery pass.
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            state: Mutex::new(InventoryState {
                devices: Arc::new(devices),
                generation: 0,
                updated_at: Utc::now(),
            }),
        }
    }

    /// Swap in a new device list. Returns the new generation.
    ///
    /// Waits for any in-progress collection pass to release its hold.
    pub async fn replace(&self, devices: Vec<Device>) -> u64 {
        let mut state = self.state.lock().await;
        state.devices = Arc::new(devices);
        state.generation += 1;
        state.updated_at = Utc::now();
        state.generation
    }

    /// Take exclusive access to the device list until the hold is dropped.
    pub async fn hold(&self) -> InventoryHold<'_> {
        InventoryHold {
            guard: self.state.lock().await,
        }
    }

    /// Run `f` against the device list under exclusive access.
    pub async fn with_devices<R>(&self, f: impl FnOnce(&[Device]) -> R) -> R {
        let hold = self.hold().await;
        f(&*hold)
    }

    /// The current list. Identity is stable until the next `replace`.
    pub async fn snapshot(&self) -> Arc<Vec<Device>> {
        self.hold().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.hold().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hold().await.is_empty()
    }
}

/// Exclusive access to the inventory. Releases the lock on drop.
pub struct InventoryHold<'a> {
    guard: MutexGuard<'a, InventoryState>,
}

impl InventoryHold<'_> {
    pub fn snapshot(&self) -> Arc<Vec<Device>> {
        Arc::clone(&self.guard.devices)
    }

    /// Number of replacements since startup.
    pub fn generation(&self) -> u64 {
        self.guard.generation
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.guard.updated_at
    }
}

impl Deref for InventoryHold<'_> {
    type Target = [Device];

    fn deref(&self) -> &Self::Target {
        &self.guard.devices
    }
}

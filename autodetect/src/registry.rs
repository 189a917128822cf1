//! Device registry and registration pipeline.
//!
//! The registry is the single shared collection of tracked devices. Every
//! mutation and every multi-field read happens under one `spin::Mutex` scoped
//! to the minimal critical section; driver loads never run under it.
//! Registration is one code path shared by the coldboot scanner and hotplug
//! ADDED handling.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use spin::Mutex;
use static_assertions::const_assert;

use crate::bus::BusLocation;
use crate::database::{DeviceDatabase, DeviceSignature, DriverFlags, MatchTier};
use crate::error::RegisterError;

/// Registry ceiling; registration beyond it drops the candidate device.
pub const MAX_DEVICES: usize = 64;

const_assert!(MAX_DEVICES > 0);

// ============================================================================
// Records
// ============================================================================

/// One tracked device. Created by the registration pipeline and owned by the
/// registry; `driver_loaded` is the only field that mutates after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedDevice {
    /// Attachment point; the external identity of the device.
    pub location: BusLocation,
    /// Signature as read from the bus.
    pub signature: DeviceSignature,
    /// Resolved (or synthesized) device name.
    pub name: String,
    /// Resolved driver artifact path; empty for unknown devices.
    pub driver_path: String,
    /// Resolved capability flags; empty for unknown devices.
    pub flags: DriverFlags,
    /// Precedence tier of the database match, `None` for unknown devices.
    pub match_tier: Option<MatchTier>,
    /// Whether the driver has been loaded. Transitions false -> true at most
    /// once.
    pub driver_loaded: bool,
    /// Monotonic registration ordinal; never reused after removal.
    pub discovery_order: u32,
}

impl DetectedDevice {
    /// A driver artifact is associated with this device.
    pub fn has_driver(&self) -> bool {
        !self.driver_path.is_empty()
    }

    /// Boot cannot complete without this device's driver.
    pub fn is_critical(&self) -> bool {
        self.flags.contains(DriverFlags::CRITICAL)
    }
}

/// Aggregate registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Tracked devices.
    pub total: usize,
    /// Devices with a loaded driver.
    pub loaded: usize,
    /// Devices with a driver path but no loaded driver.
    pub failed: usize,
    /// Devices flagged critical.
    pub critical: usize,
}

// ============================================================================
// Registry
// ============================================================================

struct RegistryInner {
    devices: Vec<DetectedDevice>,
    next_order: u32,
}

/// Bounded, insertion-ordered collection of detected devices.
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
    database: DeviceDatabase,
}

impl DeviceRegistry {
    /// Registry over `database` with the default [`MAX_DEVICES`] ceiling.
    pub fn new(database: DeviceDatabase) -> Self {
        Self::with_capacity(database, MAX_DEVICES)
    }

    /// Registry with an explicit ceiling.
    pub fn with_capacity(database: DeviceDatabase, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                devices: Vec::new(),
                next_order: 0,
            }),
            capacity,
            database,
        }
    }

    /// Registration pipeline: resolve a signature against the database and
    /// append a tracked record.
    ///
    /// This is the only path that creates registry entries; the coldboot
    /// scanner and hotplug ADDED handling both funnel through it. A full
    /// registry or a duplicate live location drops the candidate with exactly
    /// one warning; neither is fatal to the caller.
    pub fn register(
        &self,
        signature: DeviceSignature,
        location: BusLocation,
    ) -> Result<DetectedDevice, RegisterError> {
        // lookup is pure; keep it outside the critical section
        let resolved = self.database.lookup(&signature);

        let device = {
            let mut inner = self.inner.lock();
            if inner.devices.iter().any(|d| d.location == location) {
                drop(inner);
                log::warn!("autodetect: dropping duplicate registration at {location}");
                return Err(RegisterError::DuplicateLocation(location));
            }
            if inner.devices.len() >= self.capacity {
                drop(inner);
                log::warn!(
                    "autodetect: device table full ({} entries), dropping device at {location}",
                    self.capacity
                );
                return Err(RegisterError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }

            let discovery_order = inner.next_order;
            inner.next_order += 1;

            let device = match resolved {
                Some((entry, tier)) => DetectedDevice {
                    location,
                    signature,
                    name: entry.name.to_string(),
                    driver_path: entry.driver_path.to_string(),
                    flags: entry.flags,
                    match_tier: Some(tier),
                    driver_loaded: false,
                    discovery_order,
                },
                None => DetectedDevice {
                    location,
                    signature,
                    name: format!(
                        "Unknown Device (VID:0x{:04X} DID:0x{:04X})",
                        signature.vendor_id, signature.device_id
                    ),
                    driver_path: String::new(),
                    flags: DriverFlags::empty(),
                    match_tier: None,
                    driver_loaded: false,
                    discovery_order,
                },
            };
            inner.devices.push(device.clone());
            device
        };

        match device.match_tier {
            Some(_) => log::info!(
                "autodetect: found {} at {} (VID:0x{:04X} DID:0x{:04X})",
                device.name,
                device.location,
                signature.vendor_id,
                signature.device_id
            ),
            None => log::info!(
                "autodetect: unknown device at {} (VID:0x{:04X} DID:0x{:04X} Class:0x{:04X})",
                device.location,
                signature.vendor_id,
                signature.device_id,
                signature.class_code
            ),
        }
        Ok(device)
    }

    /// Copy-consistent snapshot capped at `limit`, one lock acquisition.
    pub fn get_devices(&self, limit: usize) -> Vec<DetectedDevice> {
        let inner = self.inner.lock();
        inner.devices.iter().take(limit).cloned().collect()
    }

    /// Aggregate counters, one lock acquisition.
    pub fn stats(&self) -> DriverStats {
        let inner = self.inner.lock();
        let mut stats = DriverStats {
            total: inner.devices.len(),
            ..DriverStats::default()
        };
        for device in &inner.devices {
            if device.driver_loaded {
                stats.loaded += 1;
            } else if device.has_driver() {
                stats.failed += 1;
            }
            if device.is_critical() {
                stats.critical += 1;
            }
        }
        stats
    }

    /// Tracked-device count.
    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the record at `location`.
    pub fn find(&self, location: BusLocation) -> Option<DetectedDevice> {
        let inner = self.inner.lock();
        inner.devices.iter().find(|d| d.location == location).cloned()
    }

    /// Full snapshot in discovery order, one lock acquisition.
    pub(crate) fn snapshot(&self) -> Vec<DetectedDevice> {
        self.inner.lock().devices.clone()
    }

    /// Flip `driver_loaded` for the device at `location`. Returns false if
    /// the device was removed while its load ran.
    pub(crate) fn mark_loaded(&self, location: BusLocation) -> bool {
        let mut inner = self.inner.lock();
        match inner.devices.iter_mut().find(|d| d.location == location) {
            Some(device) => {
                device.driver_loaded = true;
                true
            }
            None => false,
        }
    }

    /// Remove the device at `location`, compacting the list. Discovery-order
    /// ordinals of the remaining devices are unaffected.
    pub(crate) fn remove(&self, location: BusLocation) -> Option<DetectedDevice> {
        let mut inner = self.inner.lock();
        let index = inner.devices.iter().position(|d| d.location == location)?;
        Some(inner.devices.remove(index))
    }
}

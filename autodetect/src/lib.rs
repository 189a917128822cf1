//! Hardware auto-detection and driver loading.
//!
//! This crate provides the device auto-detection subsystem used during boot:
//! it enumerates devices on the supported buses, matches each against a
//! static capability database, and orchestrates ordered driver loading
//! (critical devices before non-critical), then keeps tracking runtime
//! hotplug add/remove events against the same shared registry.
//!
//! # Architecture
//!
//! The subsystem is organized into several functional domains:
//!
//! - **Database**: static capability table and tiered signature matcher
//! - **Bus**: bus locations and the bus access collaborator trait
//! - **Registry**: the shared device inventory and registration pipeline
//! - **Scanner**: one-shot coldboot bus walk
//! - **Loader**: two-pass driver load orchestration
//! - **Hotplug**: serialized runtime add/remove handling
//!
//! Splash rendering, boot progress sequencing, bootloader entry, raw bus
//! protocol access, and the mechanics of linking a driver artifact are
//! external collaborators, consumed through the [`BusAccess`] and
//! [`DriverHost`] traits.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use autodetect::{Autodetect, BusAccess, DetectedDevice, DeviceSignature,
//!                  DriverHost, LoadError, PciProbe, SubsystemInitError};
//!
//! struct NullBus;
//!
//! impl BusAccess for NullBus {
//!     fn init_pci(&self) -> Result<(), SubsystemInitError> { Ok(()) }
//!     fn init_usb(&self) -> Result<(), SubsystemInitError> { Ok(()) }
//!     fn arm_hotplug(&self) -> Result<(), SubsystemInitError> { Ok(()) }
//!     fn read_pci(&self, _: u8, _: u8, _: u8) -> Option<PciProbe> { None }
//!     fn read_usb(&self, _: u8, _: u8) -> Option<DeviceSignature> { None }
//!     fn probe_ps2_keyboard(&self) -> bool { false }
//!     fn probe_ps2_mouse(&self) -> bool { false }
//! }
//!
//! struct NullHost;
//!
//! impl DriverHost for NullHost {
//!     fn file_exists(&self, _: &str) -> bool { true }
//!     fn load_kernel_module(&self, _: &str, _: &DetectedDevice) -> Result<(), LoadError> { Ok(()) }
//!     fn load_user_driver(&self, _: &str, _: &DetectedDevice) -> Result<(), LoadError> { Ok(()) }
//!     fn unload_driver(&self, _: &str, _: &DetectedDevice) -> Result<(), LoadError> { Ok(()) }
//! }
//!
//! let autodetect = Autodetect::new(Arc::new(NullBus), Arc::new(NullHost));
//! autodetect.init().unwrap();
//! assert_eq!(autodetect.get_stats().total, 0);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod database;
pub mod error;
pub mod hotplug;
pub mod loader;
pub mod registry;
pub mod scanner;

pub use bus::{BusAccess, BusLocation, LegacyPort, PciProbe, USB_BUS_LIMIT, USB_PORT_LIMIT};
pub use database::{
    DEVICE_DATABASE, DeviceDatabase, DeviceSignature, DriverCapability, DriverFlags, INVALID_VENDOR,
    MatchTier, WILDCARD_ID,
};
pub use error::{AutodetectError, LoadError, RegisterError, SubsystemInitError};
pub use hotplug::{HotplugEvent, HotplugEventKind, HotplugMonitor};
pub use loader::{DriverHost, LoadMode, LoadOrchestrator};
pub use registry::{DetectedDevice, DeviceRegistry, DriverStats, MAX_DEVICES};
pub use scanner::BusScanner;

use alloc::sync::Arc;
use alloc::vec::Vec;

/// Auto-detect subsystem facade.
///
/// Explicitly constructed and owned by the boot sequence; there is no ambient
/// singleton. The registry is the sole shared mutable state, safe to query
/// concurrently with scanning and hotplug handling.
pub struct Autodetect {
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn BusAccess>,
    host: Arc<dyn DriverHost>,
    monitor: HotplugMonitor,
}

impl Autodetect {
    /// Subsystem over the compiled capability database.
    pub fn new(bus: Arc<dyn BusAccess>, host: Arc<dyn DriverHost>) -> Self {
        Self::with_registry(bus, host, Arc::new(DeviceRegistry::new(DeviceDatabase::compiled())))
    }

    /// Subsystem over an explicit registry (custom database or capacity).
    pub fn with_registry(
        bus: Arc<dyn BusAccess>,
        host: Arc<dyn DriverHost>,
        registry: Arc<DeviceRegistry>,
    ) -> Self {
        let monitor = HotplugMonitor::new(registry.clone(), host.clone());
        Self {
            registry,
            bus,
            host,
            monitor,
        }
    }

    /// Coldboot entry point: bus bring-up, one-shot scan, both load passes,
    /// hotplug arming.
    ///
    /// Fails only on PCI-subsystem init failure or a critical-device load
    /// failure; USB and hotplug bring-up degrade with a warning.
    pub fn init(&self) -> Result<(), AutodetectError> {
        log::info!("autodetect: initializing driver auto-detection");

        if let Err(err) = self.bus.init_pci() {
            log::error!("autodetect: failed to initialize PCI subsystem: {err}");
            return Err(AutodetectError::SubsystemInit(err));
        }

        let usb_available = match self.bus.init_usb() {
            Ok(()) => true,
            Err(err) => {
                // continue without USB
                log::warn!("autodetect: USB subsystem unavailable: {err}");
                false
            }
        };

        BusScanner::new(self.bus.as_ref(), &self.registry).scan(usb_available);

        LoadOrchestrator::new(self.host.as_ref(), &self.registry).run_passes()?;

        if let Err(err) = self.bus.arm_hotplug() {
            // continue without hotplug
            log::warn!("autodetect: hotplug monitoring unavailable: {err}");
        }

        log::info!(
            "autodetect: initialization complete, {} devices tracked",
            self.registry.len()
        );
        Ok(())
    }

    /// Ordered inventory snapshot capped at `limit`.
    pub fn get_devices(&self, limit: usize) -> Vec<DetectedDevice> {
        self.registry.get_devices(limit)
    }

    /// Aggregate counters over the inventory.
    pub fn get_stats(&self) -> DriverStats {
        self.registry.stats()
    }

    /// Entry point registered with the bus notification mechanisms.
    pub fn hotplug_callback(&self, event: HotplugEvent) {
        self.monitor.on_event(event);
    }

    /// The shared device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}

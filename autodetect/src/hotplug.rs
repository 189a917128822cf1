//! Hotplug event monitor.
//!
//! Single event-driven entry point reusing the registration pipeline and the
//! single-device load path. Events are serialized by a monitor-level mutex:
//! one event runs to completion before the next is handled, so no two events
//! for the same bus location interleave.

use alloc::sync::Arc;

use spin::Mutex;

use crate::bus::BusLocation;
use crate::database::{DeviceSignature, DriverFlags};
use crate::loader::{DriverHost, LoadOrchestrator};
use crate::registry::DeviceRegistry;

/// Event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEventKind {
    /// A device appeared at the location.
    Added,
    /// The device at the location went away.
    Removed,
}

/// Runtime device add/remove notification. Transient: consumed synchronously,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotplugEvent {
    pub kind: HotplugEventKind,
    pub signature: DeviceSignature,
    pub location: BusLocation,
}

/// Serialized hotplug event handler.
pub struct HotplugMonitor {
    registry: Arc<DeviceRegistry>,
    host: Arc<dyn DriverHost>,
    // Serializes event processing; never held across a registry lock the
    // other way around.
    event_gate: Mutex<()>,
}

impl HotplugMonitor {
    pub fn new(registry: Arc<DeviceRegistry>, host: Arc<dyn DriverHost>) -> Self {
        Self {
            registry,
            host,
            event_gate: Mutex::new(()),
        }
    }

    /// Process one event to completion.
    pub fn on_event(&self, event: HotplugEvent) {
        let _gate = self.event_gate.lock();
        match event.kind {
            HotplugEventKind::Added => self.handle_added(event),
            HotplugEventKind::Removed => self.handle_removed(event),
        }
    }

    fn handle_added(&self, event: HotplugEvent) {
        log::info!(
            "autodetect: device added at {} (VID:0x{:04X} DID:0x{:04X})",
            event.location,
            event.signature.vendor_id,
            event.signature.device_id
        );

        let device = match self.registry.register(event.signature, event.location) {
            Ok(device) => device,
            // drop already logged by the pipeline
            Err(_) => return,
        };

        // Hotplug loading is opt-in per capability; everything else stays
        // registered but unloaded.
        if !device.flags.contains(DriverFlags::HOTPLUG) {
            return;
        }

        let orchestrator = LoadOrchestrator::new(self.host.as_ref(), &self.registry);
        match orchestrator.load_one(&device) {
            Ok(()) => log::info!("autodetect: hotplug driver loaded: {}", device.name),
            Err(cause) => log::warn!(
                "autodetect: hotplug driver load failed for {}: {cause}",
                device.name
            ),
        }
    }

    fn handle_removed(&self, event: HotplugEvent) {
        let Some(device) = self.registry.find(event.location) else {
            log::warn!("autodetect: removal event for untracked location {}", event.location);
            return;
        };

        log::info!("autodetect: device removed: {} at {}", device.name, device.location);

        // Unload runs outside the registry lock; the entry is deleted after.
        if device.driver_loaded {
            if let Err(cause) = self.host.unload_driver(&device.driver_path, &device) {
                log::warn!("autodetect: unload failed for {}: {cause}", device.name);
            }
        }
        self.registry.remove(event.location);
    }
}

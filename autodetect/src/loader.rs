//! Driver load orchestration.
//!
//! Two ordered passes over a registry snapshot: critical devices first, then
//! the remaining eligible devices, each pass in strict discovery order. Load
//! and unload primitives run outside the registry lock; only the resulting
//! `driver_loaded` flag is written back under a second short acquisition.

use crate::database::DriverFlags;
use crate::error::{AutodetectError, LoadError};
use crate::registry::{DetectedDevice, DeviceRegistry};

/// Which load path a capability dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Linked into the kernel via `load_kernel_module`.
    Kernel,
    /// Spawned as a user-mode driver via `load_user_driver`.
    User,
}

impl LoadMode {
    /// Dispatch mode for a capability's flags.
    pub fn for_flags(flags: DriverFlags) -> Self {
        if flags.contains(DriverFlags::KERNEL_MODE) {
            LoadMode::Kernel
        } else {
            LoadMode::User
        }
    }
}

/// Collaborator owning driver artifacts and the load/unload mechanics.
pub trait DriverHost: Send + Sync {
    /// Whether a driver artifact is present at `path`.
    fn file_exists(&self, path: &str) -> bool;

    /// Link and start a kernel-mode driver.
    fn load_kernel_module(&self, path: &str, device: &DetectedDevice) -> Result<(), LoadError>;

    /// Start a user-mode driver.
    fn load_user_driver(&self, path: &str, device: &DetectedDevice) -> Result<(), LoadError>;

    /// Stop and unlink a previously loaded driver.
    fn unload_driver(&self, path: &str, device: &DetectedDevice) -> Result<(), LoadError>;
}

/// Two-pass driver load orchestrator.
pub struct LoadOrchestrator<'a> {
    host: &'a dyn DriverHost,
    registry: &'a DeviceRegistry,
}

impl<'a> LoadOrchestrator<'a> {
    pub fn new(host: &'a dyn DriverHost, registry: &'a DeviceRegistry) -> Self {
        Self { host, registry }
    }

    /// Run both coldboot passes. A failure on a critical device aborts with
    /// an error; every other failure degrades to one warning.
    pub fn run_passes(&self) -> Result<(), AutodetectError> {
        self.critical_pass()?;
        self.remaining_pass();
        Ok(())
    }

    fn critical_pass(&self) -> Result<(), AutodetectError> {
        log::info!("autodetect: loading critical drivers");
        for device in self.registry.snapshot() {
            if !device.is_critical() || !device.has_driver() || device.driver_loaded {
                continue;
            }
            match self.load_one(&device) {
                Ok(()) => log::info!("autodetect: loaded critical driver: {}", device.name),
                Err(cause) => {
                    log::error!(
                        "autodetect: failed to load critical driver {}: {cause}",
                        device.name
                    );
                    return Err(AutodetectError::CriticalDriverFailed {
                        device: device.name.clone(),
                        cause,
                    });
                }
            }
        }
        Ok(())
    }

    fn remaining_pass(&self) {
        log::info!("autodetect: loading remaining drivers");
        for device in self.registry.snapshot() {
            if device.is_critical() || !device.has_driver() || device.driver_loaded {
                continue;
            }
            match self.load_one(&device) {
                Ok(()) => log::info!("autodetect: loaded driver: {}", device.name),
                Err(cause) => {
                    log::warn!("autodetect: failed to load driver {}: {cause}", device.name)
                }
            }
        }
    }

    /// Load a single device's driver. Idempotent: an already-loaded device
    /// succeeds with no side effect.
    pub fn load_one(&self, device: &DetectedDevice) -> Result<(), LoadError> {
        if device.driver_loaded {
            return Ok(());
        }

        log::debug!("autodetect: loading driver {}", device.driver_path);

        if !self.host.file_exists(&device.driver_path) {
            return Err(LoadError::ArtifactMissing(device.driver_path.clone()));
        }

        match LoadMode::for_flags(device.flags) {
            LoadMode::Kernel => self.host.load_kernel_module(&device.driver_path, device)?,
            LoadMode::User => self.host.load_user_driver(&device.driver_path, device)?,
        }

        // Write-back under a second short lock acquisition; a device removed
        // while its load ran makes this a no-op.
        if !self.registry.mark_loaded(device.location) {
            log::debug!("autodetect: {} removed during load", device.location);
        }
        Ok(())
    }
}

//! Error types for the auto-detect subsystem.
//!
//! Non-fatal conditions (a dropped registration, a failed non-critical load)
//! are logged at their source and leave the device in a well-defined terminal
//! state; only [`AutodetectError`] unwinds `Autodetect::init`.

use alloc::string::String;
use core::fmt;

use crate::bus::BusLocation;

/// Failure to bring up an underlying bus subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemInitError {
    /// Subsystem that failed ("pci", "usb", "hotplug").
    pub subsystem: &'static str,
    /// Collaborator-reported reason.
    pub reason: String,
}

impl SubsystemInitError {
    pub fn new(subsystem: &'static str, reason: impl Into<String>) -> Self {
        Self {
            subsystem,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SubsystemInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} subsystem init failed: {}", self.subsystem, self.reason)
    }
}

/// Why a registration attempt was dropped. Never fatal; the candidate device
/// is discarded and the caller continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The registry already holds `capacity` devices.
    CapacityExceeded {
        /// Configured registry ceiling.
        capacity: usize,
    },
    /// A live device already occupies this bus location.
    DuplicateLocation(BusLocation),
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::CapacityExceeded { capacity } => {
                write!(f, "device registry full ({capacity} entries)")
            }
            RegisterError::DuplicateLocation(location) => {
                write!(f, "location {location} is already registered")
            }
        }
    }
}

/// Why a single driver load or unload failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Driver artifact not present at its database path.
    ArtifactMissing(String),
    /// The load or unload primitive reported failure.
    LoadFailed(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ArtifactMissing(path) => write!(f, "driver file not found: {path}"),
            LoadError::LoadFailed(reason) => write!(f, "driver load failed: {reason}"),
        }
    }
}

/// Fatal outcomes of `Autodetect::init`. The boot sequence decides
/// halt-vs-degrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutodetectError {
    /// The underlying bus layer failed to initialize.
    SubsystemInit(SubsystemInitError),
    /// A critical device's driver could not be loaded during the first pass.
    CriticalDriverFailed {
        /// Resolved device name.
        device: String,
        /// Underlying load failure.
        cause: LoadError,
    },
}

impl fmt::Display for AutodetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutodetectError::SubsystemInit(err) => write!(f, "{err}"),
            AutodetectError::CriticalDriverFailed { device, cause } => {
                write!(f, "critical driver for {device} failed: {cause}")
            }
        }
    }
}

impl From<SubsystemInitError> for AutodetectError {
    fn from(err: SubsystemInitError) -> Self {
        AutodetectError::SubsystemInit(err)
    }
}

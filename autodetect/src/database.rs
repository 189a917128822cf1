//! Device capability database and signature matching.
//!
//! This module provides the static capability table consulted at registration
//! time and the tiered matcher that resolves a hardware signature to a driver
//! description. The table is compiled in, immutable, and scanned in declared
//! order; declaration order only breaks ties within a precedence tier.

use bitflags::bitflags;

// ============================================================================
// Signatures
// ============================================================================

/// Wildcard sentinel, valid in database patterns only.
pub const WILDCARD_ID: u16 = 0x0000;

/// Invalid-vendor sentinel returned when probing an absent bus location.
pub const INVALID_VENDOR: u16 = 0xFFFF;

/// Hardware identification as read from a bus or declared in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSignature {
    /// Vendor ID
    pub vendor_id: u16,
    /// Device ID
    pub device_id: u16,
    /// Class code
    pub class_code: u16,
    /// Subclass
    pub subclass: u16,
}

impl DeviceSignature {
    /// Create a new signature.
    pub const fn new(vendor_id: u16, device_id: u16, class_code: u16, subclass: u16) -> Self {
        Self {
            vendor_id,
            device_id,
            class_code,
            subclass,
        }
    }
}

bitflags! {
    /// Driver capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriverFlags: u32 {
        /// Driver loads as a kernel module.
        const KERNEL_MODE = 0x001;
        /// Driver loads as a user-mode process.
        const USER_MODE   = 0x002;
        /// Boot cannot complete without this driver.
        const CRITICAL    = 0x004;
        /// Driver is best-effort.
        const OPTIONAL    = 0x008;
        /// Driver may be loaded in response to a hotplug event.
        const HOTPLUG     = 0x010;
    }
}

/// Precedence level of the database entry that matched a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// Vendor and device IDs both equal.
    Exact,
    /// Vendor and class equal, device ID wildcarded.
    Class,
    /// Vendor and device wildcarded, class and subclass equal.
    Generic,
}

// ============================================================================
// Capability table
// ============================================================================

/// One entry of the static capability table.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapability {
    /// Signature pattern; `0x0000` fields are wildcards.
    pub pattern: DeviceSignature,
    /// Human-readable device name.
    pub name: &'static str,
    /// Path of the driver artifact.
    pub driver_path: &'static str,
    /// Load mode and policy flags.
    pub flags: DriverFlags,
}

impl DriverCapability {
    const fn new(
        vendor_id: u16,
        device_id: u16,
        class_code: u16,
        subclass: u16,
        name: &'static str,
        driver_path: &'static str,
        flags: DriverFlags,
    ) -> Self {
        Self {
            pattern: DeviceSignature::new(vendor_id, device_id, class_code, subclass),
            name,
            driver_path,
            flags,
        }
    }
}

/// Compiled capability table: the hardware supported out of the box.
pub static DEVICE_DATABASE: &[DriverCapability] = &[
    // Graphics cards
    DriverCapability::new(0x10DE, 0x0000, 0x0300, 0x00, "NVIDIA Graphics", "/drivers/nvidia.drv", DriverFlags::USER_MODE),
    DriverCapability::new(0x1002, 0x0000, 0x0300, 0x00, "AMD Graphics", "/drivers/amd.drv", DriverFlags::USER_MODE),
    DriverCapability::new(0x8086, 0x0000, 0x0300, 0x00, "Intel Graphics", "/drivers/intel_gfx.drv", DriverFlags::USER_MODE),
    // Network cards
    DriverCapability::new(0x8086, 0x0000, 0x0200, 0x00, "Intel Ethernet", "/drivers/intel_net.drv", DriverFlags::KERNEL_MODE),
    DriverCapability::new(0x10EC, 0x8139, 0x0200, 0x00, "Realtek RTL8139", "/drivers/rtl8139.drv", DriverFlags::KERNEL_MODE),
    DriverCapability::new(0x10EC, 0x8168, 0x0200, 0x00, "Realtek RTL8168", "/drivers/rtl8168.drv", DriverFlags::KERNEL_MODE),
    // Audio devices
    DriverCapability::new(0x8086, 0x0000, 0x0403, 0x00, "Intel HD Audio", "/drivers/hda.drv", DriverFlags::USER_MODE),
    DriverCapability::new(0x1102, 0x0000, 0x0401, 0x00, "Creative Sound", "/drivers/creative.drv", DriverFlags::USER_MODE),
    // Storage controllers
    DriverCapability::new(0x8086, 0x0000, 0x0101, 0x00, "Intel SATA", "/drivers/ahci.drv", DriverFlags::KERNEL_MODE.union(DriverFlags::CRITICAL)),
    DriverCapability::new(0x1095, 0x0000, 0x0101, 0x00, "Silicon Image SATA", "/drivers/sii.drv", DriverFlags::KERNEL_MODE),
    // USB controllers
    DriverCapability::new(0x8086, 0x0000, 0x0C03, 0x00, "Intel USB", "/drivers/ehci.drv", DriverFlags::KERNEL_MODE.union(DriverFlags::HOTPLUG)),
    DriverCapability::new(0x1106, 0x0000, 0x0C03, 0x00, "VIA USB", "/drivers/uhci.drv", DriverFlags::KERNEL_MODE.union(DriverFlags::HOTPLUG)),
    // Input devices
    DriverCapability::new(0x0000, 0x0000, 0x0900, 0x00, "PS/2 Keyboard", "/drivers/ps2_kbd.drv", DriverFlags::KERNEL_MODE),
    DriverCapability::new(0x0000, 0x0000, 0x0900, 0x01, "PS/2 Mouse", "/drivers/ps2_mouse.drv", DriverFlags::KERNEL_MODE),
];

// ============================================================================
// Matcher
// ============================================================================

/// Read-only view over a capability table with tiered lookup.
#[derive(Debug, Clone, Copy)]
pub struct DeviceDatabase {
    entries: &'static [DriverCapability],
}

impl DeviceDatabase {
    /// Wrap an explicit capability table.
    pub const fn new(entries: &'static [DriverCapability]) -> Self {
        Self { entries }
    }

    /// The compiled-in table.
    pub const fn compiled() -> Self {
        Self::new(DEVICE_DATABASE)
    }

    /// Resolve a signature to a capability, most specific tier first.
    ///
    /// Evaluates the table in three precedence tiers (exact device, then
    /// vendor class, then generic class); the first in-tier hit wins. `None`
    /// is a valid outcome, not an error: the caller registers the device as
    /// unknown.
    pub fn lookup(&self, signature: &DeviceSignature) -> Option<(&'static DriverCapability, MatchTier)> {
        let exact = self.entries.iter().find(|entry| {
            entry.pattern.vendor_id != WILDCARD_ID
                && entry.pattern.device_id != WILDCARD_ID
                && entry.pattern.vendor_id == signature.vendor_id
                && entry.pattern.device_id == signature.device_id
        });
        if let Some(entry) = exact {
            return Some((entry, MatchTier::Exact));
        }

        let class = self.entries.iter().find(|entry| {
            entry.pattern.vendor_id != WILDCARD_ID
                && entry.pattern.device_id == WILDCARD_ID
                && entry.pattern.vendor_id == signature.vendor_id
                && entry.pattern.class_code == signature.class_code
        });
        if let Some(entry) = class {
            return Some((entry, MatchTier::Class));
        }

        let generic = self.entries.iter().find(|entry| {
            entry.pattern.vendor_id == WILDCARD_ID
                && entry.pattern.device_id == WILDCARD_ID
                && entry.pattern.class_code == signature.class_code
                && entry.pattern.subclass == signature.subclass
        });
        generic.map(|entry| (entry, MatchTier::Generic))
    }
}

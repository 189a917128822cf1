//! Bus locations and the bus access collaborator.
//!
//! Low-level bus protocol access (PCI configuration space, USB descriptors,
//! legacy port probing) lives behind the [`BusAccess`] trait; this subsystem
//! only consumes probe results.

use core::fmt;

use static_assertions::const_assert;

use crate::database::DeviceSignature;
use crate::error::SubsystemInitError;

/// USB topology walk ceiling: root buses.
pub const USB_BUS_LIMIT: u8 = 4;

/// USB topology walk ceiling: ports per bus.
pub const USB_PORT_LIMIT: u8 = 16;

const_assert!(USB_BUS_LIMIT > 0);
const_assert!(USB_PORT_LIMIT > 0);

/// Legacy (non-enumerable) device attachment points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPort {
    /// PS/2 keyboard port
    Ps2Keyboard,
    /// PS/2 mouse port
    Ps2Mouse,
}

/// Physical attachment point of a device. Location equality is the identity
/// used by hotplug removal and by external consumers; positional indices into
/// the registry are unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusLocation {
    /// PCI bus/device/function triple.
    Pci { bus: u8, device: u8, function: u8 },
    /// USB bus/port pair.
    Usb { bus: u8, port: u8 },
    /// Legacy port.
    Legacy { port: LegacyPort },
}

impl fmt::Display for BusLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusLocation::Pci { bus, device, function } => {
                write!(f, "pci {bus:02x}:{device:02x}.{function}")
            }
            BusLocation::Usb { bus, port } => write!(f, "usb {bus}-{port}"),
            BusLocation::Legacy { port: LegacyPort::Ps2Keyboard } => write!(f, "legacy/ps2-keyboard"),
            BusLocation::Legacy { port: LegacyPort::Ps2Mouse } => write!(f, "legacy/ps2-mouse"),
        }
    }
}

/// Result of probing one PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciProbe {
    /// Signature read from the configuration header.
    pub signature: DeviceSignature,
    /// Multi-function bit of the header type. When clear on function 0,
    /// functions 1-7 of the location are not scanned.
    pub multi_function: bool,
}

/// Bus-layer collaborator consumed by the scanner and hotplug arming.
pub trait BusAccess: Send + Sync {
    /// Bring up the PCI subsystem. Failure is fatal to autodetect init.
    fn init_pci(&self) -> Result<(), SubsystemInitError>;

    /// Bring up the USB subsystem. Failure degrades to a PCI-only scan.
    fn init_usb(&self) -> Result<(), SubsystemInitError>;

    /// Register the subsystem's callback with the bus notification
    /// mechanisms. Failure degrades to coldboot-only operation.
    fn arm_hotplug(&self) -> Result<(), SubsystemInitError>;

    /// Probe one PCI function. `None` means the location is absent.
    fn read_pci(&self, bus: u8, device: u8, function: u8) -> Option<PciProbe>;

    /// Probe one USB port. `None` means no device is attached.
    fn read_usb(&self, bus: u8, port: u8) -> Option<DeviceSignature>;

    /// Probe for a PS/2 keyboard.
    fn probe_ps2_keyboard(&self) -> bool;

    /// Probe for a PS/2 mouse.
    fn probe_ps2_mouse(&self) -> bool;
}

//! Coldboot bus scanner.
//!
//! Exhaustively walks the supported bus address spaces once at boot, feeding
//! every valid read synchronously into the registration pipeline. Scan order
//! is deterministic: bus ascending, then device, then function (PCI), then
//! the USB topology walk, then legacy probes.

use crate::bus::{BusAccess, BusLocation, LegacyPort, USB_BUS_LIMIT, USB_PORT_LIMIT};
use crate::database::{DeviceSignature, INVALID_VENDOR};
use crate::registry::DeviceRegistry;

/// Synthesized signature for a PS/2 keyboard; resolves through the generic
/// input-class database entries.
const PS2_KEYBOARD_SIGNATURE: DeviceSignature = DeviceSignature::new(0x0000, 0x0000, 0x0900, 0x00);

/// Synthesized signature for a PS/2 mouse.
const PS2_MOUSE_SIGNATURE: DeviceSignature = DeviceSignature::new(0x0000, 0x0000, 0x0900, 0x01);

/// One-shot coldboot scanner. Never concurrent with itself.
pub struct BusScanner<'a> {
    bus: &'a dyn BusAccess,
    registry: &'a DeviceRegistry,
}

impl<'a> BusScanner<'a> {
    pub fn new(bus: &'a dyn BusAccess, registry: &'a DeviceRegistry) -> Self {
        Self { bus, registry }
    }

    /// Walk every supported bus. `usb_available` is false when the USB
    /// subsystem failed to initialize; the walk then degrades to PCI plus
    /// legacy probes.
    pub fn scan(&self, usb_available: bool) {
        self.scan_pci();
        if usb_available {
            self.scan_usb();
        }
        self.scan_legacy();
    }

    fn scan_pci(&self) {
        log::info!("autodetect: scanning PCI bus");
        for bus in 0..=u8::MAX {
            for device in 0..32u8 {
                for function in 0..8u8 {
                    let probe = match self.bus.read_pci(bus, device, function) {
                        Some(probe) => probe,
                        None => {
                            // Absent function 0 has no header, so no
                            // multi-function bit either: skip functions 1-7.
                            if function == 0 {
                                break;
                            }
                            continue;
                        }
                    };
                    if probe.signature.vendor_id == INVALID_VENDOR {
                        if function == 0 {
                            break;
                        }
                        continue;
                    }

                    self.submit(probe.signature, BusLocation::Pci { bus, device, function });

                    if function == 0 && !probe.multi_function {
                        break;
                    }
                }
            }
        }
    }

    fn scan_usb(&self) {
        log::info!("autodetect: scanning USB topology");
        for bus in 0..USB_BUS_LIMIT {
            for port in 0..USB_PORT_LIMIT {
                let Some(signature) = self.bus.read_usb(bus, port) else {
                    continue;
                };
                if signature.vendor_id == INVALID_VENDOR {
                    continue;
                }
                self.submit(signature, BusLocation::Usb { bus, port });
            }
        }
    }

    fn scan_legacy(&self) {
        log::info!("autodetect: scanning legacy devices");
        if self.bus.probe_ps2_keyboard() {
            self.submit(
                PS2_KEYBOARD_SIGNATURE,
                BusLocation::Legacy { port: LegacyPort::Ps2Keyboard },
            );
        }
        if self.bus.probe_ps2_mouse() {
            self.submit(
                PS2_MOUSE_SIGNATURE,
                BusLocation::Legacy { port: LegacyPort::Ps2Mouse },
            );
        }
    }

    fn submit(&self, signature: DeviceSignature, location: BusLocation) {
        // Drops are logged by the registration pipeline and never abort a scan.
        let _ = self.registry.register(signature, location);
    }
}

//! Subsystem scenario tests.
//!
//! Drives the full coldboot-scan / two-pass-load / hotplug flow against
//! hand-built bus and host fixtures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use autodetect::{
    Autodetect, AutodetectError, BusAccess, BusLocation, DetectedDevice, DeviceDatabase,
    DeviceRegistry, DeviceSignature, DriverHost, HotplugEvent, HotplugEventKind, LoadError,
    LoadOrchestrator, MatchTier, PciProbe, SubsystemInitError, INVALID_VENDOR,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Class-tier hit on "Intel SATA" (KERNEL_MODE | CRITICAL, /drivers/ahci.drv).
const SATA: DeviceSignature = DeviceSignature::new(0x8086, 0x2922, 0x0101, 0x00);
/// Class-tier hit on "NVIDIA Graphics" (USER_MODE, /drivers/nvidia.drv).
const GFX: DeviceSignature = DeviceSignature::new(0x10DE, 0x2204, 0x0300, 0x00);
/// Exact-tier hit on "Realtek RTL8139" (KERNEL_MODE, /drivers/rtl8139.drv).
const NIC: DeviceSignature = DeviceSignature::new(0x10EC, 0x8139, 0x0200, 0x00);
/// Class-tier hit on "Intel USB" (KERNEL_MODE | HOTPLUG, /drivers/ehci.drv).
const USBC: DeviceSignature = DeviceSignature::new(0x8086, 0x1E31, 0x0C03, 0x00);
/// No database entry.
const MYSTERY: DeviceSignature = DeviceSignature::new(0xABCD, 0x0001, 0x0999, 0x00);

#[derive(Default)]
struct FakeBus {
    pci: BTreeMap<(u8, u8, u8), PciProbe>,
    usb: BTreeMap<(u8, u8), DeviceSignature>,
    ps2_keyboard: bool,
    ps2_mouse: bool,
    invalid_everywhere: bool,
    fail_pci_init: bool,
    fail_usb_init: bool,
    fail_hotplug_arm: bool,
}

impl FakeBus {
    fn pci_at(mut self, bus: u8, device: u8, function: u8, signature: DeviceSignature) -> Self {
        self.pci.insert(
            (bus, device, function),
            PciProbe {
                signature,
                multi_function: false,
            },
        );
        self
    }

    fn multi_function_pci_at(
        mut self,
        bus: u8,
        device: u8,
        function: u8,
        signature: DeviceSignature,
    ) -> Self {
        self.pci.insert(
            (bus, device, function),
            PciProbe {
                signature,
                multi_function: true,
            },
        );
        self
    }

    fn usb_at(mut self, bus: u8, port: u8, signature: DeviceSignature) -> Self {
        self.usb.insert((bus, port), signature);
        self
    }
}

impl BusAccess for FakeBus {
    fn init_pci(&self) -> Result<(), SubsystemInitError> {
        if self.fail_pci_init {
            Err(SubsystemInitError::new("pci", "host bridge not responding"))
        } else {
            Ok(())
        }
    }

    fn init_usb(&self) -> Result<(), SubsystemInitError> {
        if self.fail_usb_init {
            Err(SubsystemInitError::new("usb", "no host controller"))
        } else {
            Ok(())
        }
    }

    fn arm_hotplug(&self) -> Result<(), SubsystemInitError> {
        if self.fail_hotplug_arm {
            Err(SubsystemInitError::new("hotplug", "notification line unavailable"))
        } else {
            Ok(())
        }
    }

    fn read_pci(&self, bus: u8, device: u8, function: u8) -> Option<PciProbe> {
        if self.invalid_everywhere {
            return Some(PciProbe {
                signature: DeviceSignature::new(INVALID_VENDOR, INVALID_VENDOR, 0, 0),
                multi_function: false,
            });
        }
        self.pci.get(&(bus, device, function)).copied()
    }

    fn read_usb(&self, bus: u8, port: u8) -> Option<DeviceSignature> {
        self.usb.get(&(bus, port)).copied()
    }

    fn probe_ps2_keyboard(&self) -> bool {
        self.ps2_keyboard
    }

    fn probe_ps2_mouse(&self) -> bool {
        self.ps2_mouse
    }
}

/// Recording driver host. `missing` paths fail the existence check; `failing`
/// paths fail the load primitive itself.
#[derive(Default)]
struct FakeHost {
    missing: BTreeSet<&'static str>,
    failing: BTreeSet<&'static str>,
    loaded: StdMutex<Vec<(String, bool)>>,
    unloaded: StdMutex<Vec<String>>,
}

impl FakeHost {
    fn missing(mut self, path: &'static str) -> Self {
        self.missing.insert(path);
        self
    }

    fn failing(mut self, path: &'static str) -> Self {
        self.failing.insert(path);
        self
    }

    fn loaded_paths(&self) -> Vec<String> {
        self.loaded.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn unloaded_paths(&self) -> Vec<String> {
        self.unloaded.lock().unwrap().clone()
    }

    fn record_load(&self, path: &str, kernel_mode: bool) -> Result<(), LoadError> {
        if self.failing.contains(path) {
            return Err(LoadError::LoadFailed(format!("{path}: relocation error")));
        }
        self.loaded.lock().unwrap().push((path.to_string(), kernel_mode));
        Ok(())
    }
}

impl DriverHost for FakeHost {
    fn file_exists(&self, path: &str) -> bool {
        !self.missing.contains(path)
    }

    fn load_kernel_module(&self, path: &str, _device: &DetectedDevice) -> Result<(), LoadError> {
        self.record_load(path, true)
    }

    fn load_user_driver(&self, path: &str, _device: &DetectedDevice) -> Result<(), LoadError> {
        self.record_load(path, false)
    }

    fn unload_driver(&self, path: &str, _device: &DetectedDevice) -> Result<(), LoadError> {
        self.unloaded.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

fn subsystem(bus: FakeBus, host: FakeHost) -> (Autodetect, Arc<FakeHost>) {
    let host = Arc::new(host);
    let autodetect = Autodetect::new(Arc::new(bus), host.clone());
    (autodetect, host)
}

fn pci(bus: u8, device: u8, function: u8) -> BusLocation {
    BusLocation::Pci { bus, device, function }
}

fn added(signature: DeviceSignature, location: BusLocation) -> HotplugEvent {
    HotplugEvent {
        kind: HotplugEventKind::Added,
        signature,
        location,
    }
}

fn removed(signature: DeviceSignature, location: BusLocation) -> HotplugEvent {
    HotplugEvent {
        kind: HotplugEventKind::Removed,
        signature,
        location,
    }
}

// ============================================================================
// Coldboot
// ============================================================================

#[test]
fn coldboot_loads_critical_first_then_discovery_order() {
    let bus = FakeBus::default()
        .pci_at(0, 0, 0, GFX)
        .pci_at(0, 2, 0, SATA)
        .pci_at(0, 3, 0, NIC);
    let (autodetect, host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    // SATA is discovered second but its critical pass runs first; the
    // remaining pass keeps discovery order.
    assert_eq!(
        host.loaded_paths(),
        ["/drivers/ahci.drv", "/drivers/nvidia.drv", "/drivers/rtl8139.drv"]
    );

    let stats = autodetect.get_stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.loaded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.critical, 1);

    // kernel-mode vs user-mode dispatch
    let modes: Vec<(String, bool)> = host.loaded.lock().unwrap().clone();
    assert_eq!(modes[0], ("/drivers/ahci.drv".to_string(), true));
    assert_eq!(modes[1], ("/drivers/nvidia.drv".to_string(), false));
}

#[test]
fn coldboot_records_match_tiers() {
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX).pci_at(0, 3, 0, NIC);
    let (autodetect, _host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].match_tier, Some(MatchTier::Class));
    assert_eq!(devices[1].match_tier, Some(MatchTier::Exact));
}

#[test]
fn all_invalid_vendor_reads_leave_registry_empty() {
    let bus = FakeBus {
        invalid_everywhere: true,
        ..FakeBus::default()
    };
    let (autodetect, host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    assert!(autodetect.get_devices(usize::MAX).is_empty());
    assert_eq!(autodetect.get_stats().total, 0);
    assert!(host.loaded_paths().is_empty());
}

#[test]
fn functions_past_a_single_function_header_are_skipped() {
    // function 1 exists behind a non-multi-function function 0; it must not
    // be visited
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX).pci_at(0, 0, 1, NIC);
    let (autodetect, _host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].location, pci(0, 0, 0));
}

#[test]
fn multi_function_header_exposes_secondary_functions() {
    let bus = FakeBus::default()
        .multi_function_pci_at(0, 0, 0, GFX)
        .pci_at(0, 0, 1, NIC);
    let (autodetect, _host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();

    assert_eq!(autodetect.get_devices(usize::MAX).len(), 2);
}

#[test]
fn unknown_device_is_tracked_but_never_loaded() {
    let bus = FakeBus::default().pci_at(0, 0, 0, MYSTERY);
    let (autodetect, host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    let stats = autodetect.get_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.loaded, 0);
    assert_eq!(stats.failed, 0);
    assert!(host.loaded_paths().is_empty());
}

#[test]
fn usb_and_legacy_devices_are_scanned_after_pci() {
    let bus = FakeBus {
        ps2_keyboard: true,
        ps2_mouse: true,
        ..FakeBus::default()
    }
    .pci_at(0, 0, 0, SATA)
    .usb_at(0, 3, DeviceSignature::new(0x1106, 0x3038, 0x0C03, 0x00));
    let (autodetect, _host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["Intel SATA", "VIA USB", "PS/2 Keyboard", "PS/2 Mouse"]);
    assert_eq!(devices[2].match_tier, Some(MatchTier::Generic));
}

// ============================================================================
// Severity policy
// ============================================================================

#[test]
fn missing_critical_artifact_fails_init() {
    let bus = FakeBus::default().pci_at(0, 2, 0, SATA);
    let host = FakeHost::default().missing("/drivers/ahci.drv");
    let (autodetect, _host) = subsystem(bus, host);

    let err = autodetect.init().unwrap_err();
    match err {
        AutodetectError::CriticalDriverFailed { device, cause } => {
            assert_eq!(device, "Intel SATA");
            assert_eq!(cause, LoadError::ArtifactMissing("/drivers/ahci.drv".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the device stays registered in its terminal state
    let stats = autodetect.get_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
}

#[test]
fn missing_optional_artifact_degrades_to_warning() {
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX).pci_at(0, 3, 0, NIC);
    let host = FakeHost::default().missing("/drivers/nvidia.drv");
    let (autodetect, host) = subsystem(bus, host);

    autodetect.init().unwrap();

    let stats = autodetect.get_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(host.loaded_paths(), ["/drivers/rtl8139.drv"]);
}

#[test]
fn noncritical_load_failure_does_not_stop_the_pass() {
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX).pci_at(0, 3, 0, NIC);
    let host = FakeHost::default().failing("/drivers/nvidia.drv");
    let (autodetect, host) = subsystem(bus, host);

    autodetect.init().unwrap();
    assert_eq!(host.loaded_paths(), ["/drivers/rtl8139.drv"]);
}

#[test]
fn critical_load_failure_fails_init() {
    let bus = FakeBus::default().pci_at(0, 2, 0, SATA);
    let host = FakeHost::default().failing("/drivers/ahci.drv");
    let (autodetect, _host) = subsystem(bus, host);

    assert!(matches!(
        autodetect.init(),
        Err(AutodetectError::CriticalDriverFailed { .. })
    ));
}

#[test]
fn critical_artifacts_present_means_all_critical_loaded() {
    let bus = FakeBus::default().pci_at(0, 2, 0, SATA).pci_at(1, 4, 0, GFX);
    let (autodetect, _host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    let critical_loaded = devices.iter().filter(|d| d.is_critical() && d.driver_loaded).count();
    assert_eq!(critical_loaded, autodetect.get_stats().critical);
}

// ============================================================================
// Subsystem bring-up
// ============================================================================

#[test]
fn pci_init_failure_is_fatal() {
    let bus = FakeBus {
        fail_pci_init: true,
        ..FakeBus::default()
    };
    let (autodetect, _host) = subsystem(bus, FakeHost::default());

    match autodetect.init().unwrap_err() {
        AutodetectError::SubsystemInit(err) => assert_eq!(err.subsystem, "pci"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn usb_init_failure_degrades_to_pci_only_scan() {
    let bus = FakeBus {
        fail_usb_init: true,
        ..FakeBus::default()
    }
    .pci_at(0, 0, 0, NIC)
    .usb_at(0, 3, DeviceSignature::new(0x1106, 0x3038, 0x0C03, 0x00));
    let (autodetect, _host) = subsystem(bus, FakeHost::default());

    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Realtek RTL8139");
}

#[test]
fn hotplug_arm_failure_is_not_fatal() {
    let bus = FakeBus {
        fail_hotplug_arm: true,
        ..FakeBus::default()
    };
    let (autodetect, _host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();
}

#[test]
fn capacity_overflow_during_scan_drops_excess_and_continues() {
    let bus = FakeBus::default()
        .pci_at(0, 0, 0, GFX)
        .pci_at(0, 1, 0, NIC)
        .pci_at(0, 2, 0, SATA);
    let host: Arc<FakeHost> = Arc::new(FakeHost::default());
    let registry = Arc::new(DeviceRegistry::with_capacity(DeviceDatabase::compiled(), 2));
    let autodetect = Autodetect::with_registry(Arc::new(bus), host.clone(), registry);

    // SATA (critical) is the device that gets dropped, so init still succeeds
    autodetect.init().unwrap();

    let devices = autodetect.get_devices(usize::MAX);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].location, pci(0, 0, 0));
    assert_eq!(devices[1].location, pci(0, 1, 0));
}

// ============================================================================
// Hotplug
// ============================================================================

#[test]
fn hotplug_added_loads_only_hotplug_capable_devices() {
    let (autodetect, host) = subsystem(FakeBus::default(), FakeHost::default());
    autodetect.init().unwrap();

    autodetect.hotplug_callback(added(USBC, pci(2, 0, 0)));
    assert_eq!(host.loaded_paths(), ["/drivers/ehci.drv"]);

    // no HOTPLUG flag: registered but deliberately left unloaded
    autodetect.hotplug_callback(added(NIC, pci(2, 1, 0)));
    assert_eq!(host.loaded_paths(), ["/drivers/ehci.drv"]);

    let stats = autodetect.get_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.failed, 1);
}

#[test]
fn hotplug_add_then_remove_restores_size_and_unloads() {
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX);
    let (autodetect, host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();
    let before = autodetect.get_stats().total;

    autodetect.hotplug_callback(added(USBC, pci(2, 0, 0)));
    assert_eq!(autodetect.get_stats().total, before + 1);

    autodetect.hotplug_callback(removed(USBC, pci(2, 0, 0)));
    assert_eq!(autodetect.get_stats().total, before);
    assert_eq!(host.unloaded_paths(), ["/drivers/ehci.drv"]);
}

#[test]
fn hotplug_remove_skips_unload_for_unloaded_device() {
    let (autodetect, host) = subsystem(FakeBus::default(), FakeHost::default());
    autodetect.init().unwrap();

    autodetect.hotplug_callback(added(NIC, pci(2, 1, 0)));
    autodetect.hotplug_callback(removed(NIC, pci(2, 1, 0)));

    assert_eq!(autodetect.get_stats().total, 0);
    assert!(host.unloaded_paths().is_empty());
}

#[test]
fn hotplug_remove_for_untracked_location_is_a_noop() {
    let bus = FakeBus::default().pci_at(0, 0, 0, GFX);
    let (autodetect, host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();

    autodetect.hotplug_callback(removed(NIC, pci(9, 9, 0)));

    assert_eq!(autodetect.get_stats().total, 1);
    assert!(host.unloaded_paths().is_empty());
}

#[test]
fn hotplug_added_unknown_device_is_tracked_unloaded() {
    let (autodetect, host) = subsystem(FakeBus::default(), FakeHost::default());
    autodetect.init().unwrap();

    autodetect.hotplug_callback(added(MYSTERY, pci(2, 0, 0)));

    let devices = autodetect.get_devices(usize::MAX);
    assert_eq!(devices.len(), 1);
    assert!(!devices[0].driver_loaded);
    assert!(host.loaded_paths().is_empty());
}

// ============================================================================
// Load path details
// ============================================================================

#[test]
fn load_one_is_idempotent_for_loaded_devices() {
    let bus = FakeBus::default().pci_at(0, 3, 0, NIC);
    let (autodetect, host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();
    assert_eq!(host.loaded_paths().len(), 1);

    let device = autodetect.registry().find(pci(0, 3, 0)).unwrap();
    assert!(device.driver_loaded);

    let orchestrator = LoadOrchestrator::new(host.as_ref(), autodetect.registry());
    orchestrator.load_one(&device).unwrap();
    assert_eq!(host.loaded_paths().len(), 1);
}

#[test]
fn inventory_snapshot_respects_limit() {
    let bus = FakeBus::default()
        .pci_at(0, 0, 0, GFX)
        .pci_at(0, 1, 0, NIC)
        .pci_at(0, 2, 0, SATA);
    let (autodetect, _host) = subsystem(bus, FakeHost::default());
    autodetect.init().unwrap();

    assert_eq!(autodetect.get_devices(2).len(), 2);
    assert_eq!(autodetect.get_devices(0).len(), 0);
    assert_eq!(autodetect.get_devices(usize::MAX).len(), 3);
}

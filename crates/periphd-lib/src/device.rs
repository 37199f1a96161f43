//! Device slot state and the backend trait the core talks to.
//!
//! [`UsbDevice`] is everything the data lock of a slot protects. The
//! [`DeviceBackend`] trait is the seam to the transport, firmware and profile
//! code, which live outside this crate; [`mock::MockBackend`] stands in for
//! them in tests and in the CLI's simulation commands.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::features::{Feature, Features};
use crate::models::{self, DeviceModel};

/// Nominal delay between USB transfers once a device is running.
pub const USB_DELAY_DEFAULT: Duration = Duration::from_millis(5);

/// Wider transfer delay used while a device is being brought up.
pub const USB_DELAY_SETUP: Duration = Duration::from_millis(10);

// ── Error type ──

/// Errors reported by a [`DeviceBackend`].
///
/// String payloads follow the convention **"context: details"**, e.g.
/// `"fwversion: short read"`.
#[derive(Debug)]
pub enum DeviceError {
    /// Transfer failed at the USB level.
    Io(String),
    /// The device did not answer in time.
    Timeout(String),
    /// The device went away mid-operation.
    Disconnected,
    /// The operation does not exist for this hardware.
    Unsupported(String),
    /// The device answered with an error status.
    Rejected(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Io(e) => write!(f, "USB I/O error: {e}"),
            DeviceError::Timeout(e) => write!(f, "Device timed out: {e}"),
            DeviceError::Disconnected => write!(f, "Device disconnected"),
            DeviceError::Unsupported(e) => write!(f, "Unsupported operation: {e}"),
            DeviceError::Rejected(e) => write!(f, "Device rejected request: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Slot data ──

/// Profile data read back from on-device storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HwProfile {
    pub name: String,
    pub modes: Vec<String>,
}

/// State of one device slot, guarded by the slot's data lock.
#[derive(Debug, Clone, Serialize)]
pub struct UsbDevice {
    pub vendor: u16,
    pub product: u16,
    #[serde(skip)]
    pub model: Option<&'static DeviceModel>,
    pub features: Features,
    /// Firmware version, 0 = unknown.
    pub fwversion: u16,
    /// Poll interval in microseconds, 0 = not detected yet.
    pub pollrate: u16,
    /// Delay between consecutive USB transfers.
    pub usb_delay: Duration,
    pub active: bool,
    /// The device enumerated in a state that requires a firmware update first.
    pub needs_fw_update: bool,
    /// Hardware profile, once loaded from the device.
    pub hw: Option<HwProfile>,
}

impl Default for UsbDevice {
    fn default() -> Self {
        UsbDevice {
            vendor: 0,
            product: 0,
            model: None,
            features: Features::empty(),
            fwversion: 0,
            pollrate: 0,
            usb_delay: USB_DELAY_DEFAULT,
            active: false,
            needs_fw_update: false,
            hw: None,
        }
    }
}

impl UsbDevice {
    /// A freshly attached device: identity resolved, full feature set for
    /// its model, nothing detected yet.
    pub fn attach(vendor: u16, product: u16) -> Self {
        let model = models::detect_model(product);
        let features = model.map_or_else(Features::all, DeviceModel::base_features);
        UsbDevice {
            vendor,
            product,
            model,
            features,
            ..UsbDevice::default()
        }
    }

    /// Whether the slot currently holds a device.
    pub fn is_attached(&self) -> bool {
        self.product != 0
    }

    /// Return the slot to its detached state.
    pub fn reset(&mut self) {
        *self = UsbDevice::default();
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    /// Human-readable model name.
    pub fn name(&self) -> &str {
        self.model.map_or("unknown device", |m| m.name)
    }

    pub fn is_single_ep(&self) -> bool {
        self.model.is_some_and(|m| m.single_endpoint)
    }

    pub fn has_no_hw_storage(&self) -> bool {
        self.model.is_some_and(|m| m.no_hw_storage)
    }

    pub fn uses_file_hwsave(&self) -> bool {
        self.model.is_some_and(|m| m.file_hwsave)
    }

    pub fn has_no_lights(&self) -> bool {
        self.model.is_some_and(|m| m.no_lights)
    }

    pub fn lacks_pollrate_readback(&self) -> bool {
        self.model.is_some_and(|m| m.no_pollrate_readback)
    }
}

// ── Trait ──

/// Transport, firmware and profile operations the core relies on.
///
/// Implementations may update the device they are handed (the firmware
/// query fills in `fwversion` and `pollrate`, the profile load sets `hw`).
/// Callers hold the slot's data lock for the duration of each call.
pub trait DeviceBackend {
    /// Read firmware version and poll rate.
    fn query_firmware_version(&self, dev: &mut UsbDevice) -> Result<()>;
    /// Read the stored profile from the device.
    fn load_hardware_profile(&self, dev: &mut UsbDevice, primary: bool) -> Result<()>;
    /// Switch the device into (or out of) software-controlled mode.
    fn set_active(&self, dev: &mut UsbDevice, enable: bool) -> Result<()>;
    /// Send one raw packet.
    fn transmit(&self, dev: &UsbDevice, packet: &[u8]) -> Result<()>;
}

// ── Mock backend for testing ──

/// In-memory backend for unit tests, integration tests and dry runs.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// A backend call, recorded in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        QueryFirmware,
        LoadProfile { primary: bool },
        SetActive(bool),
        Transmit(Vec<u8>),
    }

    /// Records every call; failures are injected per operation.
    pub struct MockBackend {
        /// Firmware version reported by a successful query.
        pub fwversion: Cell<u16>,
        /// Poll interval reported by a successful query.
        pub pollrate: Cell<u16>,
        pub fail_fw_query: Cell<bool>,
        pub fail_hw_load: Cell<bool>,
        pub fail_activate: Cell<bool>,
        pub fail_transmit: Cell<bool>,
        /// Delay observed on the device at each call.
        pub delays: RefCell<Vec<Duration>>,
        pub calls: RefCell<Vec<Call>>,
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            MockBackend {
                fwversion: Cell::new(0x0305),
                pollrate: Cell::new(1000),
                fail_fw_query: Cell::new(false),
                fail_hw_load: Cell::new(false),
                fail_activate: Cell::new(false),
                fail_transmit: Cell::new(false),
                delays: RefCell::new(Vec::new()),
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Packets passed to `transmit`, including ones that were made to fail.
        pub fn transmitted(&self) -> Vec<Vec<u8>> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    Call::Transmit(p) => Some(p.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn called(&self, call: &Call) -> bool {
            self.calls.borrow().contains(call)
        }

        fn record(&self, dev: &UsbDevice, call: Call) {
            self.delays.borrow_mut().push(dev.usb_delay);
            self.calls.borrow_mut().push(call);
        }
    }

    impl DeviceBackend for MockBackend {
        fn query_firmware_version(&self, dev: &mut UsbDevice) -> Result<()> {
            self.record(dev, Call::QueryFirmware);
            if self.fail_fw_query.get() {
                return Err(DeviceError::Timeout(
                    "fwversion: mock failure injected".into(),
                ));
            }
            dev.fwversion = self.fwversion.get();
            dev.pollrate = self.pollrate.get();
            Ok(())
        }

        fn load_hardware_profile(&self, dev: &mut UsbDevice, primary: bool) -> Result<()> {
            self.record(dev, Call::LoadProfile { primary });
            if self.fail_hw_load.get() {
                return Err(DeviceError::Io("hwload: mock failure injected".into()));
            }
            dev.hw = Some(HwProfile {
                name: "Hardware profile".into(),
                modes: vec!["Mode 1".into(), "Mode 2".into(), "Mode 3".into()],
            });
            Ok(())
        }

        fn set_active(&self, dev: &mut UsbDevice, enable: bool) -> Result<()> {
            self.record(dev, Call::SetActive(enable));
            if self.fail_activate.get() {
                return Err(DeviceError::Rejected(
                    "setactive: mock failure injected".into(),
                ));
            }
            dev.active = enable;
            Ok(())
        }

        fn transmit(&self, dev: &UsbDevice, packet: &[u8]) -> Result<()> {
            self.record(dev, Call::Transmit(packet.to_vec()));
            if self.fail_transmit.get() {
                return Err(DeviceError::Io("transmit: mock failure injected".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{P_K66, P_K70, P_M95, P_POLARIS};

    #[test]
    fn attach_known_model() {
        let dev = UsbDevice::attach(models::VENDOR_ID, P_K70);
        assert!(dev.is_attached());
        assert_eq!(dev.name(), "K70 RGB");
        assert_eq!(dev.features, Features::all());
        assert_eq!(dev.fwversion, 0);
        assert_eq!(dev.pollrate, 0);
        assert_eq!(dev.usb_delay, USB_DELAY_DEFAULT);
        assert!(!dev.active);
    }

    #[test]
    fn attach_unknown_model_has_no_exclusions() {
        let dev = UsbDevice::attach(0x1234, 0x5678);
        assert_eq!(dev.name(), "unknown device");
        assert!(!dev.is_single_ep());
        assert!(!dev.has_no_lights());
        assert!(!dev.uses_file_hwsave());
    }

    #[test]
    fn family_predicates_follow_model() {
        assert!(UsbDevice::attach(models::VENDOR_ID, P_POLARIS).is_single_ep());
        assert!(UsbDevice::attach(models::VENDOR_ID, P_POLARIS).has_no_hw_storage());
        assert!(UsbDevice::attach(models::VENDOR_ID, P_K66).has_no_lights());
        assert!(UsbDevice::attach(models::VENDOR_ID, P_M95).lacks_pollrate_readback());
    }

    #[test]
    fn reset_detaches() {
        let mut dev = UsbDevice::attach(models::VENDOR_ID, P_K70);
        dev.active = true;
        dev.fwversion = 0x300;
        dev.reset();
        assert!(!dev.is_attached());
        assert!(!dev.active);
        assert!(dev.features.is_empty());
    }

    #[test]
    fn display_device_errors() {
        assert_eq!(DeviceError::Disconnected.to_string(), "Device disconnected");
        assert_eq!(
            DeviceError::Io("pkt: stall".into()).to_string(),
            "USB I/O error: pkt: stall"
        );
    }

    #[test]
    fn mock_records_calls_and_delay() {
        let backend = mock::MockBackend::new();
        let mut dev = UsbDevice::attach(models::VENDOR_ID, P_K70);
        backend.query_firmware_version(&mut dev).unwrap();
        assert_eq!(dev.fwversion, 0x0305);
        assert!(backend.called(&mock::Call::QueryFirmware));
        assert_eq!(backend.delays.borrow().as_slice(), &[USB_DELAY_DEFAULT]);
    }
}

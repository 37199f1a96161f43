//! Device bring-up: decide what a freshly attached device may do.
//!
//! Runs once per attach and again on explicit reactivation. The pass reads
//! firmware state, applies the hardware-family exclusions, optionally loads
//! the stored profile and activates the device. Each step can only narrow the
//! feature set; the firmware-update case is the one exception and replaces
//! the set outright.
//!
//! How hard the device is probed is governed by [`HwLoadMode`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceBackend, DeviceError, USB_DELAY_DEFAULT, USB_DELAY_SETUP, UsbDevice};
use crate::features::{Feature, Features};
use crate::slots::{DeviceSlot, DeviceTable};

/// Process-wide policy for reading state back from devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwLoadMode {
    /// Never query the device; poll rate and firmware stay unknown.
    Never,
    /// Query once; on failure warn and stop trying for this device.
    #[default]
    Once,
    /// Query and treat any failure as fatal for the bring-up.
    Always,
}

impl HwLoadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HwLoadMode::Never => "never",
            HwLoadMode::Once => "once",
            HwLoadMode::Always => "always",
        }
    }
}

impl fmt::Display for HwLoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HwLoadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "0" => Ok(HwLoadMode::Never),
            "once" | "1" => Ok(HwLoadMode::Once),
            "always" | "2" => Ok(HwLoadMode::Always),
            other => Err(format!(
                "unknown hwload mode '{other}' (expected never, once or always)"
            )),
        }
    }
}

/// Fatal bring-up failures. The device is left inactive.
#[derive(Debug)]
pub enum BringUpError {
    /// Firmware version / poll rate could not be read under `always`.
    FirmwareQuery(DeviceError),
    /// The hardware profile could not be loaded under `always`.
    HardwareProfile(DeviceError),
    /// The device refused activation.
    Activation(DeviceError),
}

impl fmt::Display for BringUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BringUpError::FirmwareQuery(e) => {
                write!(f, "Unable to load firmware version/poll rate: {e}")
            }
            BringUpError::HardwareProfile(e) => write!(f, "Unable to load hardware profile: {e}"),
            BringUpError::Activation(e) => write!(f, "Unable to activate device: {e}"),
        }
    }
}

impl std::error::Error for BringUpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BringUpError::FirmwareQuery(e)
            | BringUpError::HardwareProfile(e)
            | BringUpError::Activation(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, BringUpError>;

/// Features left after a firmware-update short circuit.
pub fn firmware_update_features() -> Features {
    Features::from([Feature::Rgb, Feature::FwVersion, Feature::FwUpdate])
}

/// Holds the device at the setup transfer delay; restores the nominal delay
/// when dropped, whichever way the bring-up ends.
struct SetupDelay<'a>(&'a mut UsbDevice);

impl<'a> SetupDelay<'a> {
    fn new(dev: &'a mut UsbDevice) -> Self {
        dev.usb_delay = USB_DELAY_SETUP;
        SetupDelay(dev)
    }
}

impl Deref for SetupDelay<'_> {
    type Target = UsbDevice;

    fn deref(&self) -> &UsbDevice {
        self.0
    }
}

impl DerefMut for SetupDelay<'_> {
    fn deref_mut(&mut self) -> &mut UsbDevice {
        self.0
    }
}

impl Drop for SetupDelay<'_> {
    fn drop(&mut self) {
        self.0.usb_delay = USB_DELAY_DEFAULT;
    }
}

/// Run a fallible device query under the load policy.
///
/// - success → `Ok(true)`;
/// - failure under `always` → `Err(fatal(e))`;
/// - failure otherwise → warn, clear `feature` for good, `Ok(false)`.
///
/// The caller decides whether the policy allows the probe at all.
fn tiered_probe(
    dev: &mut UsbDevice,
    mode: HwLoadMode,
    feature: Feature,
    what: &str,
    probe: impl FnOnce(&mut UsbDevice) -> std::result::Result<(), DeviceError>,
    fatal: fn(DeviceError) -> BringUpError,
) -> Result<bool> {
    match probe(dev) {
        Ok(()) => Ok(true),
        Err(e) if mode == HwLoadMode::Always => Err(fatal(e)),
        Err(e) => {
            log::warn!("Unable to load {what}: {e}");
            dev.features.remove(feature);
            Ok(false)
        }
    }
}

/// Read firmware version and poll rate if they are not known yet.
fn detect_firmware(
    dev: &mut UsbDevice,
    backend: &impl DeviceBackend,
    mode: HwLoadMode,
) -> Result<()> {
    if dev.pollrate != 0 {
        return Ok(());
    }
    let detected = if mode != HwLoadMode::Never && dev.features.has_hwload() {
        tiered_probe(
            dev,
            mode,
            Feature::HwLoad,
            "firmware version/poll rate",
            |d| backend.query_firmware_version(d),
            BringUpError::FirmwareQuery,
        )?
    } else {
        false
    };
    if !detected {
        dev.pollrate = 0;
        dev.features.remove_all([Feature::PollRate, Feature::AdjRate]);
        if dev.fwversion == 0 {
            dev.features.remove_all([Feature::FwVersion, Feature::FwUpdate]);
        }
    }
    Ok(())
}

/// Drop features the hardware family cannot support.
fn apply_topology_exclusions(dev: &mut UsbDevice) {
    // No input endpoint, nothing to bind.
    if dev.is_single_ep() {
        dev.features.remove(Feature::Bind);
    }
    if dev.has_no_hw_storage() {
        dev.features.remove(Feature::HwLoad);
    }
    // Profile readback is not implemented for file-based storage.
    if dev.uses_file_hwsave() {
        dev.features.remove(Feature::HwLoad);
    }
    // No backlight, so no lighting state to read back either.
    if dev.has_no_lights() {
        dev.features.remove_all([Feature::Rgb, Feature::HwLoad]);
    }
    if dev.lacks_pollrate_readback() {
        dev.features.remove(Feature::PollRate);
    }
}

fn bring_up(
    dev: &mut UsbDevice,
    backend: &impl DeviceBackend,
    mode: HwLoadMode,
    activate: bool,
) -> Result<()> {
    detect_firmware(dev, backend, mode)?;
    apply_topology_exclusions(dev);

    if dev.needs_fw_update {
        // Flashing is started later by an explicit request.
        log::info!(
            "{} needs a firmware update. Please issue a fwupdate command.",
            dev.name()
        );
        dev.features = firmware_update_features();
        dev.active = true;
        return Ok(());
    }

    if dev.hw.is_none() && mode != HwLoadMode::Never && dev.features.has_hwload() {
        tiered_probe(
            dev,
            mode,
            Feature::HwLoad,
            "hardware profile",
            |d| backend.load_hardware_profile(d, true),
            BringUpError::HardwareProfile,
        )?;
    }

    if activate {
        return backend
            .set_active(dev, true)
            .map_err(BringUpError::Activation);
    }
    Ok(())
}

/// Bring up an already-locked device.
///
/// The transfer delay is widened for the duration of the call and set back
/// to the nominal value on every exit path.
pub fn start_locked(
    dev: &mut UsbDevice,
    backend: &impl DeviceBackend,
    mode: HwLoadMode,
    activate: bool,
) -> Result<()> {
    let mut dev = SetupDelay::new(dev);
    let result = bring_up(&mut dev, backend, mode, activate);
    log::debug!(
        "{:04x}:{:04x} bring-up {}: fw {:04x}, features [{}]",
        dev.vendor,
        dev.product,
        if result.is_ok() { "done" } else { "failed" },
        dev.fwversion,
        dev.features
    );
    result
}

/// Bring up the device in `slot`, holding its data lock for the whole pass.
///
/// With `activate` set the result of the activation request is the result
/// of the call.
pub fn start_dev(
    slot: &DeviceSlot,
    backend: &impl DeviceBackend,
    mode: HwLoadMode,
    activate: bool,
) -> Result<()> {
    let mut data = slot.data.lock();
    start_locked(&mut data, backend, mode, activate)
}

/// [`start_dev`] for a slot of `table`; after a successful pass every
/// occupied slot of the table is logged.
pub fn start_in_table(
    table: &DeviceTable,
    slot: &DeviceSlot,
    backend: &impl DeviceBackend,
    mode: HwLoadMode,
    activate: bool,
) -> Result<()> {
    start_dev(slot, backend, mode, activate)?;
    let attached: Vec<String> = table
        .attached()
        .into_iter()
        .map(|(index, product)| format!("{index}: 0x{product:x}"))
        .collect();
    log::debug!("Attached devices: {}", attached.join("; "));
    Ok(())
}

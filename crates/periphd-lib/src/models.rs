//! Model table: hardware family facts for supported devices.
//!
//! Each entry records what the hardware can physically do: how many
//! endpoints it exposes, whether it has profile storage or a backlight. The
//! bring-up pass uses these to narrow a device's feature set. Unknown product
//! ids get `None` from [`detect_model`], which callers should treat as a
//! generic keyboard with no exclusions.

use serde::Serialize;

use crate::features::Features;

/// Vendor id shared by every entry in [`MODELS`].
pub const VENDOR_ID: u16 = 0x1b1c;

pub const P_K95: u16 = 0x1b11;
pub const P_K70: u16 = 0x1b13;
pub const P_K65: u16 = 0x1b17;
pub const P_STRAFE: u16 = 0x1b20;
pub const P_K55: u16 = 0x1b3d;
pub const P_K66: u16 = 0x1b41;
pub const P_K100: u16 = 0x1b7c;
pub const P_K95_PLATINUM_XT: u16 = 0x1b89;
pub const P_M65: u16 = 0x1b12;
pub const P_M95: u16 = 0x1b06;
pub const P_GLAIVE: u16 = 0x1b34;
pub const P_DARK_CORE: u16 = 0x1b35;
pub const P_POLARIS: u16 = 0x1b3b;
pub const P_ST100: u16 = 0x0a34;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Keyboard,
    Mouse,
    Mousepad,
    Stand,
}

/// Hardware family facts for one product.
#[derive(Debug, Serialize)]
pub struct DeviceModel {
    pub product: u16,
    pub name: &'static str,
    pub kind: DeviceKind,
    /// Only a single USB endpoint: no input reports, so nothing to bind.
    pub single_endpoint: bool,
    /// No on-device profile storage at all.
    pub no_hw_storage: bool,
    /// Profiles are persisted as files on the device rather than in the
    /// classic storage layout.
    pub file_hwsave: bool,
    /// No backlight subsystem.
    pub no_lights: bool,
    /// The protocol offers no way to read the poll rate back.
    pub no_pollrate_readback: bool,
}

impl DeviceModel {
    const fn keyboard(product: u16, name: &'static str) -> Self {
        DeviceModel {
            product,
            name,
            kind: DeviceKind::Keyboard,
            single_endpoint: false,
            no_hw_storage: false,
            file_hwsave: false,
            no_lights: false,
            no_pollrate_readback: false,
        }
    }

    const fn mouse(product: u16, name: &'static str) -> Self {
        DeviceModel {
            kind: DeviceKind::Mouse,
            ..DeviceModel::keyboard(product, name)
        }
    }

    /// Features a freshly attached device of this model starts with.
    pub fn base_features(&self) -> Features {
        Features::all()
    }
}

pub static MODELS: &[DeviceModel] = &[
    DeviceModel::keyboard(P_K95, "K95 RGB"),
    DeviceModel::keyboard(P_K70, "K70 RGB"),
    DeviceModel::keyboard(P_K65, "K65 RGB"),
    DeviceModel::keyboard(P_STRAFE, "STRAFE RGB"),
    DeviceModel::keyboard(P_K55, "K55 RGB"),
    DeviceModel {
        no_lights: true,
        ..DeviceModel::keyboard(P_K66, "K66")
    },
    DeviceModel {
        file_hwsave: true,
        ..DeviceModel::keyboard(P_K100, "K100 RGB")
    },
    DeviceModel {
        file_hwsave: true,
        ..DeviceModel::keyboard(P_K95_PLATINUM_XT, "K95 RGB PLATINUM XT")
    },
    DeviceModel::mouse(P_M65, "M65 RGB"),
    DeviceModel {
        no_pollrate_readback: true,
        ..DeviceModel::mouse(P_M95, "M95")
    },
    DeviceModel::mouse(P_GLAIVE, "GLAIVE RGB"),
    DeviceModel {
        file_hwsave: true,
        ..DeviceModel::mouse(P_DARK_CORE, "DARK CORE RGB")
    },
    DeviceModel {
        kind: DeviceKind::Mousepad,
        single_endpoint: true,
        no_hw_storage: true,
        ..DeviceModel::keyboard(P_POLARIS, "MM800 RGB POLARIS")
    },
    DeviceModel {
        kind: DeviceKind::Stand,
        single_endpoint: true,
        ..DeviceModel::keyboard(P_ST100, "ST100 RGB")
    },
];

/// Look up the model entry for a product id.
pub fn detect_model(product: u16) -> Option<&'static DeviceModel> {
    MODELS.iter().find(|m| m.product == product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_product_detected() {
        let m = detect_model(P_K70).unwrap();
        assert_eq!(m.name, "K70 RGB");
        assert_eq!(m.kind, DeviceKind::Keyboard);
    }

    #[test]
    fn unknown_product_is_none() {
        assert!(detect_model(0xdead).is_none());
    }

    #[test]
    fn product_ids_unique() {
        for (i, a) in MODELS.iter().enumerate() {
            for b in &MODELS[i + 1..] {
                assert_ne!(a.product, b.product, "{} and {}", a.name, b.name);
            }
        }
    }

    #[test]
    fn polaris_has_no_storage_and_one_endpoint() {
        let m = detect_model(P_POLARIS).unwrap();
        assert!(m.no_hw_storage);
        assert!(m.single_endpoint);
    }

    #[test]
    fn m95_lacks_pollrate_readback() {
        assert!(detect_model(P_M95).unwrap().no_pollrate_readback);
        assert!(!detect_model(P_M65).unwrap().no_pollrate_readback);
    }

    #[test]
    fn k66_has_no_lights() {
        assert!(detect_model(P_K66).unwrap().no_lights);
    }
}

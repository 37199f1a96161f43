//! Device capability set.

use std::fmt;

use serde::Serialize;

/// A capability a device may be permitted to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Programmable backlight.
    Rgb,
    /// Profiles can be read back from on-device storage.
    HwLoad,
    /// Poll rate can be read from the device.
    PollRate,
    /// Poll rate can be changed.
    AdjRate,
    /// Firmware version can be read.
    FwVersion,
    /// Firmware can be updated.
    FwUpdate,
    /// Keys can be rebound.
    Bind,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Rgb,
        Feature::HwLoad,
        Feature::PollRate,
        Feature::AdjRate,
        Feature::FwVersion,
        Feature::FwUpdate,
        Feature::Bind,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Rgb => "rgb",
            Feature::HwLoad => "hwload",
            Feature::PollRate => "pollrate",
            Feature::AdjRate => "adjrate",
            Feature::FwVersion => "fwversion",
            Feature::FwUpdate => "fwupdate",
            Feature::Bind => "bind",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of [`Feature`]s, stored as a bit mask.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Features(u16);

impl Features {
    pub const fn empty() -> Self {
        Features(0)
    }

    pub fn all() -> Self {
        Feature::ALL.into_iter().collect()
    }

    pub const fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    /// True if every feature in `other` is also in `self`.
    pub const fn contains_all(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, feature: Feature) {
        self.0 |= feature.bit();
    }

    pub fn remove(&mut self, feature: Feature) {
        self.0 &= !feature.bit();
    }

    /// Remove every feature in `features`.
    pub fn remove_all(&mut self, features: impl IntoIterator<Item = Feature>) {
        for f in features {
            self.remove(f);
        }
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Feature> {
        Feature::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    // Named queries for the checks made during bring-up and by callers.

    pub const fn has_rgb(self) -> bool {
        self.contains(Feature::Rgb)
    }

    pub const fn has_hwload(self) -> bool {
        self.contains(Feature::HwLoad)
    }

    pub const fn has_pollrate(self) -> bool {
        self.contains(Feature::PollRate)
    }

    pub const fn has_fwupdate(self) -> bool {
        self.contains(Feature::FwUpdate)
    }

    pub const fn has_bind(self) -> bool {
        self.contains(Feature::Bind)
    }
}

impl FromIterator<Feature> for Features {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = Features::empty();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

impl<const N: usize> From<[Feature; N]> for Features {
    fn from(features: [Feature; N]) -> Self {
        features.into_iter().collect()
    }
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Feature::name).collect();
        f.write_str(&names.join(" "))
    }
}

impl Serialize for Features {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

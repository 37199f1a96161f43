//! Firmware mode switches: reset into bootloader, apply an update, change
//! transfer speed.
//!
//! A mode switch is one 64-byte packet `[0x07, 0x02, opcode, 0...]`.

use std::fmt;
use std::str::FromStr;

use crate::device::{DeviceBackend, UsbDevice};

/// Size of every outbound command packet.
pub const PACKET_SIZE: usize = 64;

/// Offset of the opcode byte within the packet.
pub const OPCODE_OFFSET: usize = 2;

const HEADER: [u8; 2] = [0x07, 0x02];

/// Opcode left in the packet when the request is not recognised; a packet
/// carrying it is never sent.
pub const OPCODE_NONE: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSwitch {
    /// Boot the freshly written firmware; also leaves bootloader mode.
    ApplyFw,
    /// In-system programming mode.
    Isp,
    Fast,
    Medium,
    /// Reboot into the bootloader, wiping the EEPROM.
    Bld,
}

impl ModeSwitch {
    pub const ALL: [ModeSwitch; 5] = [
        ModeSwitch::ApplyFw,
        ModeSwitch::Isp,
        ModeSwitch::Fast,
        ModeSwitch::Medium,
        ModeSwitch::Bld,
    ];

    pub fn opcode(self) -> u8 {
        match self {
            ModeSwitch::ApplyFw => 0xf0,
            ModeSwitch::Isp => 0xaa,
            ModeSwitch::Fast => 0x01,
            ModeSwitch::Medium => 0x00,
            ModeSwitch::Bld => 0x03,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModeSwitch::ApplyFw => "apply_fw",
            ModeSwitch::Isp => "isp",
            ModeSwitch::Fast => "fast",
            ModeSwitch::Medium => "medium",
            ModeSwitch::Bld => "bld",
        }
    }

    pub fn packet(self) -> [u8; PACKET_SIZE] {
        encode(Some(self))
    }
}

impl fmt::Display for ModeSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModeSwitch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeSwitch::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown mode switch '{s}'"))
    }
}

/// Build the packet for a request; `None` yields the unsendable sentinel.
pub fn encode(request: Option<ModeSwitch>) -> [u8; PACKET_SIZE] {
    let mut pkt = [0u8; PACKET_SIZE];
    pkt[..HEADER.len()].copy_from_slice(&HEADER);
    pkt[OPCODE_OFFSET] = request.map_or(OPCODE_NONE, ModeSwitch::opcode);
    pkt
}

/// Send the mode switch named by `request` (e.g. `"bld"`).
///
/// Unknown names send nothing. A failed transmission is logged and not
/// reported to the caller.
pub fn send_mode_switch(dev: &UsbDevice, backend: &impl DeviceBackend, request: &str) {
    let pkt = encode(request.parse().ok());
    if pkt[OPCODE_OFFSET] == OPCODE_NONE {
        log::debug!("ignoring unknown mode switch '{request}'");
        return;
    }
    if let Err(e) = backend.transmit(dev, &pkt) {
        log::error!("{request} reset failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockBackend;
    use crate::models::{P_K70, VENDOR_ID};

    fn dev() -> UsbDevice {
        UsbDevice::attach(VENDOR_ID, P_K70)
    }

    #[test]
    fn opcodes() {
        assert_eq!(ModeSwitch::ApplyFw.opcode(), 0xf0);
        assert_eq!(ModeSwitch::Isp.opcode(), 0xaa);
        assert_eq!(ModeSwitch::Fast.opcode(), 0x01);
        assert_eq!(ModeSwitch::Medium.opcode(), 0x00);
        assert_eq!(ModeSwitch::Bld.opcode(), 0x03);
    }

    #[test]
    fn names_parse_back() {
        for m in ModeSwitch::ALL {
            assert_eq!(m.name().parse::<ModeSwitch>().unwrap(), m);
        }
        assert!("BLD".parse::<ModeSwitch>().is_err());
    }

    #[test]
    fn packet_layout() {
        let pkt = ModeSwitch::Isp.packet();
        assert_eq!(pkt.len(), PACKET_SIZE);
        assert_eq!(&pkt[..3], &[0x07, 0x02, 0xaa]);
        assert!(pkt[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn medium_opcode_is_zero_but_sendable() {
        let backend = MockBackend::new();
        send_mode_switch(&dev(), &backend, "medium");
        let sent = backend.transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][OPCODE_OFFSET], 0x00);
    }

    #[test]
    fn unknown_request_sends_nothing() {
        let backend = MockBackend::new();
        send_mode_switch(&dev(), &backend, "reboot");
        send_mode_switch(&dev(), &backend, "");
        assert!(backend.transmitted().is_empty());
    }

    #[test]
    fn bld_sends_wipe_opcode() {
        let backend = MockBackend::new();
        send_mode_switch(&dev(), &backend, "bld");
        let sent = backend.transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][OPCODE_OFFSET], 0x03);
    }

    #[test]
    fn transmit_failure_is_swallowed() {
        let backend = MockBackend::new();
        backend.fail_transmit.set(true);
        // Returns normally; the failure only reaches the log.
        send_mode_switch(&dev(), &backend, "bld");
        assert_eq!(backend.transmitted().len(), 1);
    }
}

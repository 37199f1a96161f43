//! `mode-switch` subcommand: encode a mode switch and send it to a
//! simulated device.

use periphd_lib::device::UsbDevice;
use periphd_lib::device::mock::MockBackend;
use periphd_lib::mode_switch::send_mode_switch;
use periphd_lib::models::{P_K70, VENDOR_ID};

use super::{ModeSwitchOutput, Result, hex_lines, print_json};

pub(super) fn cmd_mode_switch(request: &str, fail_transmit: bool, json: bool) -> Result<()> {
    let backend = MockBackend::new();
    backend.fail_transmit.set(fail_transmit);
    let dev = UsbDevice::attach(VENDOR_ID, P_K70);

    send_mode_switch(&dev, &backend, request);
    let packet = backend.transmitted().into_iter().next();

    if json {
        let output = ModeSwitchOutput {
            request: request.to_string(),
            sent: packet.is_some(),
            packet: packet.map(|p| hex_lines(&p).join(" ")),
        };
        return print_json(&output);
    }

    match packet {
        Some(p) => {
            println!("Sent '{request}' ({} bytes):", p.len());
            for line in hex_lines(&p) {
                println!("  {line}");
            }
        }
        None => println!("Unknown mode switch '{request}', nothing sent."),
    }
    Ok(())
}

//! `bringup` subcommand: run the bring-up pass on a simulated device.
//!
//! The device sits in a real slot table and goes through the same locking
//! as an attached one; only the backend is simulated.

use periphd_lib::PeriphdError;
use periphd_lib::bringup;
use periphd_lib::device::UsbDevice;
use periphd_lib::device::mock::MockBackend;
use periphd_lib::models::VENDOR_ID;
use periphd_lib::slots::DeviceTable;

use super::{BringUpOutput, GlobalOpts, Result, kv, kv_width, print_json};

pub(super) struct Simulation {
    pub product: u16,
    pub needs_update: bool,
    pub fail_fw: bool,
    pub fail_hw: bool,
    pub fail_activate: bool,
    pub activate: bool,
}

pub(super) fn cmd_bringup(opts: &GlobalOpts, sim: Simulation) -> Result<()> {
    let mode = opts.effective_config().hwload;

    let backend = MockBackend::new();
    backend.fail_fw_query.set(sim.fail_fw);
    backend.fail_hw_load.set(sim.fail_hw);
    backend.fail_activate.set(sim.fail_activate);

    let table = DeviceTable::new();
    let mut dev = UsbDevice::attach(VENDOR_ID, sim.product);
    dev.needs_fw_update = sim.needs_update;
    let index = table
        .attach(dev)
        .ok_or_else(|| PeriphdError::Config("no free device slot".into()))?;
    let slot = table
        .slot(index)
        .ok_or_else(|| PeriphdError::Config(format!("slot {index} out of range")))?;

    let result = bringup::start_in_table(&table, slot, &backend, mode, sim.activate);
    let dev = slot.data.lock();

    let output = BringUpOutput {
        product: format!("{:04x}:{:04x}", dev.vendor, dev.product),
        model: dev.name().to_string(),
        hwload: mode,
        result: match &result {
            Ok(()) => "ok".into(),
            Err(e) => e.to_string(),
        },
        ok: result.is_ok(),
        features: dev.features,
        fwversion: format!("{:04x}", dev.fwversion),
        pollrate_us: dev.pollrate,
        active: dev.active,
        hw_profile: dev.hw.is_some(),
    };
    drop(dev);

    if opts.json {
        print_json(&output)?;
    } else {
        let w = kv_width(
            &[
                "Device:", "Model:", "hwload:", "Result:", "Features:", "Firmware:", "Poll rate:",
                "Active:", "HW profile:",
            ],
            &[],
        );
        kv("Device:", &output.product, w);
        kv("Model:", &output.model, w);
        kv("hwload:", output.hwload, w);
        kv("Result:", &output.result, w);
        kv("Features:", output.features, w);
        kv("Firmware:", &output.fwversion, w);
        if output.pollrate_us == 0 {
            kv("Poll rate:", "unknown", w);
        } else {
            kv("Poll rate:", format_args!("{} us", output.pollrate_us), w);
        }
        kv("Active:", output.active, w);
        kv("HW profile:", if output.hw_profile { "loaded" } else { "none" }, w);
    }

    result.map_err(Into::into)
}

//! `models` subcommand: list the device family table.

use periphd_lib::models::{DeviceModel, MODELS, VENDOR_ID};

use super::{Result, print_json};

/// Hardware exclusions of a model, as short labels.
fn exclusions(m: &DeviceModel) -> Vec<&'static str> {
    let mut out = Vec::new();
    if m.single_endpoint {
        out.push("single-endpoint");
    }
    if m.no_hw_storage {
        out.push("no-hw-storage");
    }
    if m.file_hwsave {
        out.push("file-hwsave");
    }
    if m.no_lights {
        out.push("no-lights");
    }
    if m.no_pollrate_readback {
        out.push("no-pollrate-readback");
    }
    out
}

pub(super) fn cmd_models(json: bool) -> Result<()> {
    if json {
        return print_json(&MODELS);
    }

    let name_w = MODELS.iter().map(|m| m.name.len()).max().unwrap_or(0) + 2;
    for m in MODELS {
        let excl = exclusions(m);
        println!(
            "{VENDOR_ID:04x}:{:04x}  {:<name_w$}{}",
            m.product,
            m.name,
            if excl.is_empty() {
                "-".to_string()
            } else {
                excl.join(", ")
            },
        );
    }
    Ok(())
}

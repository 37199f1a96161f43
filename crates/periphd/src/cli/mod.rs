//! CLI subcommands: configuration, model table, simulated bring-up and
//! mode switches.

mod bringup;
mod config_cmd;
mod mode_switch;
mod models;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use periphd_lib::bringup::HwLoadMode;
pub(super) use periphd_lib::config::Config;
pub(super) use periphd_lib::error::Result;
pub(super) use periphd_lib::features::Features;

const PADDING: usize = 2;

/// Options shared by every subcommand.
pub struct GlobalOpts {
    pub json: bool,
    pub config: Option<PathBuf>,
    pub hwload: Option<HwLoadMode>,
}

impl GlobalOpts {
    /// Config from `--config` or the default location, with `--hwload` applied.
    pub(super) fn effective_config(&self) -> Config {
        let mut config = load_config(self.config.as_deref());
        if let Some(mode) = self.hwload {
            config.hwload = mode;
        }
        config
    }
}

pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Print a value as pretty JSON.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| periphd_lib::PeriphdError::Config(format!("JSON output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Parse a USB product id given as hex (`0x1b13`, `1b13`) or decimal.
pub(super) fn parse_product(s: &str) -> std::result::Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None if s.chars().any(|c| c.is_ascii_alphabetic()) => u16::from_str_radix(s, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid product id '{s}': {e}"))
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
}

#[derive(Serialize)]
pub(super) struct BringUpOutput {
    pub product: String,
    pub model: String,
    pub hwload: HwLoadMode,
    pub result: String,
    pub ok: bool,
    pub features: Features,
    pub fwversion: String,
    pub pollrate_us: u16,
    pub active: bool,
    pub hw_profile: bool,
}

#[derive(Serialize)]
pub(super) struct ModeSwitchOutput {
    pub request: String,
    pub sent: bool,
    pub packet: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show current configuration and file paths
    Config,

    /// List known device families and their hardware exclusions
    Models,

    /// Run device bring-up against a simulated device
    Bringup {
        /// USB product id, hex (0x1b13) or decimal
        #[arg(long, value_parser = parse_product)]
        product: u16,
        /// Simulate a device that enumerated needing a firmware update
        #[arg(long)]
        needs_update: bool,
        /// Make the firmware version query fail
        #[arg(long)]
        fail_fw: bool,
        /// Make the hardware profile load fail
        #[arg(long)]
        fail_hw: bool,
        /// Make activation fail
        #[arg(long)]
        fail_activate: bool,
        /// Do not activate the device after setup
        #[arg(long)]
        no_activate: bool,
    },

    /// Encode a mode switch (apply_fw, isp, fast, medium, bld) and send it
    /// to a simulated device
    ModeSwitch {
        request: String,
        /// Make the transport report a failure
        #[arg(long)]
        fail_transmit: bool,
    },
}

pub fn run(cmd: Command, opts: &GlobalOpts) -> Result<()> {
    match cmd {
        Command::Config => config_cmd::cmd_config(opts),
        Command::Models => models::cmd_models(opts.json),
        Command::Bringup {
            product,
            needs_update,
            fail_fw,
            fail_hw,
            fail_activate,
            no_activate,
        } => bringup::cmd_bringup(
            opts,
            bringup::Simulation {
                product,
                needs_update,
                fail_fw,
                fail_hw,
                fail_activate,
                activate: !no_activate,
            },
        ),
        Command::ModeSwitch {
            request,
            fail_transmit,
        } => mode_switch::cmd_mode_switch(&request, fail_transmit, opts.json),
    }
}

/// Hex dump with 16 bytes per line.
pub(super) fn hex_lines(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}


#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn product_hex_prefixed() {
        assert_eq!(parse_product("0x1b13"), Ok(0x1b13));
        assert_eq!(parse_product("0X1B13"), Ok(0x1b13));
    }

    #[test]
    fn product_bare_hex() {
        assert_eq!(parse_product("1b3b"), Ok(0x1b3b));
    }

    #[test]
    fn product_decimal() {
        assert_eq!(parse_product("6931"), Ok(6931));
    }

    #[test]
    fn product_invalid() {
        assert!(parse_product("0xzz").is_err());
        assert!(parse_product("70000").is_err());
    }
}

//! `config` subcommand: show current configuration and file paths.

use super::{Config, ConfigOutput, GlobalOpts, Result, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(opts: &GlobalOpts) -> Result<()> {
    let config = opts.effective_config();
    let config_path = opts.config.clone().or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    if opts.json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
        };
        return print_json(&output);
    }

    let w = kv_width(&["Config file:"], &["hwload:"]);

    match &config_path {
        Some(p) if config_exists => {
            kv("Config file:", format_args!("{} (loaded)", p.display()), w)
        }
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let hwload = if opts.hwload.is_some() {
        format!("{} (from --hwload)", config.hwload)
    } else {
        config.hwload.to_string()
    };
    kv_indent("hwload:", hwload, w);

    Ok(())
}

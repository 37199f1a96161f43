//! periphd CLI: inspect configuration and device families, and dry-run
//! device bring-up and mode switches against a simulated transport.

use std::path::PathBuf;

use clap::Parser;
use periphd_lib::bringup::HwLoadMode;

mod cli;

#[derive(Parser)]
#[command(
    name = "periphd-cli",
    version,
    about = "Bring-up and mode-switch tooling for RGB keyboards and mice"
)]
struct Args {
    /// Output as JSON (for config, models, bringup, mode-switch)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured hardware-load policy (never, once, always)
    #[arg(long, global = true)]
    hwload: Option<HwLoadMode>,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = cli::GlobalOpts {
        json: args.json,
        config: args.config,
        hwload: args.hwload,
    };
    if let Err(e) = cli::run(args.command, &opts) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

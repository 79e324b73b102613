mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hidflash_core::{
    FailureKind, FlashConfig, FlashError, FlashSession, NusbHost, ThreadDelay,
};
use tracing::{error, info};

use console::ConsoleObserver;

#[derive(Parser, Debug)]
#[command(author, version, about = "USB HID bootloader flash tool", long_about = None)]
struct Args {
    /// Raw binary firmware image
    firmware: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bootloader vendor ID (hex)
    #[arg(long, value_parser = parse_hex)]
    vid: Option<u16>,

    /// Bootloader product ID (hex)
    #[arg(long, value_parser = parse_hex)]
    pid: Option<u16>,

    /// Oldest accepted bootloader release (hex bcdDevice, e.g. 0300)
    #[arg(long, value_parser = parse_hex)]
    min_version: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn log_level(verbose: bool) -> tracing::Level {
    if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(log_level(args.verbose).into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    println!("\n+-----------------------------------------------------------------------+");
    println!(
        "|         HID-Flash v{:<10} - USB HID bootloader flash tool           |",
        env!("CARGO_PKG_VERSION")
    );
    println!("+-----------------------------------------------------------------------+\n");

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            println!("\n{}", describe(&e));
            error!("Error: {:#}", e);
            1
        }
    };

    println!("> Finish");
    std::process::exit(code);
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => FlashConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FlashConfig::default(),
    };
    if let Some(vid) = args.vid {
        config.device.vendor_id = vid;
    }
    if let Some(pid) = args.pid {
        config.device.product_id = pid;
    }
    if let Some(min) = args.min_version {
        config.device.min_release = min;
    }

    info!("Starting HID-Flash (nusb backend)...");

    let host = NusbHost::new(config.timing.read_timeout());
    let mut session =
        FlashSession::with_observer(config, host, Arc::new(ConsoleObserver), ThreadDelay);
    let report = session.flash_file(&args.firmware)?;

    info!(
        sectors = report.sectors,
        firmware_bytes = report.firmware_bytes,
        bytes_sent = report.bytes_sent,
        "Flashing finished"
    );
    Ok(())
}

/// One line per failure kind, in the tool's console voice.
fn describe(err: &anyhow::Error) -> String {
    let Some(flash_err) = err.downcast_ref::<FlashError>() else {
        return format!("> Error: {err:#}");
    };

    match flash_err.kind() {
        FailureKind::FileOpenFailed => format!("> {flash_err}"),
        FailureKind::NotFound => format!("> Error - {flash_err} :("),
        FailureKind::OutdatedBootloader => {
            format!("> Error - {flash_err}. Please update the bootloader.")
        }
        FailureKind::OpenFailed => format!("> {flash_err}."),
        FailureKind::EraseCommandFailed => format!("> {flash_err}."),
        FailureKind::DataWriteFailed => format!("> {flash_err}. Firmware may be incomplete."),
        FailureKind::CommitTimeout => {
            format!("> Error - {flash_err}. The device stopped responding.")
        }
        FailureKind::StatusReadFailed => format!("> Error - {flash_err}."),
        FailureKind::FirmwareReadFailed => format!("> {flash_err}."),
    }
}

//! usb-probe
//!
//! Runs a catalog of control, bulk and interrupt probes against one USB
//! device and reports which ones the device answered.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use discovery::{EndpointRegistry, ProbeSession, summarize};
use harness::catalogs;
use harness::config::{ProbeConfig, parse_hex_id};
use harness::render;
use harness::usb::{UsbDevice, describe, interface_endpoints};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-probe")]
#[command(
    author,
    version,
    about = "USB protocol discovery - find out which requests a device answers"
)]
#[command(long_about = "
Sends a catalog of control, bulk and interrupt probes to one USB device,
classifies every answer, and prints a report of what the device responded to.

EXAMPLES:
    # Run the default survey catalog against the configured device
    usb-probe

    # Run the framed bulk commands with verbose logging
    usb-probe --catalog frames --log-level debug

    # Dump the device's descriptors and exit
    usb-probe --describe

    # Probe another device and keep a JSON report
    usb-probe --vid 0x1234 --pid 0xabcd --report ~/probe.json

    # Run a catalog file
    usb-probe --catalog ./my-probes.toml

CONFIGURATION:
    The harness looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-probe/probe.toml
    3. /etc/usb-probe/probe.toml
    4. Built-in defaults

EXIT STATUS:
    0 if at least one probe got an answer, 1 otherwise.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Vendor ID override (hex, e.g. 0x2541)
    #[arg(long, value_name = "VID")]
    vid: Option<String>,

    /// Product ID override (hex, e.g. 0xfa03)
    #[arg(long, value_name = "PID")]
    pid: Option<String>,

    /// Built-in catalog name or path to a catalog file
    #[arg(long, value_name = "NAME|PATH")]
    catalog: Option<String>,

    /// List built-in catalogs and exit
    #[arg(long)]
    list_catalogs: bool,

    /// Print the device's descriptors and exit
    #[arg(long)]
    describe: bool,

    /// Write the JSON report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Retries per probe after a timeout or transport error
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Delay between probes in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ProbeConfig::default();
        let path = ProbeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = if let Some(ref path) = args.config {
        ProbeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ProbeConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-probe v{}", env!("CARGO_PKG_VERSION"));

    if args.list_catalogs {
        list_catalogs();
        return Ok(ExitCode::SUCCESS);
    }

    let vendor_id = match args.vid.as_deref() {
        Some(vid) => parse_hex_id(vid, "vid")?,
        None => config.device.vendor_id()?,
    };
    let product_id = match args.pid.as_deref() {
        Some(pid) => parse_hex_id(pid, "pid")?,
        None => config.device.product_id()?,
    };

    let mut device = UsbDevice::find(vendor_id, product_id)
        .with_context(|| format!("Cannot open device {:04x}:{:04x}", vendor_id, product_id))?;

    if args.describe {
        let mut stdout = io::stdout().lock();
        describe(&device, &mut stdout).context("Failed to print descriptors")?;
        stdout.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    run_session(&args, &config, &mut device)
}

fn list_catalogs() {
    println!("Built-in catalogs:\n");
    for catalog in catalogs::BUILTIN_CATALOGS {
        let default = if catalog.name == catalogs::DEFAULT_CATALOG {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {}{} - {} probes, {} ms pacing",
            catalog.name,
            default,
            catalog.build().len(),
            catalog.pacing.as_millis()
        );
        println!("      {}", catalog.description);
    }
}

fn run_session(args: &Args, config: &ProbeConfig, device: &mut UsbDevice) -> Result<ExitCode> {
    let (catalog, pacing) = catalogs::select(args.catalog.as_deref(), config)?;

    let mut policy = config.policy.session_policy(pacing);
    if let Some(retries) = args.retries {
        policy.retry_count = retries;
    }
    if let Some(delay) = args.delay_ms {
        policy.inter_probe_delay = Duration::from_millis(delay);
    }

    let interface = config.device.interface;
    device
        .claim(interface, config.device.detach_kernel_driver)
        .context("Failed to claim device")?;

    let endpoints = interface_endpoints(device.device(), interface)
        .with_context(|| format!("Failed to read endpoints of interface {}", interface))?;
    let info = device.device_info();
    let registry = EndpointRegistry::new(info.max_packet_size0, endpoints);
    info!(
        "Interface {} exposes {} endpoints (control included)",
        interface,
        registry.len()
    );

    let mut session = ProbeSession::new(policy).with_device(info);
    let result = session.start(&catalog, &registry, &mut *device);
    device.close();
    let report = result.context("Probe session failed")?;

    let summary = summarize(report);
    let mut stdout = io::stdout().lock();
    render::write_report(&mut stdout, report, &summary, config.report.preview_bytes)
        .context("Failed to render report")?;
    stdout.flush()?;

    let json_path = args.report.clone().or_else(|| config.report.json_path());
    if let Some(path) = json_path {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!(
            "Report (format v{}) written to: {}",
            report.version,
            path.display()
        );
    }

    if summary.aborted {
        warn!("Session aborted, report covers {} probes", summary.total);
    }

    Ok(if summary.has_evidence() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

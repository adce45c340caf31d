//! Built-in probe catalogs and catalog selection
//!
//! The built-ins encode the exploration passes that first characterised the
//! fingerprint sensor this harness was written for (2541:fa03): framed bulk
//! commands, a survey of standard and vendor requests, and a deeper vendor
//! request exploration.

use crate::config::{CatalogEntry, ProbeConfig};
use anyhow::{Context, Result, anyhow};
use discovery::{Catalog, SessionPolicy};
use protocol::types::{DESCRIPTOR_TYPE_DEVICE, REQUEST_GET_DESCRIPTOR, REQUEST_GET_STATUS};
use protocol::{ControlSetup, ProbeSpec, TransferKind};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Catalog used when neither the command line nor the config names one
pub const DEFAULT_CATALOG: &str = "survey";

const EP_OUT: u8 = 0x01;
const EP_IN_BULK: u8 = 0x82;
const EP_IN_INT1: u8 = 0x83;
const EP_IN_INT2: u8 = 0x84;

/// A named catalog shipped with the harness
pub struct BuiltinCatalog {
    pub name: &'static str,
    pub description: &'static str,
    /// Delay between probes the catalog was designed with
    pub pacing: Duration,
    build: fn() -> Catalog,
}

impl BuiltinCatalog {
    pub fn build(&self) -> Catalog {
        (self.build)()
    }
}

pub const BUILTIN_CATALOGS: &[BuiltinCatalog] = &[
    BuiltinCatalog {
        name: "frames",
        description: "Framed bulk commands [marker, cmd, 0, 0, 0, 0, cmd, marker] on OUT 0x01 / IN 0x82",
        pacing: Duration::from_millis(500),
        build: frames,
    },
    BuiltinCatalog {
        name: "survey",
        description: "Standard requests, vendor IN requests 0x00-0x0F, interrupt and spontaneous bulk reads",
        pacing: Duration::from_millis(100),
        build: survey,
    },
    BuiltinCatalog {
        name: "vendor",
        description: "Vendor request 0x06/0x07 exploration, vendor writes followed by bulk reads, extended scan 0x10-0x1F",
        pacing: Duration::from_millis(100),
        build: vendor,
    },
];

/// Look up a built-in catalog by name
pub fn builtin(name: &str) -> Option<&'static BuiltinCatalog> {
    BUILTIN_CATALOGS.iter().find(|c| c.name == name)
}

fn frame(marker: u8, command: u8) -> Vec<u8> {
    vec![marker, command, 0x00, 0x00, 0x00, 0x00, command, marker]
}

fn framed_probe(label: &str, payload: Vec<u8>) -> ProbeSpec {
    ProbeSpec::bulk(label)
        .with_payload(payload)
        .with_out_endpoint(EP_OUT)
        .with_in_endpoint(EP_IN_BULK)
}

fn frames() -> Catalog {
    let commands = [
        ("Init", 0x01),
        ("Reset", 0x02),
        ("Scan", 0x04),
        ("Probe 0x00", 0x00),
        ("Probe 0x03", 0x03),
        ("Probe 0x05", 0x05),
    ];

    let mut catalog = Catalog::new("frames");
    catalog.extend(
        commands
            .iter()
            .map(|(label, command)| framed_probe(label, frame(0xea, *command))),
    );
    catalog.push(framed_probe("Short Init", vec![0xea, 0x01, 0xea]));
    catalog.push(framed_probe("Alt Frame", frame(0xeb, 0x01)));
    catalog
}

fn vendor_read(label: impl Into<String>, request: u8, value: u16) -> ProbeSpec {
    ProbeSpec::control(label, ControlSetup::vendor_in(request, value, 0)).with_expected_length(64)
}

fn bulk_read(label: &str) -> ProbeSpec {
    ProbeSpec::bulk(label).with_in_endpoint(EP_IN_BULK)
}

fn survey() -> Catalog {
    let mut catalog = Catalog::new("survey")
        .with(
            ProbeSpec::control(
                "Get Status",
                ControlSetup::standard_in(REQUEST_GET_STATUS, 0, 0),
            )
            .with_expected_length(2),
        )
        .with(
            ProbeSpec::control(
                "Get Descriptor (Device)",
                ControlSetup::standard_in(
                    REQUEST_GET_DESCRIPTOR,
                    u16::from(DESCRIPTOR_TYPE_DEVICE) << 8,
                    0,
                ),
            )
            .with_expected_length(18),
        );

    catalog.extend((0x00..=0x0f).map(|request| {
        vendor_read(format!("Vendor Request {:#04x}", request), request, 0)
    }));

    catalog
        .with(ProbeSpec::interrupt("Interrupt INT1").with_in_endpoint(EP_IN_INT1))
        .with(ProbeSpec::interrupt("Interrupt INT2").with_in_endpoint(EP_IN_INT2))
        .with(bulk_read("Spontaneous bulk read"))
}

fn write_then_bulk_read(label: &str, request: u8, value: u16, payload: &[u8]) -> ProbeSpec {
    ProbeSpec::write_then_read(
        label,
        ControlSetup::vendor_out(request, value, 0),
        TransferKind::Bulk,
        Some(EP_IN_BULK),
    )
    .with_payload(payload)
}

fn vendor() -> Catalog {
    let mut catalog = Catalog::new("vendor")
        .with(vendor_read("Request 0x06 (status)", 0x06, 0))
        .with(vendor_read("Request 0x07 (device info)", 0x07, 0))
        .with(bulk_read("Spontaneous data check"));

    for request in [0x06, 0x07] {
        catalog.extend((0..4).map(|value| {
            vendor_read(
                format!("Request {:#04x} value {:#06x}", request, value),
                request,
                value,
            )
        }));
    }

    catalog.extend([
        write_then_bulk_read("Init write + bulk read", 0x01, 0, &[0x01, 0x00, 0x00, 0x00]),
        write_then_bulk_read("Reset write + bulk read", 0x02, 0, &[0x02, 0x00, 0x00, 0x00]),
        write_then_bulk_read("Write 0x06 + bulk read", 0x06, 1, &[0x01]),
    ]);

    catalog.extend(
        (0x10..=0x1f).map(|request| vendor_read(format!("Request {:#04x}", request), request, 0)),
    );

    catalog
        .with(vendor_read("Final status check", 0x06, 0))
        .with(vendor_read("Final device info", 0x07, 0))
        .with(bulk_read("Final bulk read"))
}

/// Catalog file with `[[probes]]` tables
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    probes: Vec<CatalogEntry>,
}

/// Build a catalog from declarative entries
pub fn from_entries(name: &str, entries: &[CatalogEntry]) -> Result<Catalog> {
    let mut catalog = Catalog::new(name);
    for entry in entries {
        catalog.push(entry.to_spec()?);
    }
    catalog
        .validate()
        .with_context(|| format!("Invalid catalog '{}'", name))?;
    Ok(catalog)
}

/// Load a catalog from a TOML file
pub fn load_catalog_file(path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    let file: CatalogFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

    if file.probes.is_empty() {
        return Err(anyhow!(
            "Catalog file {} contains no [[probes]] entries",
            path.display()
        ));
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    from_entries(name, &file.probes)
}

/// Pick the catalog to run and the pacing it was designed for
///
/// `requested` is a built-in name or a path to a catalog file. Without one,
/// the config's `[[probes]]` are used if present, else [`DEFAULT_CATALOG`].
pub fn select(requested: Option<&str>, config: &ProbeConfig) -> Result<(Catalog, Duration)> {
    let default_pacing = SessionPolicy::default().inter_probe_delay;

    match requested {
        Some(name) => match builtin(name) {
            Some(catalog) => Ok((catalog.build(), catalog.pacing)),
            None => {
                let path = PathBuf::from(shellexpand::tilde(name).as_ref());
                if !path.exists() {
                    return Err(anyhow!(
                        "Unknown catalog '{}': not a built-in ({}) and no such file",
                        name,
                        builtin_names().join(", ")
                    ));
                }
                Ok((load_catalog_file(&path)?, default_pacing))
            }
        },
        None if !config.probes.is_empty() => {
            Ok((from_entries("config", &config.probes)?, default_pacing))
        }
        None => {
            let catalog = builtin(DEFAULT_CATALOG)
                .ok_or_else(|| anyhow!("Default catalog '{}' missing", DEFAULT_CATALOG))?;
            Ok((catalog.build(), catalog.pacing))
        }
    }
}

pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN_CATALOGS.iter().map(|c| c.name).collect()
}

//! Console rendering of session reports

use protocol::{ProbeRecord, SessionReport, SessionSummary, VerdictKind};
use std::io::{self, Write};

const BYTES_PER_ROW: usize = 16;

const NEXT_STEPS: &[&str] = &[
    "Try the interrupt endpoints (--catalog survey)",
    "Capture USB traffic of a working driver with Wireshark (usbmon)",
    "Check whether the device needs a firmware upload first",
];

/// Hex dump, 16 bytes per row, each row prefixed with its offset
pub fn hex_dump(data: &[u8]) -> String {
    data.chunks(BYTES_PER_ROW)
        .enumerate()
        .map(|(row, chunk)| {
            let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            format!("  {:04x}: {}", row * BYTES_PER_ROW, bytes.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print at most `preview_bytes` of `data`, noting how much was cut
pub fn write_preview<W: Write>(out: &mut W, data: &[u8], preview_bytes: usize) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    let shown = data.len().min(preview_bytes);
    writeln!(out, "{}", hex_dump(&data[..shown]))?;
    if data.len() > shown {
        writeln!(out, "  ... ({} more bytes)", data.len() - shown)?;
    }
    Ok(())
}

/// One line per record plus the payload preview
pub fn write_record<W: Write>(
    out: &mut W,
    index: usize,
    total: usize,
    record: &ProbeRecord,
    preview_bytes: usize,
) -> io::Result<()> {
    let retries = if record.attempts > 1 {
        format!(" after {} attempts", record.attempts)
    } else {
        String::new()
    };
    writeln!(
        out,
        "[{}/{}] {}: {}{}",
        index + 1,
        total,
        record.label,
        record.verdict,
        retries
    )?;

    if let Some(payload) = record.verdict.payload() {
        write_preview(out, payload, preview_bytes)?;
    }
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, summary: &SessionSummary) -> io::Result<()> {
    writeln!(out, "\n=== Summary ===")?;
    writeln!(out, "Total probes: {}", summary.total)?;
    writeln!(out, "Successful: {}", summary.succeeded)?;
    writeln!(out, "Failed: {}", summary.failed())?;

    for kind in VerdictKind::ALL {
        let count = summary.count(kind);
        if count > 0 {
            writeln!(out, "  {}: {}", kind, count)?;
        }
    }

    if summary.aborted {
        writeln!(out, "Session aborted before the catalog finished")?;
    }
    Ok(())
}

/// Render a whole report: records, abort marker, summary and hints
pub fn write_report<W: Write>(
    out: &mut W,
    report: &SessionReport,
    summary: &SessionSummary,
    preview_bytes: usize,
) -> io::Result<()> {
    if let Some(device) = &report.device {
        writeln!(
            out,
            "Device {:04x}:{:04x} on bus {:03} address {:03} ({})",
            device.vendor_id,
            device.product_id,
            device.bus_number,
            device.device_address,
            device.product.as_deref().unwrap_or("unknown product")
        )?;
    }

    for (index, record) in report.records.iter().enumerate() {
        write_record(out, index, report.catalog_len, record, preview_bytes)?;
    }

    if let Some(marker) = &report.aborted {
        writeln!(
            out,
            "ABORTED at [{}/{}] {}: {}",
            marker.at_index + 1,
            report.catalog_len,
            marker.at_label,
            marker.reason
        )?;
    }

    write_summary(out, summary)?;

    if summary.has_evidence() {
        writeln!(out, "\nProbes worth a closer look:")?;
        for record in report.evidence() {
            writeln!(out, "  {}: {}", record.label, record.verdict)?;
        }
    } else {
        writeln!(out, "\nNo probe got an answer. Next steps:")?;
        for (i, step) in NEXT_STEPS.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, step)?;
        }
    }
    Ok(())
}

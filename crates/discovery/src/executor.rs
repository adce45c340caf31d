//! Transfer execution
//!
//! Runs one probe once against a [`DeviceIo`] and reports what happened as a
//! [`TransferOutcome`]. Transport failures are data, not errors: the only
//! failure returned to the caller is a closed device handle.

use crate::catalog::{MAX_CONTROL_LENGTH, endpoint_hints};
use crate::registry::EndpointRegistry;
use protocol::{
    ControlSetup, DeviceIo, Direction, EndpointDescriptor, ProbeChannel, ProbeError, ProbeSpec,
    Result, TransferKind, TransferOutcome, TransferTelemetry, UsbError,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Control IN buffer when the probe does not say how much to expect
pub const CONTROL_CAPTURE_CAP: usize = 256;

/// Bulk IN buffer; no bulk probe may expect more
pub const BULK_CAPTURE_CAP: usize = 8192;

/// Interrupt IN buffer; no interrupt probe may expect more
pub const INTERRUPT_CAPTURE_CAP: usize = 256;

/// Receive buffer size of a bulk or interrupt read
pub(crate) fn pipe_capture_cap(kind: TransferKind) -> usize {
    match kind {
        TransferKind::Interrupt => INTERRUPT_CAPTURE_CAP,
        _ => BULK_CAPTURE_CAP,
    }
}

/// Execute a probe once
///
/// Send-then-receive probes only receive after a successful send, and both
/// phases share `timeout`. Endpoints the registry cannot resolve produce an
/// outcome carrying `NotFound` without any device I/O.
///
/// # Errors
///
/// Returns [`ProbeError::ProtocolViolation`] when the device handle is closed.
pub fn execute_probe<D>(
    device: &mut D,
    registry: &EndpointRegistry,
    spec: &ProbeSpec,
    timeout: Duration,
) -> Result<TransferOutcome>
where
    D: DeviceIo + ?Sized,
{
    if !device.is_open() {
        return Err(ProbeError::ProtocolViolation(format!(
            "device handle is closed, cannot execute '{}'",
            spec.label
        )));
    }

    let outcome = match resolve_endpoints(registry, spec) {
        Err(e) => {
            warn!("Probe '{}' skipped: {}", spec.label, e);
            TransferOutcome::failed(UsbError::NotFound)
        }
        Ok(endpoints) => match &spec.channel {
            ProbeChannel::Control { setup } => execute_control(device, setup, spec, timeout),
            ProbeChannel::Bulk { .. } | ProbeChannel::Interrupt { .. } => {
                execute_pipe(device, spec.kind(), &endpoints, spec, timeout)
            }
            ProbeChannel::WriteThenRead {
                setup, read_kind, ..
            } => execute_write_then_read(device, setup, *read_kind, &endpoints, spec, timeout),
        },
    };

    match &outcome.error {
        Some(error) => debug!(
            "Probe '{}' failed after {:?}: {}",
            spec.label, outcome.elapsed, error
        ),
        None => debug!(
            "Probe '{}' moved {} bytes in {:?}",
            spec.label, outcome.bytes_transferred, outcome.elapsed
        ),
    }

    Ok(outcome)
}

/// Resolved OUT and IN endpoints of a probe (control probes need neither)
#[derive(Debug, Default)]
struct Endpoints {
    out: Option<EndpointDescriptor>,
    input: Option<EndpointDescriptor>,
}

fn resolve_endpoints(registry: &EndpointRegistry, spec: &ProbeSpec) -> Result<Endpoints> {
    let mut endpoints = Endpoints::default();
    for (kind, hint) in endpoint_hints(spec) {
        let endpoint = registry.resolve(kind, hint)?;
        match hint.direction() {
            Direction::Out => endpoints.out = Some(endpoint),
            Direction::In => endpoints.input = Some(endpoint),
        }
    }
    Ok(endpoints)
}

/// Bookkeeping for a single execution
struct Attempt {
    started: Instant,
    telemetry: TransferTelemetry,
    bytes_sent: usize,
}

impl Attempt {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            telemetry: TransferTelemetry::default(),
            bytes_sent: 0,
        }
    }

    fn send(
        &mut self,
        result: std::result::Result<usize, UsbError>,
        expected: usize,
    ) -> Option<UsbError> {
        self.telemetry.send_calls += 1;
        match result {
            Ok(sent) => {
                if sent < expected {
                    debug!("Partial send: {} of {} bytes accepted", sent, expected);
                }
                self.bytes_sent = sent;
                None
            }
            Err(error) => {
                warn!("Send failed: {}", error);
                Some(error)
            }
        }
    }

    fn receive(
        mut self,
        result: std::result::Result<usize, UsbError>,
        mut buf: Vec<u8>,
    ) -> TransferOutcome {
        self.telemetry.receive_calls += 1;
        match result {
            Ok(received) => {
                buf.truncate(received);
                self.finish(None, received, buf)
            }
            Err(error) => self.finish(Some(error), 0, Vec::new()),
        }
    }

    fn failed(self, error: UsbError) -> TransferOutcome {
        self.finish(Some(error), 0, Vec::new())
    }

    /// Completion of a probe whose last phase was a send
    fn sent(self) -> TransferOutcome {
        let sent = self.bytes_sent;
        self.finish(None, sent, Vec::new())
    }

    fn finish(
        self,
        error: Option<UsbError>,
        bytes_transferred: usize,
        payload: Vec<u8>,
    ) -> TransferOutcome {
        TransferOutcome {
            error,
            bytes_sent: self.bytes_sent,
            bytes_transferred,
            payload,
            elapsed: self.started.elapsed(),
            telemetry: self.telemetry,
        }
    }
}

fn execute_control<D: DeviceIo + ?Sized>(
    device: &mut D,
    setup: &ControlSetup,
    spec: &ProbeSpec,
    timeout: Duration,
) -> TransferOutcome {
    debug!(
        "Control transfer '{}': {}, data_len={}",
        spec.label,
        setup,
        spec.payload.len()
    );

    let mut attempt = Attempt::start();
    match setup.direction() {
        Direction::In => {
            let length = spec
                .expected_length
                .unwrap_or(CONTROL_CAPTURE_CAP)
                .min(MAX_CONTROL_LENGTH);
            let mut buf = vec![0u8; length];
            let result = device.read_control(setup, &mut buf, timeout);
            attempt.receive(result, buf)
        }
        Direction::Out => {
            let result = device.write_control(setup, &spec.payload, timeout);
            match attempt.send(result, spec.payload.len()) {
                Some(error) => attempt.failed(error),
                None => attempt.sent(),
            }
        }
    }
}

fn execute_pipe<D: DeviceIo + ?Sized>(
    device: &mut D,
    kind: TransferKind,
    endpoints: &Endpoints,
    spec: &ProbeSpec,
    timeout: Duration,
) -> TransferOutcome {
    let mut attempt = Attempt::start();

    if !spec.payload.is_empty() {
        let Some(out) = endpoints.out else {
            return attempt.failed(UsbError::NotFound);
        };
        debug!(
            "{} OUT '{}': endpoint={:#04x}, data_len={}",
            kind,
            spec.label,
            out.address,
            spec.payload.len()
        );
        let result = write_pipe(device, kind, out.address, &spec.payload, timeout);
        if let Some(error) = attempt.send(result, spec.payload.len()) {
            return attempt.failed(error);
        }
    }

    receive_pipe(device, kind, endpoints, spec, timeout, attempt)
}

fn execute_write_then_read<D: DeviceIo + ?Sized>(
    device: &mut D,
    setup: &ControlSetup,
    read_kind: TransferKind,
    endpoints: &Endpoints,
    spec: &ProbeSpec,
    timeout: Duration,
) -> TransferOutcome {
    debug!(
        "Write-then-read '{}': {}, data_len={}",
        spec.label,
        setup,
        spec.payload.len()
    );

    let mut attempt = Attempt::start();
    let result = device.write_control(setup, &spec.payload, timeout);
    if let Some(error) = attempt.send(result, spec.payload.len()) {
        return attempt.failed(error);
    }

    receive_pipe(device, read_kind, endpoints, spec, timeout, attempt)
}

fn receive_pipe<D: DeviceIo + ?Sized>(
    device: &mut D,
    kind: TransferKind,
    endpoints: &Endpoints,
    spec: &ProbeSpec,
    timeout: Duration,
    attempt: Attempt,
) -> TransferOutcome {
    let Some(input) = endpoints.input else {
        return attempt.failed(UsbError::NotFound);
    };

    let mut buf = vec![0u8; pipe_capture_cap(kind)];

    debug!(
        "{} IN '{}': endpoint={:#04x}, buffer={}",
        kind,
        spec.label,
        input.address,
        buf.len()
    );
    let result = read_pipe(device, kind, input.address, &mut buf, timeout);
    attempt.receive(result, buf)
}

fn write_pipe<D: DeviceIo + ?Sized>(
    device: &mut D,
    kind: TransferKind,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> std::result::Result<usize, UsbError> {
    match kind {
        TransferKind::Bulk => device.write_bulk(endpoint, data, timeout),
        TransferKind::Interrupt => device.write_interrupt(endpoint, data, timeout),
        TransferKind::Control => Err(UsbError::InvalidParam),
    }
}

fn read_pipe<D: DeviceIo + ?Sized>(
    device: &mut D,
    kind: TransferKind,
    endpoint: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> std::result::Result<usize, UsbError> {
    match kind {
        TransferKind::Bulk => device.read_bulk(endpoint, buf, timeout),
        TransferKind::Interrupt => device.read_interrupt(endpoint, buf, timeout),
        TransferKind::Control => Err(UsbError::InvalidParam),
    }
}

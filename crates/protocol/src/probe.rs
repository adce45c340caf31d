//! Probe specifications
//!
//! A [`ProbeSpec`] is one candidate command: which channel to use, what to
//! send and how much to expect back. Specs are plain data; the catalog orders
//! them and the session executes them.

use crate::types::{ControlSetup, Direction, TransferKind};
use serde::{Deserialize, Serialize};

/// Channel a probe is sent on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeChannel {
    /// Single control transfer on endpoint zero; direction from bmRequestType
    Control { setup: ControlSetup },
    /// Optional send on an OUT endpoint, then a receive on an IN endpoint
    Bulk {
        out_endpoint: Option<u8>,
        in_endpoint: Option<u8>,
    },
    /// Same shape as bulk, on interrupt endpoints
    Interrupt {
        out_endpoint: Option<u8>,
        in_endpoint: Option<u8>,
    },
    /// Control OUT write followed by a read on a bulk or interrupt IN endpoint
    WriteThenRead {
        setup: ControlSetup,
        read_kind: TransferKind,
        read_endpoint: Option<u8>,
    },
}

/// One candidate probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Human-readable label, used as the report key
    pub label: String,
    /// Channel and addressing
    pub channel: ProbeChannel,
    /// Bytes to send (may be empty)
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Expected receive length; `None` means "whatever the device returns"
    pub expected_length: Option<usize>,
}

impl ProbeSpec {
    fn new(label: impl Into<String>, channel: ProbeChannel) -> Self {
        Self {
            label: label.into(),
            channel,
            payload: Vec::new(),
            expected_length: None,
        }
    }

    /// Control probe. IN requests read `expected_length` bytes, OUT requests
    /// send the payload.
    pub fn control(label: impl Into<String>, setup: ControlSetup) -> Self {
        Self::new(label, ProbeChannel::Control { setup })
    }

    /// Bulk probe using the first bulk endpoints the registry knows about
    pub fn bulk(label: impl Into<String>) -> Self {
        Self::new(
            label,
            ProbeChannel::Bulk {
                out_endpoint: None,
                in_endpoint: None,
            },
        )
    }

    /// Interrupt probe using the first interrupt endpoints the registry knows about
    pub fn interrupt(label: impl Into<String>) -> Self {
        Self::new(
            label,
            ProbeChannel::Interrupt {
                out_endpoint: None,
                in_endpoint: None,
            },
        )
    }

    /// Control write whose answer is expected on a bulk or interrupt IN endpoint
    pub fn write_then_read(
        label: impl Into<String>,
        setup: ControlSetup,
        read_kind: TransferKind,
        read_endpoint: Option<u8>,
    ) -> Self {
        Self::new(
            label,
            ProbeChannel::WriteThenRead {
                setup,
                read_kind,
                read_endpoint,
            },
        )
    }

    /// Set the bytes to send
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the expected receive length
    pub fn with_expected_length(mut self, length: usize) -> Self {
        self.expected_length = Some(length);
        self
    }

    /// Pin the OUT endpoint of a bulk or interrupt probe
    pub fn with_out_endpoint(mut self, endpoint: u8) -> Self {
        match &mut self.channel {
            ProbeChannel::Bulk { out_endpoint, .. }
            | ProbeChannel::Interrupt { out_endpoint, .. } => *out_endpoint = Some(endpoint),
            ProbeChannel::Control { .. } | ProbeChannel::WriteThenRead { .. } => {}
        }
        self
    }

    /// Pin the IN endpoint of a bulk, interrupt or write-then-read probe
    pub fn with_in_endpoint(mut self, endpoint: u8) -> Self {
        match &mut self.channel {
            ProbeChannel::Bulk { in_endpoint, .. }
            | ProbeChannel::Interrupt { in_endpoint, .. } => *in_endpoint = Some(endpoint),
            ProbeChannel::WriteThenRead { read_endpoint, .. } => *read_endpoint = Some(endpoint),
            ProbeChannel::Control { .. } => {}
        }
        self
    }

    /// Transfer kind of the first transfer this probe issues
    pub fn kind(&self) -> TransferKind {
        match self.channel {
            ProbeChannel::Control { .. } | ProbeChannel::WriteThenRead { .. } => {
                TransferKind::Control
            }
            ProbeChannel::Bulk { .. } => TransferKind::Bulk,
            ProbeChannel::Interrupt { .. } => TransferKind::Interrupt,
        }
    }

    /// Whether the probe ends with a device-to-host data phase
    pub fn reads_response(&self) -> bool {
        match &self.channel {
            ProbeChannel::Control { setup } => setup.direction() == Direction::In,
            _ => true,
        }
    }

    /// Length the classifier compares the byte count against
    ///
    /// Probes that only send are measured against their payload length.
    pub fn effective_expected_length(&self) -> Option<usize> {
        if self.reads_response() {
            self.expected_length
        } else {
            self.expected_length.or(Some(self.payload.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_builder() {
        let spec = ProbeSpec::bulk("Init")
            .with_payload([0xea, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0xea])
            .with_out_endpoint(0x01)
            .with_in_endpoint(0x82)
            .with_expected_length(64);

        assert_eq!(spec.kind(), TransferKind::Bulk);
        assert_eq!(spec.payload.len(), 8);
        assert_eq!(spec.expected_length, Some(64));
        assert_eq!(
            spec.channel,
            ProbeChannel::Bulk {
                out_endpoint: Some(0x01),
                in_endpoint: Some(0x82)
            }
        );
    }

    #[test]
    fn test_control_out_measured_against_payload() {
        let spec = ProbeSpec::control("Init write", ControlSetup::vendor_out(0x01, 0, 0))
            .with_payload([0x01, 0x00, 0x00, 0x00]);
        assert!(!spec.reads_response());
        assert_eq!(spec.effective_expected_length(), Some(4));

        let read = ProbeSpec::control("Status", ControlSetup::vendor_in(0x06, 0, 0));
        assert!(read.reads_response());
        assert_eq!(read.effective_expected_length(), None);
    }

    #[test]
    fn test_write_then_read_endpoint() {
        let spec = ProbeSpec::write_then_read(
            "Init then read",
            ControlSetup::vendor_out(0x01, 0, 0),
            TransferKind::Bulk,
            None,
        )
        .with_in_endpoint(0x82);

        assert_eq!(spec.kind(), TransferKind::Control);
        assert!(matches!(
            spec.channel,
            ProbeChannel::WriteThenRead {
                read_endpoint: Some(0x82),
                ..
            }
        ));
    }

    #[test]
    fn test_endpoint_pins_ignored_for_control() {
        let spec = ProbeSpec::control("Status", ControlSetup::vendor_in(0x06, 0, 0))
            .with_out_endpoint(0x01)
            .with_in_endpoint(0x82);
        assert!(matches!(spec.channel, ProbeChannel::Control { .. }));
    }
}

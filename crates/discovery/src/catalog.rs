//! Command catalog
//!
//! An ordered, declarative list of probes. Execution order is catalog order;
//! entries do not depend on each other's outcomes.

use crate::executor::pipe_capture_cap;
use crate::registry::EndpointRegistry;
use protocol::{
    Direction, EndpointHint, ProbeChannel, ProbeError, ProbeSpec, Result, TransferKind,
};
use std::collections::HashSet;

/// Largest data stage a control transfer can carry (wLength is 16 bits)
pub(crate) const MAX_CONTROL_LENGTH: usize = u16::MAX as usize;

/// Ordered collection of probes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    name: String,
    probes: Vec<ProbeSpec>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probes: Vec::new(),
        }
    }

    /// Append a probe (builder style)
    pub fn with(mut self, probe: ProbeSpec) -> Self {
        self.probes.push(probe);
        self
    }

    /// Append a probe
    pub fn push(&mut self, probe: ProbeSpec) {
        self.probes.push(probe);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probes(&self) -> &[ProbeSpec] {
        &self.probes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProbeSpec> {
        self.probes.iter()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Check that every entry can be executed and reported
    ///
    /// Labels key the report, so they must be non-empty and unique. Control
    /// data stages must fit in wLength, and the first half of a write-then-read
    /// probe must be an OUT request followed by a bulk or interrupt read.
    /// Pipe reads may not expect more than their capture cap, and pinned
    /// endpoint addresses must carry the direction they are used for.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for probe in &self.probes {
            let invalid = |reason: &str| ProbeError::InvalidCatalog {
                label: probe.label.clone(),
                reason: reason.to_string(),
            };

            if probe.label.trim().is_empty() {
                return Err(invalid("label must not be empty"));
            }
            if !seen.insert(probe.label.as_str()) {
                return Err(invalid("duplicate label"));
            }

            match &probe.channel {
                ProbeChannel::Control { setup } => {
                    let data_stage = match setup.direction() {
                        Direction::In => probe.expected_length.unwrap_or(0),
                        Direction::Out => probe.payload.len(),
                    };
                    if data_stage > MAX_CONTROL_LENGTH {
                        return Err(invalid("control data stage exceeds 65535 bytes"));
                    }
                    if setup.direction() == Direction::In && !probe.payload.is_empty() {
                        return Err(invalid("IN control request cannot carry a payload"));
                    }
                }
                ProbeChannel::WriteThenRead {
                    setup,
                    read_kind,
                    read_endpoint,
                } => {
                    if setup.direction() != Direction::Out {
                        return Err(invalid("write-then-read needs an OUT control request"));
                    }
                    if probe.payload.len() > MAX_CONTROL_LENGTH {
                        return Err(invalid("control data stage exceeds 65535 bytes"));
                    }
                    if *read_kind == TransferKind::Control {
                        return Err(invalid("write-then-read must read from bulk or interrupt"));
                    }
                    if is_out_address(*read_endpoint) {
                        return Err(invalid("read_endpoint is an OUT address"));
                    }
                    if probe.expected_length.unwrap_or(0) > pipe_capture_cap(*read_kind) {
                        return Err(invalid("expected_length exceeds the capture cap"));
                    }
                }
                ProbeChannel::Bulk {
                    out_endpoint,
                    in_endpoint,
                }
                | ProbeChannel::Interrupt {
                    out_endpoint,
                    in_endpoint,
                } => {
                    if is_out_address(*in_endpoint) {
                        return Err(invalid("in_endpoint is an OUT address"));
                    }
                    if let Some(address) = out_endpoint
                        && Direction::from_bits(*address) != Direction::Out
                    {
                        return Err(invalid("out_endpoint is an IN address"));
                    }
                    if probe.expected_length.unwrap_or(0) > pipe_capture_cap(probe.kind()) {
                        return Err(invalid("expected_length exceeds the capture cap"));
                    }
                }
            }
        }

        Ok(())
    }

    /// Probes whose endpoints the registry cannot resolve
    ///
    /// These still run; the executor records them as `NotFound` transport
    /// errors without touching the device.
    pub fn unresolved<'a>(
        &'a self,
        registry: &EndpointRegistry,
    ) -> Vec<(&'a ProbeSpec, ProbeError)> {
        self.probes
            .iter()
            .filter_map(|probe| {
                endpoint_hints(probe)
                    .into_iter()
                    .find_map(|(kind, hint)| registry.resolve(kind, hint).err())
                    .map(|err| (probe, err))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ProbeSpec;
    type IntoIter = std::slice::Iter<'a, ProbeSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.probes.iter()
    }
}

impl Extend<ProbeSpec> for Catalog {
    fn extend<T: IntoIterator<Item = ProbeSpec>>(&mut self, iter: T) {
        self.probes.extend(iter);
    }
}

fn is_out_address(address: Option<u8>) -> bool {
    address.is_some_and(|a| Direction::from_bits(a) == Direction::Out)
}

/// Endpoints a probe will address, in the order the executor resolves them
pub(crate) fn endpoint_hints(probe: &ProbeSpec) -> Vec<(TransferKind, EndpointHint)> {
    match &probe.channel {
        ProbeChannel::Control { .. } => Vec::new(),
        ProbeChannel::Bulk {
            out_endpoint,
            in_endpoint,
        } => pipe_hints(TransferKind::Bulk, probe, *out_endpoint, *in_endpoint),
        ProbeChannel::Interrupt {
            out_endpoint,
            in_endpoint,
        } => pipe_hints(TransferKind::Interrupt, probe, *out_endpoint, *in_endpoint),
        ProbeChannel::WriteThenRead {
            read_kind,
            read_endpoint,
            ..
        } => vec![(
            *read_kind,
            EndpointHint::or_any(*read_endpoint, Direction::In),
        )],
    }
}

fn pipe_hints(
    kind: TransferKind,
    probe: &ProbeSpec,
    out_endpoint: Option<u8>,
    in_endpoint: Option<u8>,
) -> Vec<(TransferKind, EndpointHint)> {
    let mut hints = Vec::with_capacity(2);
    if !probe.payload.is_empty() {
        hints.push((kind, EndpointHint::or_any(out_endpoint, Direction::Out)));
    }
    hints.push((kind, EndpointHint::or_any(in_endpoint, Direction::In)));
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{BULK_CAPTURE_CAP, INTERRUPT_CAPTURE_CAP};
    use common::test_utils::create_mock_endpoints;
    use protocol::ControlSetup;

    #[test]
    fn test_catalog_preserves_order() {
        let catalog = Catalog::new("order")
            .with(ProbeSpec::bulk("first"))
            .with(ProbeSpec::bulk("second"))
            .with(ProbeSpec::bulk("third"));

        let labels: Vec<_> = catalog.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["first", "second", "third"]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.name(), "order");
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let catalog = Catalog::new("dup")
            .with(ProbeSpec::bulk("same"))
            .with(ProbeSpec::interrupt("same"));
        assert!(matches!(
            catalog.validate(),
            Err(ProbeError::InvalidCatalog { label, .. }) if label == "same"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_label() {
        let catalog = Catalog::new("empty").with(ProbeSpec::bulk("  "));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_write_then_read_shape() {
        let bad_direction = Catalog::new("wtr").with(ProbeSpec::write_then_read(
            "in write",
            ControlSetup::vendor_in(0x01, 0, 0),
            TransferKind::Bulk,
            Some(0x82),
        ));
        assert!(bad_direction.validate().is_err());

        let bad_kind = Catalog::new("wtr").with(ProbeSpec::write_then_read(
            "control read",
            ControlSetup::vendor_out(0x01, 0, 0),
            TransferKind::Control,
            None,
        ));
        assert!(bad_kind.validate().is_err());

        let good = Catalog::new("wtr").with(
            ProbeSpec::write_then_read(
                "init",
                ControlSetup::vendor_out(0x01, 0, 0),
                TransferKind::Bulk,
                Some(0x82),
            )
            .with_payload([0x01, 0x00, 0x00, 0x00]),
        );
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_validate_control_payload_rules() {
        let read_with_payload = Catalog::new("c").with(
            ProbeSpec::control("read", ControlSetup::vendor_in(0x06, 0, 0)).with_payload([1]),
        );
        assert!(read_with_payload.validate().is_err());

        let oversized = Catalog::new("c").with(
            ProbeSpec::control("read", ControlSetup::vendor_in(0x06, 0, 0))
                .with_expected_length(70_000),
        );
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_validate_in_endpoint_direction() {
        let catalog = Catalog::new("dir").with(ProbeSpec::bulk("read").with_in_endpoint(0x02));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_out_endpoint_direction() {
        let catalog = Catalog::new("dir").with(
            ProbeSpec::bulk("write")
                .with_payload([0xea])
                .with_out_endpoint(0x82),
        );
        assert!(catalog.validate().is_err());

        let catalog = Catalog::new("dir").with(
            ProbeSpec::interrupt("write")
                .with_payload([0xea])
                .with_out_endpoint(0x01)
                .with_in_endpoint(0x83),
        );
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_validate_read_endpoint_direction() {
        let catalog = Catalog::new("dir").with(ProbeSpec::write_then_read(
            "init",
            ControlSetup::vendor_out(0x01, 0, 0),
            TransferKind::Bulk,
            Some(0x01),
        ));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_pipe_expected_length_cap() {
        let at_cap = Catalog::new("cap")
            .with(ProbeSpec::bulk("bulk").with_expected_length(BULK_CAPTURE_CAP))
            .with(ProbeSpec::interrupt("int").with_expected_length(INTERRUPT_CAPTURE_CAP));
        assert!(at_cap.validate().is_ok());

        for spec in [
            ProbeSpec::bulk("huge").with_expected_length(1 << 26),
            ProbeSpec::bulk("max").with_expected_length(usize::MAX),
            ProbeSpec::interrupt("int").with_expected_length(INTERRUPT_CAPTURE_CAP + 1),
            ProbeSpec::write_then_read(
                "wtr",
                ControlSetup::vendor_out(0x01, 0, 0),
                TransferKind::Interrupt,
                Some(0x83),
            )
            .with_expected_length(BULK_CAPTURE_CAP),
        ] {
            let label = spec.label.clone();
            let err = Catalog::new("cap").with(spec).validate().unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidCatalog { label: ref l, .. } if *l == label),
                "unexpected error: {:?}",
                err
            );
        }
    }

    #[test]
    fn test_unresolved_probes() {
        let registry = EndpointRegistry::new(64, create_mock_endpoints());
        let catalog = Catalog::new("resolve")
            .with(ProbeSpec::bulk("ok").with_in_endpoint(0x82))
            .with(ProbeSpec::interrupt("missing").with_in_endpoint(0x85))
            .with(
                ProbeSpec::interrupt("no out")
                    .with_payload([1, 2])
                    .with_in_endpoint(0x83),
            )
            .with(ProbeSpec::control("ctrl", ControlSetup::vendor_in(0, 0, 0)));

        let unresolved = catalog.unresolved(&registry);
        let labels: Vec<_> = unresolved.iter().map(|(p, _)| p.label.as_str()).collect();
        assert_eq!(labels, ["missing", "no out"]);
    }
}

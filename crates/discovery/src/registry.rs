//! Endpoint registry
//!
//! Read-only view of the endpoints a session may address. It is populated once
//! from descriptor enumeration and never changes while a session runs.

use protocol::{Direction, EndpointDescriptor, EndpointHint, ProbeError, Result, TransferKind};
use tracing::debug;

/// Endpoints of the claimed interface, plus endpoint zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    /// Build a registry from enumerated endpoints
    ///
    /// The control endpoint is always present, sized by `max_packet_size0`.
    /// Control entries in `endpoints` are dropped in its favour, and repeated
    /// addresses keep their first descriptor.
    pub fn new(
        max_packet_size0: u16,
        endpoints: impl IntoIterator<Item = EndpointDescriptor>,
    ) -> Self {
        let mut registry = vec![EndpointDescriptor::control(max_packet_size0)];

        for endpoint in endpoints {
            if endpoint.kind == TransferKind::Control {
                continue;
            }
            if registry.iter().any(|e| e.address == endpoint.address) {
                debug!(
                    "Ignoring duplicate descriptor for endpoint {:#04x}",
                    endpoint.address
                );
                continue;
            }
            registry.push(endpoint);
        }

        Self {
            endpoints: registry,
        }
    }

    /// Find the endpoint a probe should use
    ///
    /// Control requests always resolve to endpoint zero (address 0x00 or 0x80
    /// are both accepted as explicit hints). For bulk and interrupt an explicit
    /// address must match both address and kind; `Any(direction)` picks the
    /// first endpoint of that kind and direction in descriptor order.
    pub fn resolve(&self, kind: TransferKind, hint: EndpointHint) -> Result<EndpointDescriptor> {
        let found = match (kind, hint) {
            (TransferKind::Control, EndpointHint::Address(address)) if address & 0x7f != 0 => None,
            (TransferKind::Control, _) => self.endpoints.first(),
            (_, EndpointHint::Address(address)) => self
                .endpoints
                .iter()
                .find(|e| e.address == address && e.kind == kind),
            (_, EndpointHint::Any(direction)) => self
                .endpoints
                .iter()
                .find(|e| e.kind == kind && e.direction() == direction),
        };

        found
            .copied()
            .ok_or(ProbeError::EndpointNotFound { kind, hint })
    }

    /// All endpoints, endpoint zero first
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Endpoints of one kind and direction, in descriptor order
    pub fn filter(
        &self,
        kind: TransferKind,
        direction: Direction,
    ) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints
            .iter()
            .filter(move |e| e.kind == kind && e.direction() == direction)
    }

    /// Number of endpoints including endpoint zero
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Never true: endpoint zero is always registered
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_endpoints;

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new(64, create_mock_endpoints())
    }

    #[test]
    fn test_control_endpoint_always_present() {
        let registry = EndpointRegistry::new(8, Vec::new());
        assert_eq!(registry.len(), 1);
        let ep0 = registry
            .resolve(TransferKind::Control, EndpointHint::Any(Direction::In))
            .unwrap();
        assert_eq!(ep0.address, 0x00);
        assert_eq!(ep0.max_packet_size, 8);
    }

    #[test]
    fn test_resolve_by_address() {
        let ep = registry()
            .resolve(TransferKind::Bulk, EndpointHint::Address(0x82))
            .unwrap();
        assert_eq!(ep.address, 0x82);
        assert_eq!(ep.direction(), Direction::In);
    }

    #[test]
    fn test_resolve_address_with_wrong_kind() {
        let err = registry()
            .resolve(TransferKind::Interrupt, EndpointHint::Address(0x82))
            .unwrap_err();
        assert_eq!(
            err,
            ProbeError::EndpointNotFound {
                kind: TransferKind::Interrupt,
                hint: EndpointHint::Address(0x82)
            }
        );
    }

    #[test]
    fn test_resolve_any_direction() {
        let registry = registry();
        let out = registry
            .resolve(TransferKind::Bulk, EndpointHint::Any(Direction::Out))
            .unwrap();
        assert_eq!(out.address, 0x01);

        let int_in = registry
            .resolve(TransferKind::Interrupt, EndpointHint::Any(Direction::In))
            .unwrap();
        assert_eq!(int_in.address, 0x83);

        assert!(
            registry
                .resolve(TransferKind::Interrupt, EndpointHint::Any(Direction::Out))
                .is_err()
        );
    }

    #[test]
    fn test_control_rejects_non_zero_address() {
        let registry = registry();
        assert!(
            registry
                .resolve(TransferKind::Control, EndpointHint::Address(0x80))
                .is_ok()
        );
        assert!(
            registry
                .resolve(TransferKind::Control, EndpointHint::Address(0x81))
                .is_err()
        );
    }

    #[test]
    fn test_duplicates_and_control_entries_dropped() {
        let mut endpoints = create_mock_endpoints();
        endpoints.push(endpoints[0]);
        endpoints.push(EndpointDescriptor::control(32));
        let registry = EndpointRegistry::new(64, endpoints);

        assert_eq!(registry.len(), 5);
        assert_eq!(registry.endpoints()[0].max_packet_size, 64);
        assert_eq!(registry.filter(TransferKind::Interrupt, Direction::In).count(), 2);
    }
}

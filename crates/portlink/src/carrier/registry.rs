// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Carrier registry.
//!
//! Built once at startup, then shared read-only through `Arc`. Header
//! sniffing walks prototypes in registration order.

use super::{
    split_carrier_name, Carrier, MariahCarrier, NameserCarrier, TcpCarrier, TcpRosCarrier,
    TextCarrier, UdpCarrier, ZlibCarrier, HEADER_LEN,
};

/// Known carrier prototypes.
pub struct CarrierRegistry {
    prototypes: Vec<Box<dyn Carrier>>,
}

impl CarrierRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            prototypes: Vec::new(),
        }
    }

    /// Registry with every built-in carrier. `tcpros` is last since its
    /// sniffing is heuristic.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TcpCarrier::new()));
        registry.register(Box::new(TcpCarrier::fast()));
        registry.register(Box::new(UdpCarrier::new()));
        registry.register(Box::new(TextCarrier::new()));
        registry.register(Box::new(TextCarrier::with_ack()));
        registry.register(Box::new(NameserCarrier::new()));
        registry.register(Box::new(MariahCarrier::new()));
        registry.register(Box::new(ZlibCarrier::new()));
        registry.register(Box::new(TcpRosCarrier::new()));
        registry
    }

    /// Add a prototype. A prototype with the same name is replaced in place.
    pub fn register(&mut self, prototype: Box<dyn Carrier>) {
        let name = prototype.name().to_string();
        if let Some(slot) = self.prototypes.iter_mut().find(|p| p.name() == name) {
            log::debug!("[carrier] replacing prototype {}", name);
            *slot = prototype;
            return;
        }
        log::debug!("[carrier] registered {}", name);
        self.prototypes.push(prototype);
    }

    /// New instance for a carrier name; qualifiers after `+` are ignored.
    pub fn choose_by_name(&self, name: &str) -> Option<Box<dyn Carrier>> {
        let (base, _) = split_carrier_name(name);
        self.prototypes
            .iter()
            .find(|p| p.name() == base)
            .map(|p| p.create())
    }

    /// New instance of the first acceptable carrier whose header matches.
    pub fn choose_by_header(&self, header: &[u8; HEADER_LEN]) -> Option<Box<dyn Carrier>> {
        self.prototypes
            .iter()
            .filter(|p| p.can_accept())
            .find(|p| p.check_header(header))
            .map(|p| {
                let mut carrier = p.create();
                carrier.set_parameters(header);
                carrier
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        let (base, _) = split_carrier_name(name);
        self.prototypes.iter().any(|p| p.name() == base)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.prototypes.iter().map(|p| p.name()).collect()
    }

    /// Prototypes, in registration order.
    pub fn prototypes(&self) -> impl Iterator<Item = &dyn Carrier> {
        self.prototypes.iter().map(|p| p.as_ref())
    }
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CarrierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierRegistry")
            .field("carriers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sniffing_is_unambiguous() {
        let registry = CarrierRegistry::with_defaults();
        let sniffable: Vec<&dyn Carrier> = registry.prototypes().filter(|p| p.can_accept()).collect();
        assert!(sniffable.len() >= 8);

        for v in &sniffable {
            let header = v.header();
            assert!(v.check_header(&header), "{} rejects its own header", v.name());
            for w in &sniffable {
                if w.name() != v.name() {
                    assert!(
                        !w.check_header(&header),
                        "{} accepts the header of {}",
                        w.name(),
                        v.name()
                    );
                }
            }
            let chosen = registry.choose_by_header(&header).unwrap();
            assert_eq!(chosen.name(), v.name());
        }
    }

    #[test]
    fn test_choose_by_name_ignores_qualifiers() {
        let registry = CarrierRegistry::with_defaults();
        assert_eq!(registry.choose_by_name("tcp+recv.zlib").unwrap().name(), "tcp");
        assert_eq!(registry.choose_by_name("text_ack").unwrap().name(), "text_ack");
        assert!(registry.choose_by_name("carrier_pigeon").is_none());
        assert!(registry.contains("mariah"));
    }

    #[test]
    fn test_unknown_header() {
        let registry = CarrierRegistry::with_defaults();
        assert!(registry.choose_by_header(b"GET / HT").is_none());
    }

    #[test]
    fn test_modifiers_are_not_sniffed() {
        let registry = CarrierRegistry::with_defaults();
        let zlib = registry.choose_by_name("zlib").unwrap();
        assert!(registry.choose_by_header(&zlib.header()).is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = CarrierRegistry::new();
        registry.register(Box::new(TcpCarrier::new()));
        registry.register(Box::new(TcpCarrier::new()));
        assert_eq!(registry.names(), vec!["tcp"]);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Contact: a resolved (or resolvable) network endpoint.
//!
//! A contact is valid once it carries a port number. Name resolution never
//! fails loudly; it returns an invalid contact and callers check
//! [`Contact::is_valid`].

use std::fmt;
use std::time::Duration;

/// Network endpoint: name, host, carrier and port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    name: String,
    host: String,
    carrier: String,
    port: Option<u16>,
    timeout: Option<Duration>,
    nested: NestedContact,
}

impl Contact {
    /// The invalid contact.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Contact knowing only a name (not yet resolved).
    pub fn by_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nested: NestedContact::from_string(name),
            ..Default::default()
        }
    }

    /// Contact knowing only a carrier.
    pub fn by_carrier(carrier: &str) -> Self {
        Self {
            carrier: carrier.to_string(),
            ..Default::default()
        }
    }

    /// Contact for a socket endpoint.
    pub fn by_socket(carrier: &str, host: &str, port: u16) -> Self {
        Self {
            carrier: carrier.to_string(),
            host: host.to_string(),
            port: Some(port),
            ..Default::default()
        }
    }

    /// Fully specified contact.
    pub fn new(name: &str, carrier: &str, host: &str, port: u16) -> Self {
        Self::by_socket(carrier, host, port).with_name(name)
    }

    /// Parse `carrier://host:port/name`, `host:port`, or a bare name.
    pub fn from_string(text: &str) -> Self {
        let text = text.trim();
        let (carrier, rest) = match text.find("://") {
            Some(idx) => (&text[..idx], &text[idx + 3..]),
            None => ("", text),
        };

        if carrier.is_empty() && rest.starts_with('/') {
            return Self::by_name(rest);
        }

        let (host_port, name) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let name = if name == "/" { "" } else { name };

        let Some((host, port)) = host_port.rsplit_once(':') else {
            if carrier.is_empty() {
                return Self::by_name(text);
            }
            let mut c = Self::by_carrier(carrier);
            c.host = host_port.to_string();
            return c.with_name(name);
        };

        match port.parse::<u16>() {
            Ok(port) => Self::by_socket(carrier, host, port).with_name(name),
            Err(_) if carrier.is_empty() => Self::by_name(text),
            Err(_) => Self::by_carrier(carrier).with_name(name),
        }
    }

    /// Copy with a different name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.nested = NestedContact::from_string(name);
        self
    }

    /// Copy with a different carrier.
    pub fn with_carrier(mut self, carrier: &str) -> Self {
        self.carrier = carrier.to_string();
        self
    }

    /// Copy with a different host.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Copy with a different socket endpoint.
    pub fn with_socket(mut self, host: &str, port: u16) -> Self {
        self.host = host.to_string();
        self.port = Some(port);
        self
    }

    /// Copy with explicit nested information.
    pub fn with_nested(mut self, nested: NestedContact) -> Self {
        self.nested = nested;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn carrier(&self) -> &str {
        &self.carrier
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn nested(&self) -> &NestedContact {
        &self.nested
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// A contact is usable for connecting once it has a port.
    pub fn is_valid(&self) -> bool {
        self.port.is_some()
    }

    /// `host:port` for socket APIs.
    pub fn socket_address(&self) -> Option<String> {
        self.port.map(|p| format!("{}:{}", self.host, p))
    }

    /// `carrier://host:port/` (carrier omitted when empty or not wanted).
    pub fn to_uri(&self, include_carrier: bool) -> String {
        let mut out = String::new();
        if include_carrier && !self.carrier.is_empty() {
            out.push_str(&self.carrier);
            out.push_str("://");
        }
        out.push_str(&self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }
        out.push('/');
        out
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() && self.host.is_empty() {
            return f.write_str(&self.name);
        }
        if !self.carrier.is_empty() {
            write!(f, "{}://", self.carrier)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if !self.name.is_empty() {
            if !self.name.starts_with('/') {
                f.write_str("/")?;
            }
            f.write_str(&self.name)?;
        }
        Ok(())
    }
}

// ============================================================================
// NestedContact
// ============================================================================

/// Node/topic information packed into a port name.
///
/// `/chatter+@/talker` names topic `/chatter` published (`+`) by node
/// `/talker`. Categories: `+` publisher, `-` subscriber, `+1` service
/// provider, `-1` service client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedContact {
    full_name: String,
    node_name: String,
    nested_name: String,
    category: String,
    type_name: String,
}

impl NestedContact {
    pub fn from_string(name: &str) -> Self {
        let mut nc = Self {
            full_name: name.to_string(),
            ..Default::default()
        };
        let Some((nested, node)) = name.split_once('@') else {
            nc.node_name = name.to_string();
            return nc;
        };
        nc.node_name = node.to_string();
        let (nested, category) = split_category(nested);
        nc.nested_name = nested.to_string();
        nc.category = category.to_string();
        nc
    }

    /// Builder: attach a message type name.
    pub fn with_type_name(mut self, type_name: &str) -> Self {
        self.type_name = type_name.to_string();
        self
    }

    pub fn is_nested(&self) -> bool {
        !self.nested_name.is_empty()
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn nested_name(&self) -> &str {
        &self.nested_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Type name, or `*` when unknown.
    pub fn type_name_star(&self) -> &str {
        if self.type_name.is_empty() {
            "*"
        } else {
            &self.type_name
        }
    }
}

fn split_category(nested: &str) -> (&str, &str) {
    for suffix in ["+1", "-1", "+", "-"] {
        if let Some(stripped) = nested.strip_suffix(suffix) {
            return (stripped, suffix);
        }
    }
    (nested, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_round_trip() {
        let c = Contact::by_socket("tcp", "192.168.1.7", 10002);
        let parsed = Contact::from_string(&c.to_string());
        assert_eq!(parsed.host(), "192.168.1.7");
        assert_eq!(parsed.port(), Some(10002));
        assert_eq!(parsed.carrier(), "tcp");
    }

    #[test]
    fn test_named_round_trip() {
        let c = Contact::new("/foo", "text_ack", "localhost", 9999);
        assert_eq!(c.to_string(), "text_ack://localhost:9999/foo");
        assert_eq!(Contact::from_string(&c.to_string()), c);
    }

    #[test]
    fn test_parse_ros_master_uri() {
        let c = Contact::from_string("http://rosmaster:11311/");
        assert_eq!(c.carrier(), "http");
        assert_eq!(c.host(), "rosmaster");
        assert_eq!(c.port(), Some(11311));
        assert_eq!(c.name(), "");
        assert_eq!(c.to_uri(true), "http://rosmaster:11311/");
    }

    #[test]
    fn test_bare_name_is_invalid() {
        let c = Contact::from_string("/nope");
        assert!(!c.is_valid());
        assert_eq!(c.name(), "/nope");
        assert_eq!(c.to_string(), "/nope");
    }

    #[test]
    fn test_host_port_without_carrier() {
        let c = Contact::from_string("127.0.0.1:10000");
        assert!(c.is_valid());
        assert_eq!(c.carrier(), "");
        assert_eq!(c.socket_address().as_deref(), Some("127.0.0.1:10000"));
    }

    #[test]
    fn test_timeout() {
        let mut c = Contact::by_socket("tcp", "localhost", 1);
        assert_eq!(c.timeout(), None);
        c.set_timeout(Duration::from_millis(250));
        assert_eq!(c.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_nested_contact_categories() {
        let nc = NestedContact::from_string("/chatter+@/talker");
        assert!(nc.is_nested());
        assert_eq!(nc.node_name(), "/talker");
        assert_eq!(nc.nested_name(), "/chatter");
        assert_eq!(nc.category(), "+");
        assert_eq!(nc.type_name_star(), "*");

        let nc = NestedContact::from_string("/add_two-1@/client");
        assert_eq!(nc.nested_name(), "/add_two");
        assert_eq!(nc.category(), "-1");

        let nc = NestedContact::from_string("/plain");
        assert!(!nc.is_nested());
        assert_eq!(nc.node_name(), "/plain");
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name resolution and registration.
//!
//! A [`NameSpace`] maps port and topic names to [`Contact`]s. Two backends
//! implement it:
//!
//! - [`YarpNameSpace`]: a central name server speaking the text / bottle
//!   command protocol (see [`server::NameServer`] for an in-process one)
//! - [`RosNameSpace`]: a ROS master spoken to over XML-RPC
//!
//! Resolution and registration never fail loudly: they return an invalid
//! contact. Connection management returns a [`NameError`].
//!
//! ```text
//!   Network --> NameClientCache --> NameClient --(name_ser / tcp)--> NameServer
//!      |                               |                                |
//!      |                               +--(fake mode)--> NameStore <----+
//!      +--> RosNameSpace --(xmlrpc)--> ROS master
//! ```

pub mod client;
pub mod config;
pub mod detect;
pub mod ros;
pub mod rpc;
pub mod server;
pub mod store;
pub mod xmlrpc;
pub mod yarp;

pub use client::{NameClient, NameClientCache};
pub use config::{DetectConfig, NameConfig, NameMode, NameServerConfig};
pub use ros::RosNameSpace;
pub use server::NameServer;
pub use store::{InMemoryNameStore, NameStore};
pub use yarp::YarpNameSpace;

use std::fmt;
use std::io;
use std::time::Duration;

use crate::bottle::{Bottle, Value};
use crate::contact::Contact;
use crate::error::{ConfigError, ProtocolError};

// ============================================================================
// Errors
// ============================================================================

/// Name-service errors.
#[derive(Debug)]
pub enum NameError {
    /// No name server could be reached.
    Unreachable(String),

    /// The reply could not be understood.
    BadReply(String),

    /// The server answered with a fault.
    Fault { code: i64, message: String },

    /// The backend does not offer this operation.
    Unsupported(String),

    /// Configuration problem (missing or unreadable config file).
    Config(ConfigError),

    /// Connection-level failure.
    Protocol(ProtocolError),

    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(s) => write!(f, "Name server unreachable: {}", s),
            Self::BadReply(s) => write!(f, "Bad name server reply: {}", s),
            Self::Fault { code, message } => write!(f, "Name server fault {}: {}", code, message),
            Self::Unsupported(s) => write!(f, "Unsupported by this name space: {}", s),
            Self::Config(e) => write!(f, "{}", e),
            Self::Protocol(e) => write!(f, "{}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for NameError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<ConfigError> for NameError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ============================================================================
// ContactStyle
// ============================================================================

/// How to talk to a contact for one administrative exchange.
#[derive(Debug, Clone)]
pub struct ContactStyle {
    /// Send as an administrative message.
    pub admin: bool,

    /// Suppress diagnostics on failure.
    pub quiet: bool,

    /// Connection timeout.
    pub timeout: Option<Duration>,

    /// Carrier override; empty means the contact's own carrier.
    pub carrier: String,

    /// Wait for a reply.
    pub expect_reply: bool,
}

impl Default for ContactStyle {
    fn default() -> Self {
        Self {
            admin: false,
            quiet: false,
            timeout: None,
            carrier: String::new(),
            expect_reply: true,
        }
    }
}

impl ContactStyle {
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_carrier(mut self, carrier: &str) -> Self {
        self.carrier = carrier.to_string();
        self
    }

    pub fn without_reply(mut self) -> Self {
        self.expect_reply = false;
        self
    }
}

// ============================================================================
// NameSpace
// ============================================================================

/// Outcome of [`NameSpace::detect_name_server`].
#[derive(Debug, Clone, Default)]
pub struct NameServerDetection {
    /// Name server found, invalid when none.
    pub contact: Contact,

    /// Configured hints failed and the network had to be scanned.
    pub scan_needed: bool,

    /// The found server was saved for future use.
    pub server_used: bool,
}

/// Strategy for mapping names to contacts.
pub trait NameSpace: Send + Sync {
    /// Contact of the name server (or master) itself.
    fn name_server_contact(&self) -> Contact;

    /// Resolve `name`; invalid when unknown or unreachable.
    fn query_name(&self, name: &str) -> Contact;

    /// Register `name`, letting the server pick the rest.
    fn register_name(&self, name: &str) -> Contact;

    /// Register a contact with as much detail as the caller knows.
    fn register_contact(&self, contact: &Contact) -> Contact;

    /// Remove `name`; unknown names are not an error.
    fn unregister_name(&self, name: &str) -> Contact;

    fn unregister_contact(&self, contact: &Contact) -> Contact;

    fn set_property(&self, name: &str, key: &str, value: &Value) -> Result<(), NameError>;

    fn get_property(&self, name: &str, key: &str) -> Option<Value>;

    fn connect_port_to_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError>;

    fn connect_topic_to_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError>;

    fn disconnect_port_from_topic(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError>;

    fn disconnect_topic_from_port(
        &self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
    ) -> Result<(), NameError>;

    /// Connection the name server re-establishes whenever both ends exist.
    fn connect_port_to_port_persistently(
        &self,
        _src: &Contact,
        _dest: &Contact,
        _style: &ContactStyle,
    ) -> Result<(), NameError> {
        Err(NameError::Unsupported("persistent connections".into()))
    }

    fn disconnect_port_from_port_persistently(
        &self,
        _src: &Contact,
        _dest: &Contact,
        _style: &ContactStyle,
    ) -> Result<(), NameError> {
        Err(NameError::Unsupported("persistent connections".into()))
    }

    /// Only usable within this process.
    fn local_only(&self) -> bool;

    fn uses_central_server(&self) -> bool;

    /// The server picks port numbers on registration.
    fn server_allocates_port_numbers(&self) -> bool;

    /// Connections learn the names of both endpoints during the handshake.
    fn connection_has_name_of_endpoints(&self) -> bool;

    /// Locate a name server, scanning the network when configured hints
    /// fail. With `use_detected`, a found server is saved.
    fn detect_name_server(&self, use_detected: bool) -> NameServerDetection;

    /// Forward a raw command to the name server.
    fn write_to_name_server(
        &self,
        cmd: &Bottle,
        style: &ContactStyle,
    ) -> Result<Bottle, NameError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_style_builders() {
        let style = ContactStyle::default()
            .quiet()
            .admin()
            .with_carrier("text_ack")
            .with_timeout(Duration::from_secs(1))
            .without_reply();
        assert!(style.quiet && style.admin);
        assert!(!style.expect_reply);
        assert_eq!(style.carrier, "text_ack");
    }

    #[test]
    fn test_error_display() {
        let e = NameError::Fault {
            code: -1,
            message: "no such topic".into(),
        };
        assert_eq!(e.to_string(), "Name server fault -1: no such topic");
        let e: NameError = ProtocolError::Closed.into();
        assert!(matches!(e, NameError::Protocol(ProtocolError::Closed)));
    }
}

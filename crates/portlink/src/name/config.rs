// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name service configuration.
//!
//! # Environment Variables
//!
//! - `PORTLINK_CONF`: directory holding `<namespace>.conf` files
//! - `PORTLINK_NAMESPACE`: namespace, default `/root`
//! - `ROS_MASTER_URI`: ROS master, used when no saved contact is valid
//!
//! The saved name server is a single line `host port [mode]`.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::contact::Contact;
use crate::error::ConfigError;

/// Default namespace.
pub const DEFAULT_NAMESPACE: &str = "/root";

/// Well-known name server port.
pub const DEFAULT_NAME_SERVER_PORT: u16 = 10000;

/// Default multicast group for name server detection.
pub const DEFAULT_DETECT_GROUP: Ipv4Addr = Ipv4Addr::new(224, 2, 1, 1);

/// Which backend serves the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMode {
    #[default]
    Yarp,
    Ros,
}

impl NameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yarp => "yarp",
            Self::Ros => "ros",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "yarp" | "" => Some(Self::Yarp),
            "ros" => Some(Self::Ros),
            _ => None,
        }
    }
}

// ============================================================================
// NameConfig
// ============================================================================

/// Where to find the name server and how to talk to it.
#[derive(Debug, Clone)]
pub struct NameConfig {
    /// Directory of saved `<namespace>.conf` files.
    pub conf_dir: PathBuf,

    /// Namespace, e.g. `/root`.
    pub namespace: String,

    /// Explicit name server, bypassing the saved file.
    pub server: Option<Contact>,

    /// Backend used when nothing is saved.
    pub mode: NameMode,
}

impl Default for NameConfig {
    fn default() -> Self {
        let conf_dir = std::env::var("PORTLINK_CONF")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_conf_dir());
        let namespace = std::env::var("PORTLINK_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        Self {
            conf_dir,
            namespace,
            server: None,
            mode: NameMode::Yarp,
        }
    }
}

fn default_conf_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => Path::new(&home).join(".config").join("portlink"),
        Err(_) => std::env::temp_dir().join("portlink"),
    }
}

impl NameConfig {
    /// Same as `default()`: reads the environment.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_conf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = dir.into();
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_server(mut self, contact: Contact) -> Self {
        self.server = Some(contact);
        self
    }

    pub fn with_mode(mut self, mode: NameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.namespace.starts_with('/') {
            return Err("namespace must start with '/'");
        }
        if self.namespace.len() < 2 {
            return Err("namespace must not be empty");
        }
        Ok(())
    }

    /// `<conf dir>/<namespace>.conf`, slashes in the namespace flattened.
    pub fn config_file(&self) -> PathBuf {
        let stem = self.namespace.trim_start_matches('/').replace('/', "_");
        self.conf_dir.join(format!("{}.conf", stem))
    }

    /// Saved name server, if any.
    pub fn read_saved(&self) -> Result<Option<(Contact, NameMode)>, ConfigError> {
        let path = self.config_file();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_saved(&text, &self.namespace).map(Some)
    }

    /// Persist the name server contact.
    pub fn write_saved(&self, contact: &Contact, mode: NameMode) -> Result<(), ConfigError> {
        let port = contact
            .port()
            .ok_or(ConfigError::Invalid("cannot save a contact without a port"))?;
        fs::create_dir_all(&self.conf_dir)?;
        let line = format!("{} {} {}\n", contact.host(), port, mode.as_str());
        fs::write(self.config_file(), line)?;
        log::debug!("[name-config] saved {} to {}", contact, self.config_file().display());
        Ok(())
    }

    /// Name server contact: explicit server, then the saved file.
    /// Invalid when neither is usable.
    pub fn address(&self) -> Contact {
        if let Some(server) = &self.server {
            return server.clone();
        }
        match self.read_saved() {
            Ok(Some((contact, _))) => contact,
            Ok(None) => Contact::invalid(),
            Err(e) => {
                log::warn!("[name-config] ignoring {}: {}", self.config_file().display(), e);
                Contact::invalid()
            }
        }
    }

    /// Mode from the saved file, falling back to the configured one.
    pub fn saved_mode(&self) -> NameMode {
        match self.read_saved() {
            Ok(Some((_, mode))) => mode,
            _ => self.mode,
        }
    }
}

fn parse_saved(text: &str, namespace: &str) -> Result<(Contact, NameMode), ConfigError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| ConfigError::Parse("empty name server file".into()))?;
    let mut fields = line.split_whitespace();
    let host = fields
        .next()
        .ok_or_else(|| ConfigError::Parse("missing host".into()))?;
    let port = fields
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| ConfigError::Parse(format!("bad port in {:?}", line)))?;
    let mode = match fields.next() {
        Some(m) => NameMode::parse(m)
            .ok_or_else(|| ConfigError::Parse(format!("unknown mode {:?}", m)))?,
        None => NameMode::Yarp,
    };
    let carrier = match mode {
        NameMode::Yarp => "tcp",
        NameMode::Ros => "xmlrpc",
    };
    Ok((Contact::new(namespace, carrier, host, port), mode))
}

// ============================================================================
// Host names
// ============================================================================

/// Host names that only make sense on this machine.
pub fn is_local_name(host: &str) -> bool {
    matches!(host, "" | "..." | "localhost" | "0.0.0.0")
        || host.starts_with("127.")
        || host == "::1"
}

/// This machine's host name.
pub fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on
    // success when the name fits, and we bound the scan to the buffer anyway.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    "localhost".to_string()
}

/// Address to advertise for this machine: the first LAN address, or
/// loopback when there is none.
pub fn advertised_host() -> String {
    match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            log::debug!("[name-config] no LAN address ({}), using loopback", e);
            "127.0.0.1".to_string()
        }
    }
}

// ============================================================================
// DetectConfig
// ============================================================================

/// Multicast probing for a name server.
#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Wait for a reply per attempt.
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_DETECT_GROUP,
            port: DEFAULT_NAME_SERVER_PORT + 1,
            timeout: Duration::from_millis(500),
            retries: 2,
        }
    }
}

impl DetectConfig {
    pub fn with_group(mut self, group: Ipv4Addr, port: u16) -> Self {
        self.group = group;
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.group.is_multicast() {
            return Err("detect group must be a multicast address");
        }
        if self.port == 0 {
            return Err("detect port must be non-zero");
        }
        if self.timeout.is_zero() {
            return Err("detect timeout must be non-zero");
        }
        Ok(())
    }
}

// ============================================================================
// NameServerConfig
// ============================================================================

/// In-process name server settings.
#[derive(Debug, Clone)]
pub struct NameServerConfig {
    /// Listening address.
    pub bind: SocketAddr,

    /// Namespace served (the server registers itself under this name).
    pub namespace: String,

    /// First port handed out by automatic allocation.
    pub base_port: u16,

    /// Number of ports available for automatic allocation.
    pub port_range: u16,

    /// Host advertised for the server itself; detected when `None`.
    pub host: Option<String>,

    /// Answer multicast detection probes.
    pub answer_probes: bool,

    pub detect: DetectConfig,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_NAME_SERVER_PORT)),
            namespace: DEFAULT_NAMESPACE.to_string(),
            base_port: DEFAULT_NAME_SERVER_PORT + 2,
            port_range: 1000,
            host: None,
            answer_probes: false,
            detect: DetectConfig::default(),
        }
    }
}

impl NameServerConfig {
    /// Loopback server on an ephemeral port, for tests and local use.
    pub fn local() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        }
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_ports(mut self, base_port: u16, port_range: u16) -> Self {
        self.base_port = base_port;
        self.port_range = port_range;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn with_probes(mut self, detect: DetectConfig) -> Self {
        self.answer_probes = true;
        self.detect = detect;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.namespace.starts_with('/') {
            return Err("namespace must start with '/'");
        }
        if self.port_range == 0 {
            return Err("port_range must be non-zero");
        }
        if u32::from(self.base_port) + u32::from(self.port_range) > u32::from(u16::MAX) + 1 {
            return Err("base_port + port_range exceeds the port space");
        }
        if self.answer_probes {
            self.detect.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_contact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NameConfig::default()
            .with_conf_dir(dir.path())
            .with_namespace("/lab");
        assert!(cfg.read_saved().unwrap().is_none());
        assert!(!cfg.address().is_valid());

        let contact = Contact::by_socket("tcp", "10.0.0.5", 10000);
        cfg.write_saved(&contact, NameMode::Ros).unwrap();
        assert!(cfg.config_file().ends_with("lab.conf"));

        let (read, mode) = cfg.read_saved().unwrap().unwrap();
        assert_eq!(read.host(), "10.0.0.5");
        assert_eq!(read.port(), Some(10000));
        assert_eq!(read.name(), "/lab");
        assert_eq!(mode, NameMode::Ros);
        assert_eq!(cfg.saved_mode(), NameMode::Ros);
    }

    #[test]
    fn test_parse_saved_defaults_to_yarp() {
        let (c, mode) = parse_saved("# comment\n127.0.0.1 10000\n", "/root").unwrap();
        assert_eq!(mode, NameMode::Yarp);
        assert_eq!(c.carrier(), "tcp");
        assert!(parse_saved("127.0.0.1 notaport", "/root").is_err());
        assert!(parse_saved("127.0.0.1 10000 zeroconf", "/root").is_err());
    }

    #[test]
    fn test_explicit_server_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NameConfig::default()
            .with_conf_dir(dir.path())
            .with_server(Contact::by_socket("tcp", "127.0.0.1", 12345));
        assert_eq!(cfg.address().port(), Some(12345));
    }

    #[test]
    fn test_validate() {
        assert!(NameConfig::default().with_namespace("root").validate().is_err());
        assert!(NameConfig::default().with_namespace("/").validate().is_err());
        assert!(NameServerConfig::default().validate().is_ok());
        assert!(NameServerConfig::default()
            .with_ports(65000, 1000)
            .validate()
            .is_err());
        assert!(DetectConfig::default()
            .with_group(Ipv4Addr::new(10, 0, 0, 1), 10001)
            .validate()
            .is_err());
    }

    #[test]
    fn test_local_names() {
        assert!(is_local_name("localhost"));
        assert!(is_local_name("127.0.1.1"));
        assert!(!is_local_name("192.168.1.4"));
        assert!(!host_name().is_empty());
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast discovery of a name server.
//!
//! A client sends `NAME_SERVER query <namespace>` as one datagram to the
//! detect group; a server answering probes replies to the sender with its
//! own `registration ...` line.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::config::DetectConfig;
use super::store::{parse_registration, NameStore};
use crate::contact::Contact;

const PROBE_PREFIX: &str = "NAME_SERVER ";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_PROBE_LEN: usize = 2048;

/// Probe the configured multicast group for the server of `namespace`.
pub fn scan(config: &DetectConfig, namespace: &str) -> io::Result<Option<Contact>> {
    let target = SocketAddr::V4(SocketAddrV4::new(config.group, config.port));
    probe(target, namespace, config.timeout, config.retries)
}

/// Send probes to `target` until a registration comes back or the
/// attempts run out.
pub fn probe(
    target: SocketAddr,
    namespace: &str,
    timeout: Duration,
    retries: u32,
) -> io::Result<Option<Contact>> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    if target.ip().is_multicast() {
        socket.set_multicast_loop_v4(true)?;
        let _ = socket.set_multicast_ttl_v4(1);
    }
    socket.set_read_timeout(Some(timeout))?;
    let message = format!("{}query {}\n", PROBE_PREFIX, namespace);

    let mut buf = vec![0u8; MAX_PROBE_LEN];
    for attempt in 0..=retries {
        log::debug!("[detect] probe {} for {} (attempt {})", target, namespace, attempt + 1);
        socket.send_to(message.as_bytes(), target)?;
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let reply = String::from_utf8_lossy(&buf[..n]);
                let contact = parse_registration(&reply);
                if contact.is_valid() {
                    log::info!("[detect] name server {} answered from {}", contact, from);
                    return Ok(Some(contact));
                }
                log::debug!("[detect] ignoring reply from {}: {:?}", from, reply.trim());
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

// ============================================================================
// Responder
// ============================================================================

/// Thread answering detection probes from a [`NameStore`].
pub struct ProbeResponder {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ProbeResponder {
    /// Listen on the detect group of `config`.
    pub fn start(config: &DetectConfig, store: Arc<dyn NameStore>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)).into())?;
        let socket: UdpSocket = socket.into();
        if let Err(e) = socket.join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED) {
            log::warn!("[detect] join_multicast_v4({}) failed: {}", config.group, e);
        }
        Self::spawn(socket, store)
    }

    /// Answer probes arriving on an already bound socket.
    pub fn spawn(socket: UdpSocket, store: Arc<dyn NameStore>) -> io::Result<Self> {
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("portlink-detect".to_string())
            .spawn(move || respond_loop(socket, store, flag))?;
        log::debug!("[detect] answering probes on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            thread_handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[detect] responder thread panicked");
            }
        }
    }
}

impl Drop for ProbeResponder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn respond_loop(socket: UdpSocket, store: Arc<dyn NameStore>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_PROBE_LEN];
    while running.load(Ordering::Relaxed) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => {
                log::error!("[detect] receive failed: {}", e);
                break;
            }
        };
        let text = String::from_utf8_lossy(&buf[..n]);
        let Some(command) = text.trim().strip_prefix(PROBE_PREFIX) else {
            log::debug!("[detect] ignoring {:?} from {}", text.trim(), from);
            continue;
        };
        let reply = store.apply(command, &from.ip().to_string());
        if let Err(e) = socket.send_to(reply.as_bytes(), from) {
            log::debug!("[detect] reply to {} failed: {}", from, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::store::InMemoryNameStore;

    #[test]
    fn test_probe_finds_server() {
        let store: Arc<dyn NameStore> = Arc::new(InMemoryNameStore::default());
        store.register("/root", &Contact::by_socket("tcp", "10.2.3.4", 10000), "10.2.3.4");

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut responder = ProbeResponder::spawn(socket, store).unwrap();

        let found = probe(responder.local_addr(), "/root", Duration::from_millis(500), 3)
            .unwrap()
            .unwrap();
        assert_eq!(found, Contact::new("/root", "tcp", "10.2.3.4", 10000));
        responder.shutdown();
    }

    #[test]
    fn test_probe_without_answer() {
        // Bound but never answering.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let found = probe(
            silent.local_addr().unwrap(),
            "/root",
            Duration::from_millis(50),
            1,
        )
        .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_unknown_namespace_is_not_an_answer() {
        let store: Arc<dyn NameStore> = Arc::new(InMemoryNameStore::default());
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let responder = ProbeResponder::spawn(socket, store).unwrap();
        let found = probe(responder.local_addr(), "/other", Duration::from_millis(100), 0).unwrap();
        assert!(found.is_none());
    }
}

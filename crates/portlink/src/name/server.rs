// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process name server.
//!
//! Accepts connections on any registered carrier (`name_ser` for text
//! clients, `tcp` for bottle commands, `CONNECT` text sessions) and
//! answers each message from a [`NameStore`]. Every connection gets its
//! own thread; the accept loop polls a shutdown flag.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::config::{advertised_host, NameServerConfig};
use super::detect::ProbeResponder;
use super::store::NameStore;
use super::NameError;
use crate::carrier::{CarrierRegistry, END_OF_MESSAGE};
use crate::contact::Contact;
use crate::error::ConfigError;
use crate::protocol::{Protocol, SizedWriter};
use crate::stream::{bind_listener, SocketStream};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Running name server.
pub struct NameServer {
    contact: Contact,
    store: Arc<dyn NameStore>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    responder: Option<ProbeResponder>,
}

impl NameServer {
    /// Bind, register the server under its namespace and start accepting.
    pub fn start(
        config: NameServerConfig,
        registry: Arc<CarrierRegistry>,
        store: Arc<dyn NameStore>,
    ) -> Result<Self, NameError> {
        config
            .validate()
            .map_err(|e| NameError::Config(ConfigError::Invalid(e)))?;

        let listener = bind_listener(config.bind)?;
        let local = listener.local_addr()?;
        let host = config.host.clone().unwrap_or_else(advertised_host);
        let contact = store.register(
            &config.namespace,
            &Contact::by_socket("tcp", &host, local.port()),
            &host,
        );
        log::info!("[name-server] {} listening on {}", contact, local);

        let responder = if config.answer_probes {
            match ProbeResponder::start(&config.detect, Arc::clone(&store)) {
                Ok(r) => Some(r),
                Err(e) => {
                    log::warn!("[name-server] not answering detection probes: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let running = Arc::new(AtomicBool::new(true));
        let ctx = ServeContext {
            namespace: config.namespace.clone(),
            registry,
            store: Arc::clone(&store),
        };
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("portlink-nameserver".to_string())
            .spawn(move || accept_loop(listener, ctx, flag))?;

        Ok(Self {
            contact,
            store,
            running,
            thread_handle: Some(handle),
            responder,
        })
    }

    /// Address clients should use.
    pub fn contact(&self) -> Contact {
        self.contact.clone()
    }

    pub fn store(&self) -> &Arc<dyn NameStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop accepting. Connections already open finish on their own.
    pub fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::Relaxed) && self.thread_handle.is_none() {
            return;
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[name-server] accept thread panicked");
            }
        }
        if let Some(mut responder) = self.responder.take() {
            responder.shutdown();
        }
        log::info!("[name-server] {} stopped", self.contact);
    }
}

impl Drop for NameServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameServer")
            .field("contact", &self.contact)
            .field("running", &self.is_running())
            .finish()
    }
}

#[derive(Clone)]
struct ServeContext {
    namespace: String,
    registry: Arc<CarrierRegistry>,
    store: Arc<dyn NameStore>,
}

fn accept_loop(listener: TcpListener, ctx: ServeContext, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                let spawned = thread::Builder::new()
                    .name("portlink-nameserver-conn".to_string())
                    .spawn(move || {
                        if let Err(e) = serve_connection(stream, peer, &ctx) {
                            log::debug!("[name-server] connection from {} ended: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    log::error!("[name-server] cannot serve {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::error!("[name-server] accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::trace!("[name-server] accept loop exiting");
}

/// Reply for a command nothing understood.
fn unknown_command(msg: &str) -> String {
    format!("unknown command NAME_SERVER {}\n{}", msg, END_OF_MESSAGE)
}

fn serve_connection(stream: TcpStream, peer: SocketAddr, ctx: &ServeContext) -> Result<(), NameError> {
    stream.set_nonblocking(false)?;
    let _ = stream.set_nodelay(true);
    let mut proto = Protocol::new(Box::new(SocketStream::new(stream)), Arc::clone(&ctx.registry));
    proto.open_name(&ctx.namespace)?;
    let remote_host = peer.ip().to_string();

    loop {
        let mut reader = match proto.begin_read() {
            Ok(reader) => reader,
            // Peer closed or broke the connection.
            Err(_) => break,
        };
        let msg = if reader.is_text_mode() {
            reader.expect_text()
        } else {
            match reader.to_bottle() {
                Ok(bottle) => bottle.to_text(),
                Err(_) => String::from_utf8_lossy(reader.payload()).into_owned(),
            }
        };
        let msg = msg.trim();
        let msg = msg.strip_prefix("NAME_SERVER ").unwrap_or(msg);
        log::trace!("[name-server] {} <- {:?}", remote_host, msg);

        let mut reply = ctx.store.apply(msg, &remote_host);
        if reply.is_empty() {
            reply = unknown_command(msg);
        }
        if proto.will_reply() {
            proto.reply(&SizedWriter::from_text(&reply))?;
        }
        proto.end_read()?;
    }
    proto.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::store::InMemoryNameStore;

    #[test]
    fn test_start_registers_itself() {
        let store: Arc<dyn NameStore> = Arc::new(InMemoryNameStore::default());
        let mut server = NameServer::start(
            NameServerConfig::local(),
            Arc::new(CarrierRegistry::with_defaults()),
            Arc::clone(&store),
        )
        .unwrap();
        let contact = server.contact();
        assert_eq!(contact.name(), "/root");
        assert_eq!(contact.host(), "127.0.0.1");
        assert_eq!(store.query("/root"), contact);
        server.shutdown();
        assert!(!server.is_running());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = NameServer::start(
            NameServerConfig::local().with_namespace("root"),
            Arc::new(CarrierRegistry::with_defaults()),
            Arc::new(InMemoryNameStore::default()),
        );
        assert!(matches!(result, Err(NameError::Config(_))));
    }

    #[test]
    fn test_unknown_command_reply() {
        assert_eq!(
            unknown_command("frobnicate"),
            "unknown command NAME_SERVER frobnicate\n*** end of message"
        );
    }
}

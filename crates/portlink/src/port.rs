// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal port: a named endpoint owning its connections.
//!
//! - inbound: one listener thread, then one reader thread per connection
//!   pushing messages into the port's inbox
//! - outbound: one writer thread per connection, fed with [`PacketRef`]s
//!   so a single write is shared by every output without copying
//!
//! [`Port::close`] interrupts every connection from the calling thread and
//! unregisters the name; a blocked [`Port::read`] then returns `None`.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::bottle::{Bottle, BottleParseError};
use crate::contact::Contact;
use crate::error::ProtocolError;
use crate::name::NameError;
use crate::network::Network;
use crate::packet::{PacketRef, SharedPackets};
use crate::protocol::{Protocol, SizedWriter};
use crate::route::Route;
use crate::stream::{bind_listener, SocketStream, StreamInterrupter};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Bound on an inbound handshake, which runs on the listener thread.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// One message received by a port.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Vec<u8>,
    route: Route,
    text_mode: bool,
}

impl Message {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Sender name, as announced in the handshake.
    pub fn from(&self) -> &str {
        self.route.from_name()
    }

    pub fn carrier(&self) -> &str {
        self.route.carrier_name()
    }

    pub fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    pub fn to_bottle(&self) -> Result<Bottle, BottleParseError> {
        Bottle::from_bytes(&self.payload)
    }
}

struct Output {
    dest: String,
    tx: Sender<PacketRef>,
    handle: JoinHandle<()>,
}

struct Input {
    interrupter: StreamInterrupter,
    handle: JoinHandle<()>,
}

/// Registry of the port's inbound connections, shared with the listener.
#[derive(Default)]
struct Inputs {
    open: Vec<Input>,
}

impl Inputs {
    /// Drop entries whose reader thread has finished.
    fn reap(&mut self, port: &str) {
        let (done, open): (Vec<_>, Vec<_>) =
            self.open.drain(..).partition(|i| i.handle.is_finished());
        self.open = open;
        for input in done {
            if input.handle.join().is_err() {
                log::error!("[port] {} reader panicked", port);
            }
        }
    }
}

/// A named endpoint.
pub struct Port {
    name: String,
    contact: Contact,
    network: Network,
    packets: SharedPackets,
    running: Arc<AtomicBool>,
    inbox: Receiver<Message>,
    inbox_tx: Mutex<Option<Sender<Message>>>,
    inputs: Arc<Mutex<Inputs>>,
    outputs: Mutex<Vec<Output>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Port {
    /// Listen on an ephemeral port, register `name` and start accepting.
    pub fn open(network: &Network, name: &str) -> Result<Self, NameError> {
        let listener = bind_listener(SocketAddr::from(([0, 0, 0, 0], 0)))?;
        let local = listener.local_addr()?;
        let host = network.host();

        let wanted = Contact::by_socket("tcp", &host, local.port()).with_name(name);
        let contact = network.register_contact(&wanted);
        if !contact.is_valid() {
            return Err(NameError::Unreachable(format!("could not register {}", name)));
        }
        let name = contact.name().to_string();

        let (inbox_tx, inbox) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let inputs = Arc::new(Mutex::new(Inputs::default()));

        let ctx = AcceptContext {
            name: name.clone(),
            network: network.clone(),
            inbox: inbox_tx.clone(),
            inputs: Arc::clone(&inputs),
            running: Arc::clone(&running),
        };
        let handle = thread::Builder::new()
            .name(format!("portlink-accept{}", name))
            .spawn(move || accept_loop(listener, ctx))?;

        log::info!("[port] {} open at {}", name, contact);
        Ok(Self {
            name,
            contact,
            network: network.clone(),
            packets: SharedPackets::new(),
            running,
            inbox,
            inbox_tx: Mutex::new(Some(inbox_tx)),
            inputs,
            outputs: Mutex::new(Vec::new()),
            listener: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered contact.
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Connect to `dest` with `carrier` (`tcp` when empty). Writes made
    /// after this returns are delivered on the new connection.
    pub fn add_output(&self, dest: &str, carrier: &str) -> Result<(), NameError> {
        if !self.is_open() {
            return Err(ProtocolError::Closed.into());
        }
        let target = self.network.query_name(dest);
        let addr = target
            .socket_address()
            .ok_or_else(|| NameError::Unreachable(format!("cannot find {}", dest)))?;
        let timeout = self.network.protocol_config().timeout;
        let stream = SocketStream::connect(&addr, timeout)
            .map_err(|e| NameError::Unreachable(format!("{} ({}): {}", dest, addr, e)))?;
        let mut proto = Protocol::with_config(
            Box::new(stream),
            Arc::clone(self.network.registry()),
            self.network.protocol_config().clone(),
        );
        let to_name = if target.name().is_empty() { dest } else { target.name() };
        proto.open_route(Route::new(&self.name, to_name, carrier).with_to_contact(target.clone()))?;

        let (tx, rx) = channel::unbounded::<PacketRef>();
        let label = format!("{} -> {}", self.name, to_name);
        let handle = thread::Builder::new()
            .name(format!("portlink-out{}", self.name))
            .spawn(move || write_loop(proto, rx, label))?;

        log::debug!("[port] {} added output {} via {}", self.name, to_name, carrier);
        self.outputs.lock().push(Output {
            dest: to_name.to_string(),
            tx,
            handle,
        });
        Ok(())
    }

    /// Close the connection to `dest`. Unknown destinations are ignored.
    pub fn remove_output(&self, dest: &str) {
        let removed: Vec<Output> = {
            let mut outputs = self.outputs.lock();
            let (gone, kept): (Vec<Output>, Vec<Output>) =
                outputs.drain(..).partition(|o| o.dest == dest);
            *outputs = kept;
            gone
        };
        for output in removed {
            stop_output(output);
        }
    }

    /// Names of the current outputs.
    pub fn outputs(&self) -> Vec<String> {
        self.outputs.lock().iter().map(|o| o.dest.clone()).collect()
    }

    /// Number of live inbound connections.
    pub fn input_count(&self) -> usize {
        let mut inputs = self.inputs.lock();
        inputs.reap(&self.name);
        inputs.open.len()
    }

    /// Send `writer` on every output.
    pub fn write(&self, writer: SizedWriter) -> Result<(), ProtocolError> {
        self.send(writer, None)
    }

    /// Like [`Port::write`]; `done` runs once every output is finished with
    /// the message (immediately when there are no outputs).
    pub fn write_with_callback(
        &self,
        writer: SizedWriter,
        done: impl FnOnce(&SizedWriter) + Send + 'static,
    ) -> Result<(), ProtocolError> {
        self.send(writer, Some(Box::new(done)))
    }

    fn send(
        &self,
        writer: SizedWriter,
        done: Option<crate::packet::CompletionCallback>,
    ) -> Result<(), ProtocolError> {
        if !self.is_open() {
            return Err(ProtocolError::Closed);
        }
        let packet = self.packets.acquire(writer, done);
        let mut outputs = self.outputs.lock();
        outputs.retain(|o| {
            let alive = o.tx.send(packet.clone()).is_ok();
            if !alive {
                log::debug!("[port] {} dropping dead output {}", self.name, o.dest);
            }
            alive
        });
        Ok(())
    }

    /// Packets still held by an output.
    pub fn pending_writes(&self) -> usize {
        self.packets.active_count()
    }

    /// Block until a message arrives; `None` once the port is closed.
    pub fn read(&self) -> Option<Message> {
        self.inbox.recv().ok()
    }

    /// Like [`Port::read`], giving up after `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> Option<Message> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop all connections and unregister. Idempotent.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        log::debug!("[port] closing {}", self.name);

        if let Some(handle) = self.listener.lock().take() {
            if handle.join().is_err() {
                log::error!("[port] {} listener panicked", self.name);
            }
        }
        let inputs: Vec<Input> = self.inputs.lock().open.drain(..).collect();
        for input in &inputs {
            input.interrupter.interrupt();
        }
        for input in inputs {
            if input.handle.join().is_err() {
                log::error!("[port] {} reader panicked", self.name);
            }
        }

        let outputs: Vec<Output> = self.outputs.lock().drain(..).collect();
        for output in outputs {
            stop_output(output);
        }
        // Last sender gone: blocked readers see the disconnect.
        self.inbox_tx.lock().take();

        self.network.unregister_name(&self.name);
        log::info!("[port] {} closed", self.name);
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("contact", &self.contact)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Queued packets are still sent before the writer sees the disconnect.
fn stop_output(output: Output) {
    let Output { dest, tx, handle } = output;
    drop(tx);
    if handle.join().is_err() {
        log::error!("[port] writer to {} panicked", dest);
    }
}

fn write_loop(mut proto: Protocol, rx: Receiver<PacketRef>, label: String) {
    while let Ok(packet) = rx.recv() {
        if let Err(e) = proto.write(packet.writer()) {
            log::debug!("[port] write {} failed: {}", label, e);
            break;
        }
    }
    proto.close();
    log::trace!("[port] writer {} exiting", label);
}

// ============================================================================
// Inbound side
// ============================================================================

struct AcceptContext {
    name: String,
    network: Network,
    inbox: Sender<Message>,
    inputs: Arc<Mutex<Inputs>>,
    running: Arc<AtomicBool>,
}

fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    while ctx.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = start_reader(stream, &ctx) {
                    log::debug!("[port] {} rejected connection from {}: {}", ctx.name, peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::error!("[port] {} accept failed: {}", ctx.name, e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::trace!("[port] {} listener exiting", ctx.name);
}

/// Handshake on the listener thread, then hand the connection to its own
/// reader thread.
fn start_reader(stream: TcpStream, ctx: &AcceptContext) -> Result<(), ProtocolError> {
    stream.set_nonblocking(false)?;
    let mut proto = Protocol::with_config(
        Box::new(SocketStream::new(stream)),
        Arc::clone(ctx.network.registry()),
        ctx.network.protocol_config().clone(),
    );
    proto.set_timeout(Some(HANDSHAKE_TIMEOUT))?;
    proto.open_name(&ctx.name)?;
    proto.set_timeout(ctx.network.protocol_config().timeout)?;
    let interrupter = proto.interrupter()?;

    let inbox = ctx.inbox.clone();
    let handle = thread::Builder::new()
        .name(format!("portlink-in{}", ctx.name))
        .spawn(move || read_loop(proto, inbox))?;

    let mut inputs = ctx.inputs.lock();
    inputs.reap(&ctx.name);
    inputs.open.push(Input {
        interrupter,
        handle,
    });
    if !ctx.running.load(Ordering::Relaxed) {
        // Closed while this connection was being set up.
        for input in &inputs.open {
            input.interrupter.interrupt();
        }
    }
    Ok(())
}

fn read_loop(mut proto: Protocol, inbox: Sender<Message>) {
    let label = proto.route().to_string();
    loop {
        let reader = match proto.begin_read() {
            Ok(reader) => reader,
            Err(e) => {
                log::debug!("[port] {} read ended: {}", label, e);
                break;
            }
        };
        if reader.is_admin() {
            // Not user data: acknowledge and keep it out of the inbox.
            log::debug!(
                "[port] {} admin message: {}",
                label,
                String::from_utf8_lossy(reader.payload())
            );
            if let Err(e) = proto.end_read() {
                log::debug!("[port] {} end of message failed: {}", label, e);
                break;
            }
            continue;
        }
        let msg = Message {
            text_mode: reader.is_text_mode(),
            route: reader.route().clone(),
            payload: reader.into_payload(),
        };
        if let Err(e) = proto.end_read() {
            log::debug!("[port] {} end of message failed: {}", label, e);
            break;
        }
        if inbox.send(msg).is_err() {
            break;
        }
    }
    proto.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;
    use std::sync::atomic::AtomicUsize;

    fn network() -> Network {
        Network::init(NetworkConfig::local()).unwrap()
    }

    #[test]
    fn test_open_registers_and_close_unregisters() {
        let network = network();
        let port = Port::open(&network, "/unit/p").unwrap();
        let found = network.query_name("/unit/p");
        assert_eq!(found.port(), port.contact().port());
        assert_eq!(found.host(), "127.0.0.1");
        port.close();
        assert!(!port.is_open());
        assert!(!network.query_name("/unit/p").is_valid());
        assert!(port.read().is_none());
    }

    #[test]
    fn test_write_without_outputs_completes_at_once() {
        let network = network();
        let port = Port::open(&network, "/unit/lonely").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&fired);
        port.write_with_callback(SizedWriter::from_text("x"), move |_| {
            hook.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(port.pending_writes(), 0);
    }

    #[test]
    fn test_output_to_unknown_name_fails() {
        let network = network();
        let port = Port::open(&network, "/unit/out").unwrap();
        let err = port.add_output("/unit/missing", "tcp").unwrap_err();
        assert!(matches!(err, NameError::Unreachable(_)));
    }

    #[test]
    fn test_reap_survives_panicked_reader() {
        let mut inputs = Inputs::default();
        inputs.open.push(Input {
            interrupter: StreamInterrupter::noop(),
            handle: thread::spawn(|| panic!("reader failed")),
        });
        inputs.open.push(Input {
            interrupter: StreamInterrupter::noop(),
            handle: thread::spawn(|| thread::sleep(Duration::from_secs(5))),
        });
        while !inputs.open[0].handle.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }

        inputs.reap("/unit/reap");
        assert_eq!(inputs.open.len(), 1);
    }

    #[test]
    fn test_write_after_close_is_rejected() {
        let network = network();
        let port = Port::open(&network, "/unit/closed").unwrap();
        port.close();
        assert!(matches!(
            port.write(SizedWriter::from_text("late")),
            Err(ProtocolError::Closed)
        ));
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol: drives one connection through handshake, messages and close.
//!
//! A `Protocol` is owned by the thread serving the connection. The only
//! cross-thread operation is cancellation, through a
//! [`StreamInterrupter`] obtained with [`Protocol::interrupter`].
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(CarrierRegistry::with_defaults());
//! let stream = SocketStream::connect("127.0.0.1:10002", None)?;
//! let mut proto = Protocol::new(Box::new(stream), registry);
//! proto.open_route(Route::new("/writer", "/reader", "tcp"))?;
//! proto.write(&SizedWriter::from_text("hello"))?;
//! proto.close();
//! ```

mod message;
mod phase;
mod state;

pub use message::{ConnectionReader, SizedWriter};
pub use phase::ProtocolPhase;
pub use state::ConnectionState;

use std::sync::Arc;
use std::time::Duration;

use crate::carrier::{carrier_qualifier, pair_modifiers, Carrier, CarrierRegistry, HEADER_LEN};
use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::route::Route;
use crate::stream::{BoxedStream, StreamInterrupter};

/// Carrier used when a route names none.
pub const DEFAULT_CARRIER: &str = "tcp";

/// Sent back when an inbound header matches no carrier.
const PROTOCOL_NOT_FOUND: &str = "* Error. Protocol not found.\r\n\
* Hello. You appear to be trying to communicate with a port.\r\n\
* The first 8 bytes sent to a port are used to identify the carrier.\r\n\
* Try \"CONNECT /your_name\" followed by a line of text.\r\n";

/// Lazily resolved modifier carrier for one direction.
enum DelegateSlot {
    Unresolved,
    Absent,
    Ready(Box<dyn Carrier>),
    Failed(String),
}

impl DelegateSlot {
    fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Which direction a modifier applies to.
#[derive(Clone, Copy)]
enum Direction {
    Recv,
    Send,
}

impl Direction {
    fn key(self) -> &'static str {
        match self {
            Self::Recv => "recv",
            Self::Send => "send",
        }
    }
}

/// One connection's choreographer.
pub struct Protocol {
    state: ConnectionState,
    registry: Arc<CarrierRegistry>,
    delegate: Option<Box<dyn Carrier>>,
    recv_delegate: DelegateSlot,
    send_delegate: DelegateSlot,
    phase: ProtocolPhase,
    pending_ack: bool,
    pending_reply: bool,
    broken: bool,
}

impl Protocol {
    pub fn new(stream: BoxedStream, registry: Arc<CarrierRegistry>) -> Self {
        Self::with_config(stream, registry, ProtocolConfig::default())
    }

    pub fn with_config(
        stream: BoxedStream,
        registry: Arc<CarrierRegistry>,
        config: ProtocolConfig,
    ) -> Self {
        let timeout = config.timeout;
        let mut proto = Self {
            state: ConnectionState::new(stream, config),
            registry,
            delegate: None,
            recv_delegate: DelegateSlot::Unresolved,
            send_delegate: DelegateSlot::Unresolved,
            phase: ProtocolPhase::Idle,
            pending_ack: false,
            pending_reply: false,
            broken: false,
        };
        if timeout.is_some() {
            if let Err(e) = proto.set_timeout(timeout) {
                log::debug!("[protocol] could not apply timeout: {}", e);
            }
        }
        proto
    }

    // ========================================================================
    // Phase bookkeeping
    // ========================================================================

    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    fn advance(&mut self, to: ProtocolPhase) -> Result<(), ProtocolError> {
        if !self.phase.can_transition(to) {
            return Err(ProtocolError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        log::trace!("[protocol] {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn require(&self, phase: ProtocolPhase, next: ProtocolPhase) -> Result<(), ProtocolError> {
        if self.phase != phase {
            return Err(ProtocolError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        Ok(())
    }

    /// Close after a handshake failure and hand the error back.
    fn abort(&mut self, err: ProtocolError) -> ProtocolError {
        log::debug!("[protocol] handshake aborted on {}: {}", self.state.route(), err);
        self.close();
        err
    }

    // ========================================================================
    // Opening
    // ========================================================================

    /// Outbound: choose the route's carrier and drive the writer side of
    /// the handshake. On failure the stream is closed.
    pub fn open_route(&mut self, route: Route) -> Result<(), ProtocolError> {
        self.require(ProtocolPhase::Idle, ProtocolPhase::Prepared)?;
        let mut route = route;
        if route.carrier_name().is_empty() {
            route.set_carrier_name(DEFAULT_CARRIER);
        }
        match pair_modifiers(route.carrier_name()) {
            Ok(carrier) => route.set_carrier_name(&carrier),
            Err(e) => {
                log::error!("[protocol] cannot open {}: {}", route, e);
                return Err(self.abort(e));
            }
        }
        self.state.set_route(route);
        match self.open_route_inner() {
            Ok(()) => {
                log::debug!("[protocol] connected {}", self.state.route());
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn open_route_inner(&mut self) -> Result<(), ProtocolError> {
        let carrier_name = self.state.route().carrier_name().to_string();
        let mut carrier = self
            .registry
            .choose_by_name(&carrier_name)
            .ok_or_else(|| ProtocolError::UnknownCarrier(carrier_name.clone()))?;
        if carrier.modifies_incoming_data() || !carrier.can_offer() {
            return Err(ProtocolError::Unsupported(format!(
                "{} cannot initiate a connection",
                carrier.name()
            )));
        }

        carrier.prepare_send(&mut self.state)?;
        self.delegate = Some(carrier);
        self.advance(ProtocolPhase::Prepared)?;

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.send_header(state)?;
        state.flush()?;
        self.advance(ProtocolPhase::HeaderSent)?;

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.expect_reply_to_header(state)?;
        self.advance(ProtocolPhase::Established)
    }

    /// Inbound: sniff the carrier from the first 8 bytes and drive the
    /// reader side of the handshake for a receiver called `name`.
    pub fn open_name(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.require(ProtocolPhase::Idle, ProtocolPhase::HeaderExpected)?;
        self.state.set_to_name(name);
        match self.open_name_inner() {
            Ok(()) => {
                log::debug!("[protocol] accepted {}", self.state.route());
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn open_name_inner(&mut self) -> Result<(), ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        self.state.read_exact(&mut header)?;

        let Some(carrier) = self.registry.choose_by_header(&header) else {
            if let Err(e) = self
                .state
                .write_all(PROTOCOL_NOT_FOUND.as_bytes())
                .and_then(|()| self.state.flush())
            {
                log::debug!("[protocol] could not report unknown header: {}", e);
            }
            return Err(ProtocolError::HeaderNotRecognized(header));
        };
        self.state.set_carrier_name(carrier.name());
        self.delegate = Some(carrier);
        self.advance(ProtocolPhase::HeaderExpected)?;

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.expect_sender_specifier(state)?;
        self.advance(ProtocolPhase::SenderKnown)?;

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.expect_extra_header(state)?;
        carrier.respond_to_header(state)?;
        state.flush()?;
        self.advance(ProtocolPhase::Established)
    }

    // ========================================================================
    // Delegates
    // ========================================================================

    fn slot(&mut self, dir: Direction) -> &mut DelegateSlot {
        match dir {
            Direction::Recv => &mut self.recv_delegate,
            Direction::Send => &mut self.send_delegate,
        }
    }

    fn resolve_delegate(&mut self, dir: Direction) -> Result<bool, ProtocolError> {
        match self.slot(dir) {
            DelegateSlot::Ready(_) => return Ok(true),
            DelegateSlot::Absent => return Ok(false),
            DelegateSlot::Failed(name) => return Err(ProtocolError::DelegateFailed(name.clone())),
            DelegateSlot::Unresolved => {}
        }

        let Some(name) = carrier_qualifier(self.state.route().carrier_name(), dir.key()) else {
            *self.slot(dir) = DelegateSlot::Absent;
            return Ok(false);
        };

        let usable = self.registry.choose_by_name(&name).filter(|c| match dir {
            Direction::Recv => c.modifies_incoming_data(),
            Direction::Send => c.modifies_outgoing_data(),
        });
        match usable {
            Some(carrier) => {
                log::debug!("[protocol] {} delegate {} ready", dir.key(), name);
                *self.slot(dir) = DelegateSlot::Ready(carrier);
                Ok(true)
            }
            None => {
                log::error!("[protocol] cannot find {} delegate {}", dir.key(), name);
                *self.slot(dir) = DelegateSlot::Failed(name.clone());
                self.close();
                Err(ProtocolError::DelegateFailed(name))
            }
        }
    }

    /// Resolve (once) the modifier applied to received payloads. A failed
    /// lookup is sticky and closes the connection.
    pub fn recv_delegate(&mut self) -> Result<Option<&dyn Carrier>, ProtocolError> {
        if !self.resolve_delegate(Direction::Recv)? {
            return Ok(None);
        }
        match &self.recv_delegate {
            DelegateSlot::Ready(c) => Ok(Some(c.as_ref())),
            _ => Ok(None),
        }
    }

    /// Resolve (once) the modifier applied to sent payloads.
    pub fn send_delegate(&mut self) -> Result<Option<&dyn Carrier>, ProtocolError> {
        if !self.resolve_delegate(Direction::Send)? {
            return Ok(None);
        }
        match &self.send_delegate {
            DelegateSlot::Ready(c) => Ok(Some(c.as_ref())),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Block until the next message arrives and return a view of it.
    pub fn begin_read(&mut self) -> Result<ConnectionReader, ProtocolError> {
        self.resolve_delegate(Direction::Recv)?;
        self.advance(ProtocolPhase::Reading)?;
        match self.begin_read_inner() {
            Ok(reader) => Ok(reader),
            Err(e) => {
                self.broken = true;
                self.state.reset_message();
                self.phase = ProtocolPhase::Established;
                Err(e)
            }
        }
    }

    fn begin_read_inner(&mut self) -> Result<ConnectionReader, ProtocolError> {
        self.state.reset_message();
        self.state.stream_mut()?.begin_packet();

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.expect_index(state)?;
        self.pending_ack = carrier.require_ack();
        let mut payload = carrier.read_payload(state)?;
        let support_reply = carrier.support_reply();
        let text_mode = carrier.is_text_mode();

        if let DelegateSlot::Ready(modifier) = &mut self.recv_delegate {
            payload = modifier.modify_incoming(payload)?;
        }

        self.pending_reply = self.state.reply_requested() && support_reply;
        Ok(ConnectionReader::new(
            payload,
            self.state.route().clone(),
            text_mode,
            self.state.envelope().to_string(),
            self.pending_reply,
        )
        .with_admin(self.state.admin()))
    }

    /// The current message expects a reply that has not been sent yet.
    pub fn will_reply(&self) -> bool {
        self.pending_reply
    }

    /// Answer the message being read.
    pub fn reply(&mut self, writer: &SizedWriter) -> Result<(), ProtocolError> {
        self.require(ProtocolPhase::Reading, ProtocolPhase::Reading)?;
        if !self.pending_reply {
            return Err(ProtocolError::Unsupported("no reply expected".into()));
        }
        self.pending_reply = false;
        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        let result = carrier.reply(state, writer).and_then(|()| state.flush());
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Finish the current message: send a pending (empty) reply and the
    /// acknowledgement, then clear per-message state.
    pub fn end_read(&mut self) -> Result<(), ProtocolError> {
        self.require(ProtocolPhase::Reading, ProtocolPhase::Established)?;
        let mut result = Ok(());
        if self.pending_reply {
            result = self.reply(&SizedWriter::new());
        }
        if result.is_ok() {
            result = self.send_pending_ack();
        }
        self.state.reset_message();
        self.advance(ProtocolPhase::Established)?;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn send_pending_ack(&mut self) -> Result<(), ProtocolError> {
        if !self.pending_ack {
            return Ok(());
        }
        self.pending_ack = false;
        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        carrier.send_ack(state)?;
        state.flush()
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Send one message. Returns the reply when the writer asked for one
    /// and the carrier supports replies.
    pub fn write(&mut self, writer: &SizedWriter) -> Result<Option<ConnectionReader>, ProtocolError> {
        self.resolve_delegate(Direction::Send)?;
        self.advance(ProtocolPhase::Writing)?;
        let result = self.write_inner(writer);
        if result.is_err() {
            self.broken = true;
            self.state.reset_message();
        }
        self.phase = ProtocolPhase::Established;
        result
    }

    fn write_inner(&mut self, writer: &SizedWriter) -> Result<Option<ConnectionReader>, ProtocolError> {
        let modified;
        let writer = match &mut self.send_delegate {
            DelegateSlot::Ready(modifier) => {
                let mut out = SizedWriter::from_bytes(modifier.modify_outgoing(writer.to_vec())?);
                if writer.reply_expected() {
                    out = out.with_reply();
                }
                if writer.is_admin() {
                    out = out.with_admin();
                }
                modified = out;
                &modified
            }
            _ => writer,
        };

        let state = &mut self.state;
        let carrier = self.delegate.as_mut().ok_or(ProtocolError::Closed)?;
        state.stream_mut()?.begin_packet();
        carrier.write(state, writer)?;
        state.stream_mut()?.end_packet()?;

        let mut reply = None;
        if writer.reply_expected() {
            if carrier.support_reply() {
                let payload = carrier.read_reply(state)?;
                reply = Some(ConnectionReader::new(
                    payload,
                    state.route().clone(),
                    carrier.is_text_mode(),
                    String::new(),
                    false,
                ));
            } else {
                log::info!(
                    "[protocol] connection {} does not support replies (try \"tcp\" or \"text_ack\")",
                    state.route()
                );
            }
        }

        if carrier.require_ack() {
            carrier.expect_ack(state)?;
        }
        state.reset_message();
        Ok(reply)
    }

    // ========================================================================
    // Route, timeouts, lifecycle
    // ========================================================================

    pub fn route(&self) -> &Route {
        self.state.route()
    }

    /// Replace the logical route without touching the streams. Delegates
    /// that were not found are looked up again under the new route.
    pub fn rename(&mut self, route: Route) {
        self.state.set_route(route);
        for slot in [&mut self.recv_delegate, &mut self.send_delegate] {
            if matches!(slot, DelegateSlot::Absent) {
                *slot = DelegateSlot::Unresolved;
            }
        }
    }

    pub fn carrier_name(&self) -> Option<&str> {
        self.delegate.as_ref().map(|c| c.name())
    }

    /// The active base carrier.
    pub fn active_carrier(&self) -> Option<&dyn Carrier> {
        self.delegate.as_deref()
    }

    pub fn set_envelope(&mut self, envelope: &str) {
        self.state.set_envelope(envelope);
    }

    /// Apply `timeout` to both directions of the stream.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError> {
        let stream = self.state.stream_mut()?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Handle for cancelling this connection from another thread. Take it
    /// after the handshake: carriers may replace the streams.
    pub fn interrupter(&self) -> Result<StreamInterrupter, ProtocolError> {
        match self.state.stream() {
            Some(stream) => Ok(stream.interrupter()?),
            None => Err(ProtocolError::Closed),
        }
    }

    /// Send a pending ack and stop reading.
    pub fn interrupt(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if let Err(e) = self.send_pending_ack() {
            log::debug!("[protocol] ack on interrupt failed: {}", e);
        }
        if let Ok(stream) = self.state.stream_mut() {
            if let Err(e) = stream.shutdown_input() {
                log::debug!("[protocol] shutdown input failed: {}", e);
            }
        }
    }

    /// Send a pending ack, then close delegates and streams. Idempotent.
    pub fn close(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if self.state.is_stream_ok() {
            if let Err(e) = self.send_pending_ack() {
                log::debug!("[protocol] ack on close failed: {}", e);
            }
        }
        for slot in [&mut self.recv_delegate, &mut self.send_delegate] {
            if let DelegateSlot::Ready(c) = slot {
                c.close();
            }
        }
        if let Some(c) = self.delegate.as_mut() {
            c.close();
        }
        if let Some(mut stream) = self.state.release_streams() {
            stream.close();
        }
        self.pending_reply = false;
        self.phase = ProtocolPhase::Closed;
    }

    /// Streams healthy, no delegate failure, not closed, no framing error.
    pub fn is_ok(&self) -> bool {
        !self.phase.is_terminal()
            && !self.broken
            && self.state.is_stream_ok()
            && !self.recv_delegate.is_failed()
            && !self.send_delegate.is_failed()
    }
}

impl Drop for Protocol {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("phase", &self.phase)
            .field("carrier", &self.carrier_name())
            .field("route", self.state.route())
            .finish()
    }
}

#[cfg(test)]
mod tests;

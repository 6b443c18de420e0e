// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Carriers: pluggable wire formats and handshakes.
//!
//! A carrier prototype is registered once in a [`CarrierRegistry`]; each
//! connection gets its own instance through [`Carrier::create`]. Inbound
//! connections are matched to a carrier by their first 8 bytes.
//!
//! # Handshake order
//!
//! ```text
//!  writer (open route)                  reader (open name)
//!  -------------------                  ------------------
//!  prepare_send
//!  send_header  ───── header + sender ─────►  [8-byte sniff]
//!                                             expect_sender_specifier
//!                                             expect_extra_header
//!  expect_reply_to_header ◄──── reply ─────  respond_to_header
//! ```
//!
//! # Message exchange
//!
//! ```text
//!  write: send_index + payload  ───────►  expect_index + read_payload
//!  read_reply (if requested)    ◄───────  reply
//!  expect_ack (if require_ack)  ◄───────  send_ack
//! ```

mod mariah;
mod nameser;
mod registry;
mod tcp;
mod tcpros;
mod text;
mod udp;
mod zlib;

pub use mariah::{MariahCarrier, MARIAH_ACK, MARIAH_HEADER};
pub use nameser::{NameserCarrier, END_OF_MESSAGE};
pub use registry::CarrierRegistry;
pub use tcp::{TcpCarrier, TCP_ACK};
pub use tcpros::{decode_ros_fields, encode_ros_header, TcpRosCarrier};
pub use text::TextCarrier;
pub use udp::UdpCarrier;
pub use zlib::ZlibCarrier;

use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

/// Length of the sniffable carrier header.
pub const HEADER_LEN: usize = 8;

/// Base for the numeric code carried in `YA....RP` headers.
pub const YARP_NUMBER_BASE: i32 = 7777;

/// Magic of binary index frames.
pub const INDEX_MAGIC: [u8; 2] = *b"YI";

/// Index frame flag: the writer waits for a reply.
pub const INDEX_FLAG_REPLY: u8 = 0x01;

/// Index frame flag: administrative message, not user data.
pub const INDEX_FLAG_ADMIN: u8 = 0x02;

/// Wire format and handshake for one transport flavor.
///
/// Capability predicates are fixed for a given variant. Handshake callbacks
/// are invoked by [`crate::Protocol`] in the order documented at module
/// level; any error aborts the connection.
pub trait Carrier: Send + Sync {
    /// Registered name, e.g. `tcp`.
    fn name(&self) -> &str;

    /// Fresh instance with independent per-connection state.
    fn create(&self) -> Box<dyn Carrier>;

    // ------------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------------

    fn is_connectionless(&self) -> bool {
        false
    }

    /// Can be sniffed on an inbound connection.
    fn can_accept(&self) -> bool {
        true
    }

    /// Can be used to initiate a connection.
    fn can_offer(&self) -> bool {
        true
    }

    fn is_text_mode(&self) -> bool {
        false
    }

    fn can_escape(&self) -> bool {
        true
    }

    fn require_ack(&self) -> bool {
        false
    }

    fn support_reply(&self) -> bool {
        false
    }

    fn is_local(&self) -> bool {
        false
    }

    /// Modifier applied to received payloads (recv delegate).
    fn modifies_incoming_data(&self) -> bool {
        false
    }

    /// Modifier applied to sent payloads (send delegate).
    fn modifies_outgoing_data(&self) -> bool {
        false
    }

    // ------------------------------------------------------------------------
    // Header sniffing
    // ------------------------------------------------------------------------

    /// The 8 bytes this carrier sends first.
    fn header(&self) -> [u8; HEADER_LEN];

    /// True iff `header` was produced by this variant.
    fn check_header(&self, header: &[u8; HEADER_LEN]) -> bool {
        self.header() == *header
    }

    /// Receive the sniffed header before the handshake continues.
    fn set_parameters(&mut self, _header: &[u8; HEADER_LEN]) {}

    // ------------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------------

    fn prepare_send(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Writer side: header followed by the sender specifier.
    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        state.write_all(&self.header())?;
        write_sender_specifier(state)
    }

    /// Reader side: learn who is talking.
    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        read_sender_specifier(state)
    }

    fn expect_extra_header(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Reader side: answer the writer's header.
    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError>;

    /// Writer side: consume the reader's answer.
    fn expect_reply_to_header(&mut self, state: &mut ConnectionState)
        -> Result<(), ProtocolError>;

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Send one message: index then payload blocks.
    fn write(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        self.send_index(state, writer)?;
        for part in writer.parts() {
            state.write_all(part)?;
        }
        Ok(())
    }

    fn send_index(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError>;

    /// Read the next index, setting the message length.
    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError>;

    /// Payload of the message announced by the last index.
    fn read_payload(&mut self, state: &mut ConnectionState) -> Result<Vec<u8>, ProtocolError> {
        if let Some(payload) = state.take_pending_payload() {
            return Ok(payload);
        }
        let len = state.message_len();
        state.read_vec(len)
    }

    /// Reader side: answer the current message.
    fn reply(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        self.write(state, writer)
    }

    /// Writer side: read the answer to the message just written.
    fn read_reply(&mut self, state: &mut ConnectionState) -> Result<Vec<u8>, ProtocolError> {
        self.expect_index(state)?;
        self.read_payload(state)
    }

    fn send_ack(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn expect_ack(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------------

    fn modify_incoming(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        Ok(payload)
    }

    fn modify_outgoing(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        Ok(payload)
    }

    fn close(&mut self) {}
}

// ============================================================================
// Shared wire helpers
// ============================================================================

/// `YA` + little-endian i32 + `RP`.
pub fn yarp_number_header(value: i32) -> [u8; HEADER_LEN] {
    let n = value.to_le_bytes();
    [b'Y', b'A', n[0], n[1], n[2], n[3], b'R', b'P']
}

/// Inverse of [`yarp_number_header`].
pub fn parse_yarp_number(header: &[u8; HEADER_LEN]) -> Option<i32> {
    if header[0..2] != *b"YA" || header[6..8] != *b"RP" {
        return None;
    }
    Some(i32::from_le_bytes([header[2], header[3], header[4], header[5]]))
}

/// Split `tcp+recv.zlib+send.zlib` into `tcp` and its qualifiers.
pub fn split_carrier_name(name: &str) -> (&str, Vec<(String, String)>) {
    let mut parts = name.split('+');
    let base = parts.next().unwrap_or("");
    let qualifiers = parts
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('.') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), "1".to_string()),
        })
        .collect();
    (base, qualifiers)
}

/// Value of qualifier `key` in a carrier name.
pub fn carrier_qualifier(name: &str, key: &str) -> Option<String> {
    split_carrier_name(name)
        .1
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Complete a one-sided modifier pairing: the writer encodes with `send.X`
/// and the reader decodes with `recv.X`, so either half implies the other.
/// Two different modifiers cannot be paired.
pub fn pair_modifiers(name: &str) -> Result<String, ProtocolError> {
    match (carrier_qualifier(name, "send"), carrier_qualifier(name, "recv")) {
        (Some(send), None) => Ok(format!("{}+recv.{}", name, send)),
        (None, Some(recv)) => Ok(format!("{}+send.{}", name, recv)),
        (Some(send), Some(recv)) if send != recv => Err(ProtocolError::Unsupported(format!(
            "payloads sent with {} cannot be read with {}",
            send, recv
        ))),
        _ => Ok(name.to_string()),
    }
}

/// Length-prefixed, NUL-terminated sender specifier.
pub fn write_sender_specifier(state: &mut ConnectionState) -> Result<(), ProtocolError> {
    let specifier = state.sender_specifier();
    let len = u32::try_from(specifier.len() + 1)
        .map_err(|_| ProtocolError::BadSenderSpecifier("specifier too long".into()))?;
    state.write_all(&len.to_le_bytes())?;
    state.write_all(specifier.as_bytes())?;
    state.write_all(&[0])
}

/// Dual of [`write_sender_specifier`]; installs the from-name.
pub fn read_sender_specifier(state: &mut ConnectionState) -> Result<(), ProtocolError> {
    let len = state.read_u32_le()? as usize;
    let max = state.config().max_specifier_len;
    if len == 0 || len > max {
        return Err(ProtocolError::BadSenderSpecifier(format!(
            "length {} outside 1..={}",
            len, max
        )));
    }
    let mut raw = state.read_vec(len)?;
    if raw.last() == Some(&0) {
        raw.pop();
    }
    let specifier = String::from_utf8(raw)
        .map_err(|_| ProtocolError::BadSenderSpecifier("not utf-8".into()))?;
    if specifier.trim().is_empty() {
        return Err(ProtocolError::BadSenderSpecifier("empty".into()));
    }
    state.set_from_name(&specifier);
    Ok(())
}

/// `YI` + u32 length + flags + reserved.
pub fn write_index_frame(
    state: &mut ConnectionState,
    len: usize,
    flags: u8,
) -> Result<(), ProtocolError> {
    let len = u32::try_from(len).map_err(|_| ProtocolError::MessageTooLarge {
        len,
        max: u32::MAX as usize,
    })?;
    let n = len.to_le_bytes();
    state.write_all(&[INDEX_MAGIC[0], INDEX_MAGIC[1], n[0], n[1], n[2], n[3], flags, 0])
}

/// Index frame flags for `writer`.
pub fn index_flags(writer: &SizedWriter) -> u8 {
    let mut flags = 0;
    if writer.reply_expected() {
        flags |= INDEX_FLAG_REPLY;
    }
    if writer.is_admin() {
        flags |= INDEX_FLAG_ADMIN;
    }
    flags
}

/// Dual of [`write_index_frame`]; sets message length and the flags.
pub fn read_index_frame(state: &mut ConnectionState) -> Result<(), ProtocolError> {
    let mut frame = [0u8; 8];
    state.read_exact(&mut frame)?;
    if frame[0..2] != INDEX_MAGIC {
        return Err(ProtocolError::BadFrame(format!(
            "expected index magic, got {:02x?}",
            &frame[0..2]
        )));
    }
    let len = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]) as usize;
    state.set_message_len(len)?;
    state.set_reply_requested(frame[6] & INDEX_FLAG_REPLY != 0);
    state.set_admin(frame[6] & INDEX_FLAG_ADMIN != 0);
    Ok(())
}

/// Read exactly `expected.len()` bytes and compare; a short read or a
/// difference is an [`ProtocolError::AckMismatch`].
pub fn expect_literal(state: &mut ConnectionState, expected: &[u8]) -> Result<(), ProtocolError> {
    let got = state.read_partial(expected.len())?;
    if got != expected {
        return Err(ProtocolError::AckMismatch {
            expected: expected.to_vec(),
            got,
        });
    }
    Ok(())
}

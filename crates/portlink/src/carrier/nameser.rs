// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Legacy name-server text carrier.
//!
//! A client opens a socket and writes `NAME_SERVER query /foo\n`; the first
//! 8 bytes (`NAME_SER`) select this carrier. The reply is a block of text
//! lines closed by [`END_OF_MESSAGE`].

use super::{Carrier, HEADER_LEN};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

/// Last line of every name-server text reply.
pub const END_OF_MESSAGE: &str = "*** end of message";

const NAMESER_HEADER: [u8; HEADER_LEN] = *b"NAME_SER";
const NAMESER_TAIL: &[u8] = b"VER ";

#[derive(Debug, Clone, Default)]
pub struct NameserCarrier;

impl NameserCarrier {
    pub fn new() -> Self {
        Self
    }
}

impl Carrier for NameserCarrier {
    fn name(&self) -> &str {
        "name_ser"
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn is_text_mode(&self) -> bool {
        true
    }

    fn can_escape(&self) -> bool {
        false
    }

    fn support_reply(&self) -> bool {
        true
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        NAMESER_HEADER
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        state.write_all(&NAMESER_HEADER)?;
        state.write_all(NAMESER_TAIL)
    }

    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let mut tail = [0u8; 4];
        state.read_exact(&mut tail)?;
        if tail != NAMESER_TAIL {
            return Err(ProtocolError::handshake(
                "name_ser",
                format!("expected NAME_SERVER prefix, got {:?}", String::from_utf8_lossy(&tail)),
            ));
        }
        state.set_from_name("anon");
        Ok(())
    }

    fn respond_to_header(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn expect_reply_to_header(
        &mut self,
        _state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        let mut payload = writer.to_vec();
        if payload.last() != Some(&b'\n') {
            payload.push(b'\n');
        }
        state.write_all(&payload)
    }

    fn send_index(
        &mut self,
        _state: &mut ConnectionState,
        _writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let line = state.read_line()?;
        let line = line.trim().to_string();
        state.set_message_len(line.len())?;
        state.set_pending_payload(line.into_bytes());
        state.set_reply_requested(true);
        Ok(())
    }

    fn read_reply(&mut self, state: &mut ConnectionState) -> Result<Vec<u8>, ProtocolError> {
        let mut text = String::new();
        loop {
            let line = state.read_line()?;
            if line == END_OF_MESSAGE {
                break;
            }
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text.into_bytes())
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Human-readable line carriers: `text` and `text_ack`.
//!
//! Usable from a terminal: type `CONNECT /me`, then one message per line.

use super::{Carrier, HEADER_LEN};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

const TEXT_HEADER: [u8; HEADER_LEN] = *b"CONNECT ";
const TEXT_ACK_HEADER: [u8; HEADER_LEN] = *b"CONNACK ";
const TEXT_ACK: &str = "<ACK>";

/// Line-oriented text carrier.
#[derive(Debug, Clone)]
pub struct TextCarrier {
    ack: bool,
}

impl TextCarrier {
    /// `text`: no acknowledgement.
    pub fn new() -> Self {
        Self { ack: false }
    }

    /// `text_ack`: each line is acknowledged with `<ACK>`.
    pub fn with_ack() -> Self {
        Self { ack: true }
    }
}

impl Default for TextCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for TextCarrier {
    fn name(&self) -> &str {
        if self.ack {
            "text_ack"
        } else {
            "text"
        }
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(self.clone())
    }

    fn is_text_mode(&self) -> bool {
        true
    }

    fn can_escape(&self) -> bool {
        false
    }

    fn require_ack(&self) -> bool {
        self.ack
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        if self.ack {
            TEXT_ACK_HEADER
        } else {
            TEXT_HEADER
        }
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let line = format!("{}\r\n", state.sender_specifier());
        state.write_all(&self.header())?;
        state.write_all(line.as_bytes())
    }

    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let from = state.read_line()?;
        let from = from.trim();
        if from.is_empty() {
            return Err(ProtocolError::BadSenderSpecifier("empty".into()));
        }
        state.set_from_name(from);
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let line = format!("Welcome {}\r\n", state.route().from_name());
        state.write_all(line.as_bytes())
    }

    fn expect_reply_to_header(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let line = state.read_line()?;
        if !line.starts_with("Welcome") {
            return Err(ProtocolError::handshake(
                self.name(),
                format!("unexpected greeting {:?}", line),
            ));
        }
        Ok(())
    }

    fn write(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        let mut payload = writer.to_vec();
        if payload.last() == Some(&b'\n') {
            payload.pop();
            if payload.last() == Some(&b'\r') {
                payload.pop();
            }
        }
        if payload.contains(&b'\n') {
            return Err(ProtocolError::BadFrame(
                "text carrier messages are single lines".into(),
            ));
        }
        payload.extend_from_slice(b"\r\n");
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
        state.set_message_len(line.len())?;
        state.set_pending_payload(line.into_bytes());
        Ok(())
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        if self.ack {
            state.write_all(format!("{}\r\n", TEXT_ACK).as_bytes())?;
        }
        Ok(())
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        if !self.ack {
            return Ok(());
        }
        let got = match state.read_line() {
            Ok(line) => line,
            Err(ProtocolError::Closed) => String::new(),
            Err(e) => return Err(e),
        };
        if got != TEXT_ACK {
            return Err(ProtocolError::AckMismatch {
                expected: TEXT_ACK.as_bytes().to_vec(),
                got: got.into_bytes(),
            });
        }
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `mariah`: a user-defined carrier with a literal acknowledgement.
//!
//! Handshake: `MARIAH  ` header, sender name line, then the reader answers
//! with [`MARIAH_ACK`]. Messages are a little-endian u32 length plus payload
//! and every message is acknowledged with the same literal.

use super::{expect_literal, Carrier, HEADER_LEN};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

/// Magic header, `MARIAH` padded with spaces.
pub const MARIAH_HEADER: [u8; HEADER_LEN] = *b"MARIAH  ";

/// Acknowledgement literal.
pub const MARIAH_ACK: &[u8] = b"<MARIAH-ACK>\n";

#[derive(Debug, Clone, Default)]
pub struct MariahCarrier;

impl MariahCarrier {
    pub fn new() -> Self {
        Self
    }
}

impl Carrier for MariahCarrier {
    fn name(&self) -> &str {
        "mariah"
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn require_ack(&self) -> bool {
        true
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        MARIAH_HEADER
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let line = format!("{}\n", state.sender_specifier());
        state.write_all(&MARIAH_HEADER)?;
        state.write_all(line.as_bytes())
    }

    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let from = state.read_line()?;
        if from.trim().is_empty() {
            return Err(ProtocolError::BadSenderSpecifier("empty".into()));
        }
        state.set_from_name(from.trim());
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        state.write_all(MARIAH_ACK)
    }

    fn expect_reply_to_header(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        expect_literal(state, MARIAH_ACK)
            .map_err(|e| ProtocolError::handshake("mariah", e.to_string()))
    }

    fn send_index(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        let len = u32::try_from(writer.len()).map_err(|_| ProtocolError::MessageTooLarge {
            len: writer.len(),
            max: u32::MAX as usize,
        })?;
        state.write_all(&len.to_le_bytes())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let len = state.read_u32_le()? as usize;
        state.set_message_len(len)
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        state.write_all(MARIAH_ACK)
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        expect_literal(state, MARIAH_ACK)
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary TCP carriers: `tcp` (acknowledged) and `fast_tcp`.

use super::{
    expect_literal, index_flags, parse_yarp_number, read_index_frame, write_index_frame,
    yarp_number_header, Carrier, HEADER_LEN, YARP_NUMBER_BASE,
};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

/// Acknowledgement token of the `tcp` carrier.
pub const TCP_ACK: [u8; HEADER_LEN] = [b'Y', b'A', 0, 0, 0, 0, b'R', b'P'];

const TCP_CODE: i32 = 3;
const FAST_TCP_CODE: i32 = 4;

/// Binary framing over a TCP stream.
#[derive(Debug, Clone)]
pub struct TcpCarrier {
    name: &'static str,
    code: i32,
    ack: bool,
}

impl TcpCarrier {
    /// `tcp`: every message is acknowledged.
    pub fn new() -> Self {
        Self {
            name: "tcp",
            code: TCP_CODE,
            ack: true,
        }
    }

    /// `fast_tcp`: no acknowledgement.
    pub fn fast() -> Self {
        Self {
            name: "fast_tcp",
            code: FAST_TCP_CODE,
            ack: false,
        }
    }
}

impl Default for TcpCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for TcpCarrier {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(self.clone())
    }

    fn require_ack(&self) -> bool {
        self.ack
    }

    fn support_reply(&self) -> bool {
        true
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        yarp_number_header(YARP_NUMBER_BASE + self.code)
    }

    fn check_header(&self, header: &[u8; HEADER_LEN]) -> bool {
        parse_yarp_number(header) == Some(YARP_NUMBER_BASE + self.code)
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let port = state.local_addr().map_or(0, |a| i32::from(a.port()));
        state.write_all(&yarp_number_header(port))
    }

    fn expect_reply_to_header(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let mut reply = [0u8; HEADER_LEN];
        state.read_exact(&mut reply)?;
        match parse_yarp_number(&reply) {
            Some(port) => {
                log::debug!("[tcp] peer accepted on port {}", port);
                Ok(())
            }
            None => Err(ProtocolError::handshake(self.name, "bad reply to header")),
        }
    }

    fn send_index(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        write_index_frame(state, writer.len(), index_flags(writer))
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        read_index_frame(state)
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        if self.ack {
            state.write_all(&TCP_ACK)?;
        }
        Ok(())
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        if self.ack {
            expect_literal(state, &TCP_ACK)?;
        }
        Ok(())
    }
}

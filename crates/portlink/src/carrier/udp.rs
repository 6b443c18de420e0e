// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `udp`: handshake over TCP, messages over datagrams.
//!
//! The reader binds a UDP socket on the same port number as its end of the
//! TCP connection and announces it in the reply header. Both sides then
//! swap their streams for a [`DatagramStream`] and drop the TCP socket.

use std::net::SocketAddr;

use super::{
    index_flags, parse_yarp_number, read_index_frame, write_index_frame, yarp_number_header,
    Carrier, HEADER_LEN, INDEX_FLAG_REPLY, YARP_NUMBER_BASE,
};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};
use crate::stream::DatagramStream;

const UDP_CODE: i32 = 0;

#[derive(Debug, Clone, Default)]
pub struct UdpCarrier;

impl UdpCarrier {
    pub fn new() -> Self {
        Self
    }
}

fn addresses(state: &ConnectionState) -> Result<(SocketAddr, SocketAddr), ProtocolError> {
    match (state.local_addr(), state.peer_addr()) {
        (Some(local), Some(peer)) => Ok((local, peer)),
        _ => Err(ProtocolError::handshake("udp", "stream has no socket addresses")),
    }
}

impl Carrier for UdpCarrier {
    fn name(&self) -> &str {
        "udp"
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn is_connectionless(&self) -> bool {
        true
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        yarp_number_header(YARP_NUMBER_BASE + UDP_CODE)
    }

    fn check_header(&self, header: &[u8; HEADER_LEN]) -> bool {
        parse_yarp_number(header) == Some(YARP_NUMBER_BASE + UDP_CODE)
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let (local, peer) = addresses(state)?;
        let dgram = DatagramStream::open(local, peer)?;
        state.write_all(&yarp_number_header(i32::from(local.port())))?;
        state.flush()?;
        if let Some(mut old) = state.take_streams(Box::new(dgram)) {
            old.close();
        }
        log::debug!("[udp] reader switched to datagrams on {}", local);
        Ok(())
    }

    fn expect_reply_to_header(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let mut reply = [0u8; HEADER_LEN];
        state.read_exact(&mut reply)?;
        let port = parse_yarp_number(&reply)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| ProtocolError::handshake("udp", "bad port in reply header"))?;
        let (local, peer) = addresses(state)?;
        let remote = SocketAddr::new(peer.ip(), port);
        let dgram = DatagramStream::open(local, remote)?;
        if let Some(mut old) = state.take_streams(Box::new(dgram)) {
            old.close();
        }
        log::debug!("[udp] writer switched to datagrams towards {}", remote);
        Ok(())
    }

    fn send_index(
        &mut self,
        state: &mut ConnectionState,
        writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        write_index_frame(state, writer.len(), index_flags(writer) & !INDEX_FLAG_REPLY)
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        read_index_frame(state)?;
        // No reply path over datagrams.
        state.set_reply_requested(false);
        Ok(())
    }
}

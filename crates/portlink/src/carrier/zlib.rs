// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `zlib` modifier: compresses sent payloads, inflates received ones.
//!
//! Never a base carrier. Selected as a delegate through carrier qualifiers,
//! e.g. `tcp+send.zlib` on the writer and `+recv.zlib` on the reader. Opening
//! a route with either half adds the other, so both ends always agree.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{Carrier, HEADER_LEN};
use crate::error::ProtocolError;
use crate::protocol::{ConnectionState, SizedWriter};

#[derive(Debug, Clone)]
pub struct ZlibCarrier {
    level: Compression,
    max_inflated: usize,
}

impl ZlibCarrier {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
            max_inflated: crate::config::DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    fn modifier_only(&self) -> ProtocolError {
        ProtocolError::Unsupported("zlib only modifies payloads of another carrier".into())
    }
}

impl Default for ZlibCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for ZlibCarrier {
    fn name(&self) -> &str {
        "zlib"
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(self.clone())
    }

    fn can_accept(&self) -> bool {
        false
    }

    fn can_offer(&self) -> bool {
        false
    }

    fn modifies_incoming_data(&self) -> bool {
        true
    }

    fn modifies_outgoing_data(&self) -> bool {
        true
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        *b"ZLIB\0\0\0\0"
    }

    fn check_header(&self, _header: &[u8; HEADER_LEN]) -> bool {
        false
    }

    fn respond_to_header(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Err(self.modifier_only())
    }

    fn expect_reply_to_header(
        &mut self,
        _state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        Err(self.modifier_only())
    }

    fn send_index(
        &mut self,
        _state: &mut ConnectionState,
        _writer: &SizedWriter,
    ) -> Result<(), ProtocolError> {
        Err(self.modifier_only())
    }

    fn expect_index(&mut self, _state: &mut ConnectionState) -> Result<(), ProtocolError> {
        Err(self.modifier_only())
    }

    fn modify_outgoing(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2 + 16), self.level);
        encoder.write_all(&payload)?;
        Ok(encoder.finish()?)
    }

    fn modify_incoming(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        let limit = self.max_inflated as u64 + 1;
        ZlibDecoder::new(payload.as_slice())
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|e| ProtocolError::BadFrame(format!("zlib: {}", e)))?;
        if out.len() > self.max_inflated {
            return Err(ProtocolError::MessageTooLarge {
                len: out.len(),
                max: self.max_inflated,
            });
        }
        Ok(out)
    }
}

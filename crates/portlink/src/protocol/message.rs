// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound message ([`SizedWriter`]) and inbound message view
//! ([`ConnectionReader`]).

use crate::bottle::{Bottle, BottleParseError};
use crate::route::Route;

/// One logical outbound message, made of byte blocks whose total size is
/// known before transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizedWriter {
    parts: Vec<Vec<u8>>,
    reply_expected: bool,
    admin: bool,
}

impl SizedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            parts: vec![bytes],
            ..Self::default()
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    pub fn from_bottle(bottle: &Bottle) -> Self {
        Self::from_bytes(bottle.to_bytes())
    }

    /// Append a block.
    pub fn push(&mut self, block: Vec<u8>) {
        self.parts.push(block);
    }

    /// Builder: ask the reader for a reply.
    pub fn with_reply(mut self) -> Self {
        self.reply_expected = true;
        self
    }

    pub fn reply_expected(&self) -> bool {
        self.reply_expected
    }

    /// Builder: mark as an administrative message. Ports handle these
    /// themselves instead of queueing them for the user.
    pub fn with_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    /// Total payload length.
    pub fn len(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated payload.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for part in &self.parts {
            out.extend_from_slice(part);
        }
        out
    }
}

/// View over one received message.
#[derive(Debug, Clone)]
pub struct ConnectionReader {
    payload: Vec<u8>,
    pos: usize,
    route: Route,
    text_mode: bool,
    envelope: String,
    reply_requested: bool,
    admin: bool,
}

impl ConnectionReader {
    pub(crate) fn new(
        payload: Vec<u8>,
        route: Route,
        text_mode: bool,
        envelope: String,
        reply_requested: bool,
    ) -> Self {
        Self {
            payload,
            pos: 0,
            route,
            text_mode,
            envelope,
            reply_requested,
            admin: false,
        }
    }

    pub(crate) fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Whole payload, independent of the read cursor.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Consume the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.payload.len() {
            return None;
        }
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Some(slice)
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.pos
    }

    /// Rest of the payload as text, lossy, without trailing line endings.
    pub fn expect_text(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.payload[self.pos..])
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.pos = self.payload.len();
        text
    }

    /// Whole payload parsed as a [`Bottle`].
    pub fn to_bottle(&self) -> Result<Bottle, BottleParseError> {
        Bottle::from_bytes(&self.payload)
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    pub fn envelope(&self) -> &str {
        &self.envelope
    }

    /// The sender is waiting for a reply on this message.
    pub fn reply_requested(&self) -> bool {
        self.reply_requested
    }

    /// Sent as an administrative message.
    pub fn is_admin(&self) -> bool {
        self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_writer_parts() {
        let mut w = SizedWriter::from_text("hello");
        w.push(b" world".to_vec());
        assert_eq!(w.len(), 11);
        assert_eq!(w.to_vec(), b"hello world");
        assert!(!w.reply_expected());
        assert!(w.clone().with_reply().reply_expected());
    }

    #[test]
    fn test_reader_cursor() {
        let mut r = ConnectionReader::new(
            b"abcdef\r\n".to_vec(),
            Route::new("/a", "/b", "tcp"),
            false,
            String::new(),
            false,
        );
        assert_eq!(r.read_bytes(2), Some(&b"ab"[..]));
        assert_eq!(r.remaining(), 6);
        assert_eq!(r.read_bytes(10), None);
        assert_eq!(r.expect_text(), "cdef");
        assert_eq!(r.remaining(), 0);
        assert_eq!(r.payload(), b"abcdef\r\n");
    }
}

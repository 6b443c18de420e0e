// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection state handed to carrier callbacks.

use std::io::{Read, Write};
use std::net::SocketAddr;

use crate::bottle::{Bottle, Value};
use crate::carrier::split_carrier_name;
use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::route::Route;
use crate::stream::{BoxedStream, TwoWayStream};

/// Streams, route and framing state of one connection.
///
/// Carriers only see the connection through this type; the phase machine
/// and delegates stay inside [`super::Protocol`].
pub struct ConnectionState {
    stream: Option<BoxedStream>,
    route: Route,
    message_len: usize,
    envelope: String,
    reply_requested: bool,
    admin: bool,
    pending_payload: Option<Vec<u8>>,
    config: ProtocolConfig,
}

impl ConnectionState {
    pub fn new(stream: BoxedStream, config: ProtocolConfig) -> Self {
        Self {
            stream: Some(stream),
            route: Route::default(),
            message_len: 0,
            envelope: String::new(),
            reply_requested: false,
            admin: false,
            pending_payload: None,
            config,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------------

    pub fn stream_mut(&mut self) -> Result<&mut dyn TwoWayStream, ProtocolError> {
        match self.stream.as_mut() {
            Some(s) => Ok(s.as_mut()),
            None => Err(ProtocolError::Closed),
        }
    }

    pub fn stream(&self) -> Option<&dyn TwoWayStream> {
        self.stream.as_deref()
    }

    /// Replace the streams, returning the previous ones.
    pub fn take_streams(&mut self, stream: BoxedStream) -> Option<BoxedStream> {
        self.stream.replace(stream)
    }

    /// Detach the streams entirely.
    pub fn release_streams(&mut self) -> Option<BoxedStream> {
        self.stream.take()
    }

    pub fn is_stream_ok(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_ok())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        self.stream_mut()?.read_exact(buf)?;
        Ok(())
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read up to `limit` bytes, stopping early at end of stream.
    pub fn read_partial(&mut self, limit: usize) -> Result<Vec<u8>, ProtocolError> {
        let stream = self.stream_mut()?;
        let mut out = Vec::with_capacity(limit);
        let mut byte = [0u8; 1];
        while out.len() < limit {
            match stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => out.push(byte[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    /// Read one `\n` terminated line, without the line ending.
    pub fn read_line(&mut self) -> Result<String, ProtocolError> {
        let max = self.config.max_message_len;
        let stream = self.stream_mut()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match stream.read(&mut byte) {
                Ok(0) => {
                    if line.is_empty() {
                        return Err(ProtocolError::Closed);
                    }
                    break;
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                    if line.len() > max {
                        return Err(ProtocolError::MessageTooLarge {
                            len: line.len(),
                            max,
                        });
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).map_err(|e| ProtocolError::BadFrame(format!("line is not utf-8: {}", e)))
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
        self.stream_mut()?.write_all(buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.stream_mut()?.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Route
    // ------------------------------------------------------------------------

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Install `route`. A from-name carrying qualifiers, e.g.
    /// `/foo (recv zlib)`, is split back into the plain name and the
    /// carrier qualifiers `+recv.zlib`.
    pub fn set_route(&mut self, route: Route) {
        let mut route = route;
        if route.from_name().contains(' ') {
            if let Ok(specifier) = Bottle::from_text(route.from_name()) {
                let name = specifier.get(0).map(Value::to_plain_string).unwrap_or_default();
                let mut carrier = route.carrier_name().to_string();
                for item in specifier.iter().skip(1) {
                    let Some(pair) = item.as_list() else { continue };
                    let (Some(key), Some(value)) = (pair.get(0), pair.get(1)) else {
                        continue;
                    };
                    let qualifier =
                        format!("+{}.{}", key.to_plain_string(), value.to_plain_string());
                    if !carrier.contains(&qualifier) {
                        carrier.push_str(&qualifier);
                    }
                }
                route.set_from_name(&name);
                route.set_carrier_name(&carrier);
            }
        }
        self.route = route;
    }

    pub fn set_from_name(&mut self, name: &str) {
        let mut route = self.route.clone();
        route.set_from_name(name);
        self.set_route(route);
    }

    pub fn set_to_name(&mut self, name: &str) {
        self.route.set_to_name(name);
    }

    pub fn set_carrier_name(&mut self, name: &str) {
        self.route.set_carrier_name(name);
    }

    /// From-name plus carrier qualifiers, e.g. `tcp+recv.zlib` from `/foo`
    /// gives `/foo (recv zlib)`.
    pub fn sender_specifier(&self) -> String {
        let (_, qualifiers) = split_carrier_name(self.route.carrier_name());
        let mut out = self.route.from_name().to_string();
        for (key, value) in qualifiers {
            out.push_str(&format!(" ({} {})", key, value));
        }
        out
    }

    // ------------------------------------------------------------------------
    // Framing
    // ------------------------------------------------------------------------

    pub fn message_len(&self) -> usize {
        self.message_len
    }

    /// Set the announced payload length, enforcing the configured limit.
    pub fn set_message_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        let max = self.config.max_message_len;
        if len > max {
            return Err(ProtocolError::MessageTooLarge { len, max });
        }
        self.message_len = len;
        Ok(())
    }

    pub fn envelope(&self) -> &str {
        &self.envelope
    }

    pub fn set_envelope(&mut self, envelope: &str) {
        self.envelope = envelope.to_string();
    }

    pub fn reply_requested(&self) -> bool {
        self.reply_requested
    }

    pub fn set_reply_requested(&mut self, flag: bool) {
        self.reply_requested = flag;
    }

    pub fn admin(&self) -> bool {
        self.admin
    }

    pub fn set_admin(&mut self, flag: bool) {
        self.admin = flag;
    }

    /// Payload already read while parsing the index (text carriers).
    pub fn set_pending_payload(&mut self, payload: Vec<u8>) {
        self.pending_payload = Some(payload);
    }

    pub fn take_pending_payload(&mut self) -> Option<Vec<u8>> {
        self.pending_payload.take()
    }

    /// Clear per-message state.
    pub fn reset_message(&mut self) {
        self.message_len = 0;
        self.envelope.clear();
        self.reply_requested = false;
        self.admin = false;
        self.pending_payload = None;
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("route", &self.route)
            .field("message_len", &self.message_len)
            .field("stream_ok", &self.is_stream_ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::mock::MockStream;

    fn state() -> (ConnectionState, MockStream) {
        let (a, b) = MockStream::pair();
        (ConnectionState::new(Box::new(a), ProtocolConfig::default()), b)
    }

    #[test]
    fn test_sender_specifier_from_qualifiers() {
        let (mut s, _peer) = state();
        s.set_route(Route::new("/foo", "/bar", "tcp+recv.zlib"));
        assert_eq!(s.sender_specifier(), "/foo (recv zlib)");

        s.set_route(Route::new("/foo", "/bar", "tcp"));
        assert_eq!(s.sender_specifier(), "/foo");
    }

    #[test]
    fn test_set_route_splits_qualifiers() {
        let (mut s, _peer) = state();
        s.set_route(Route::new("/foo (recv zlib)", "/bar", "tcp"));
        assert_eq!(s.route().from_name(), "/foo");
        assert_eq!(s.route().carrier_name(), "tcp+recv.zlib");
    }

    #[test]
    fn test_read_line_strips_crlf() {
        let (mut s, mut peer) = state();
        peer.write_all(b"Welcome /foo\r\nrest").unwrap();
        assert_eq!(s.read_line().unwrap(), "Welcome /foo");
        assert_eq!(s.read_vec(4).unwrap(), b"rest");
    }

    #[test]
    fn test_message_len_limit() {
        let (a, _b) = MockStream::pair();
        let mut s = ConnectionState::new(
            Box::new(a),
            ProtocolConfig::default().with_max_message_len(8),
        );
        assert!(s.set_message_len(8).is_ok());
        assert!(matches!(
            s.set_message_len(9),
            Err(ProtocolError::MessageTooLarge { len: 9, max: 8 })
        ));
    }
}

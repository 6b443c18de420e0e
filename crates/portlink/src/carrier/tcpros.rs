// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `tcpros`: ROS TCPROS connection headers and length-prefixed payloads.
//!
//! A connection header is a little-endian u32 total length followed by
//! fields, each a u32 length plus `key=value`. There is no fixed magic: an
//! inbound connection is taken to be TCPROS when its first two u32 values
//! are both plausible lengths.

use super::{carrier_qualifier, Carrier, HEADER_LEN};
use crate::error::ProtocolError;
use crate::name::ros::to_ros_name;
use crate::protocol::{ConnectionState, SizedWriter};

const MAX_SNIFF_LEN: u32 = 60_000;

/// Encode a TCPROS connection header.
pub fn encode_ros_header(fields: &[(String, String)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in fields {
        let field = format!("{}={}", key, value);
        body.extend_from_slice(&(field.len() as u32).to_le_bytes());
        body.extend_from_slice(field.as_bytes());
    }
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decode the field section of a header (without the total length).
pub fn decode_ros_fields(mut body: &[u8]) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut fields = Vec::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(ProtocolError::BadFrame("truncated tcpros field length".into()));
        }
        let len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        body = &body[4..];
        if len > body.len() {
            return Err(ProtocolError::BadFrame("truncated tcpros field".into()));
        }
        let field = std::str::from_utf8(&body[..len])
            .map_err(|_| ProtocolError::BadFrame("tcpros field is not utf-8".into()))?;
        body = &body[len..];
        match field.split_once('=') {
            Some((k, v)) => fields.push((k.to_string(), v.to_string())),
            None => return Err(ProtocolError::BadFrame(format!("tcpros field {:?}", field))),
        }
    }
    Ok(fields)
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// TCPROS carrier.
#[derive(Debug, Clone, Default)]
pub struct TcpRosCarrier {
    sniffed: Option<[u8; HEADER_LEN]>,
    remote_fields: Vec<(String, String)>,
}

impl TcpRosCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields received from the peer during the handshake.
    pub fn remote_fields(&self) -> &[(String, String)] {
        &self.remote_fields
    }

    fn local_fields(&self, state: &ConnectionState, caller: &str) -> Vec<(String, String)> {
        let carrier = state.route().carrier_name();
        let topic = carrier_qualifier(carrier, "topic")
            .or_else(|| field(&self.remote_fields, "topic").map(str::to_string))
            .unwrap_or_else(|| state.route().to_name().to_string());
        let msg_type = carrier_qualifier(carrier, "type")
            .or_else(|| field(&self.remote_fields, "type").map(str::to_string))
            .unwrap_or_else(|| "*".to_string());
        let mut fields = vec![
            ("callerid".to_string(), to_ros_name(caller)),
            ("topic".to_string(), topic),
            ("type".to_string(), msg_type),
            ("md5sum".to_string(), "*".to_string()),
        ];
        if let Some(service) = carrier_qualifier(carrier, "service") {
            fields[1] = ("service".to_string(), service);
            fields.push(("persistent".to_string(), "1".to_string()));
        }
        fields
    }
}

impl Carrier for TcpRosCarrier {
    fn name(&self) -> &str {
        "tcpros"
    }

    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self::new())
    }

    fn can_escape(&self) -> bool {
        false
    }

    /// First 8 bytes of a default connection header.
    fn header(&self) -> [u8; HEADER_LEN] {
        let fields = vec![
            ("callerid".to_string(), "/portlink".to_string()),
            ("topic".to_string(), "/portlink".to_string()),
            ("type".to_string(), "*".to_string()),
            ("md5sum".to_string(), "*".to_string()),
        ];
        let encoded = encode_ros_header(&fields);
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(&encoded[..HEADER_LEN]);
        out
    }

    fn check_header(&self, header: &[u8; HEADER_LEN]) -> bool {
        let total = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let first = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        total > 0 && total < MAX_SNIFF_LEN && first > 0 && first < MAX_SNIFF_LEN && first + 4 <= total
    }

    fn set_parameters(&mut self, header: &[u8; HEADER_LEN]) {
        self.sniffed = Some(*header);
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let from = state.route().from_name().to_string();
        let fields = self.local_fields(state, &from);
        state.write_all(&encode_ros_header(&fields))
    }

    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let sniffed = self
            .sniffed
            .ok_or_else(|| ProtocolError::handshake("tcpros", "header not sniffed"))?;
        let total = u32::from_le_bytes([sniffed[0], sniffed[1], sniffed[2], sniffed[3]]) as usize;
        let mut body = sniffed[4..].to_vec();
        body.extend(state.read_vec(total - 4)?);
        self.remote_fields = decode_ros_fields(&body)?;
        let caller = field(&self.remote_fields, "callerid")
            .ok_or_else(|| ProtocolError::BadSenderSpecifier("tcpros header without callerid".into()))?
            .to_string();
        log::debug!("[tcpros] header from {}: {:?}", caller, self.remote_fields);
        state.set_from_name(&caller);
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), ProtocolError> {
        let to = state.route().to_name().to_string();
        let fields = self.local_fields(state, &to);
        state.write_all(&encode_ros_header(&fields))
    }

    fn expect_reply_to_header(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), ProtocolError> {
        let len = state.read_u32_le()? as usize;
        let max = state.config().max_specifier_len.max(MAX_SNIFF_LEN as usize);
        if len > max {
            return Err(ProtocolError::handshake("tcpros", format!("header length {}", len)));
        }
        let body = state.read_vec(len)?;
        self.remote_fields = decode_ros_fields(&body)?;
        if let Some(error) = field(&self.remote_fields, "error") {
            return Err(ProtocolError::handshake("tcpros", error.to_string()));
        }
        if field(&self.remote_fields, "callerid").is_none() {
            return Err(ProtocolError::handshake("tcpros", "reply without callerid"));
        }
        Ok(())
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
}

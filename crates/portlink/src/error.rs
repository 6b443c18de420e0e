// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the connection layer.
//!
//! Name-service errors live in [`crate::name::NameError`]; resolution
//! failures there are mostly reported as invalid contacts instead.

use std::fmt;
use std::io;

use crate::protocol::ProtocolPhase;

/// Connection-level errors raised by [`crate::Protocol`] and carriers.
#[derive(Debug)]
pub enum ProtocolError {
    /// The route named a carrier nobody registered.
    UnknownCarrier(String),

    /// The first 8 bytes of an inbound connection matched no carrier.
    HeaderNotRecognized([u8; 8]),

    /// A carrier saw bytes it did not expect during the handshake.
    HandshakeFailed { carrier: String, reason: String },

    /// Sender specifier was empty, too long or not valid UTF-8.
    BadSenderSpecifier(String),

    /// Index frame announced a payload above the configured limit.
    MessageTooLarge { len: usize, max: usize },

    /// Malformed index or payload frame.
    BadFrame(String),

    /// Acknowledgement missing or different from the carrier's token.
    AckMismatch { expected: Vec<u8>, got: Vec<u8> },

    /// Operation attempted in a phase that does not allow it.
    IllegalTransition {
        from: ProtocolPhase,
        to: ProtocolPhase,
    },

    /// Modifier carrier lookup failed earlier; the failure is sticky.
    DelegateFailed(String),

    /// Carrier cannot be used in the requested role.
    Unsupported(String),

    /// The connection was closed.
    Closed,

    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCarrier(name) => write!(f, "Unknown carrier: {}", name),
            Self::HeaderNotRecognized(h) => {
                write!(f, "Protocol not recognized: {}", String::from_utf8_lossy(h))
            }
            Self::HandshakeFailed { carrier, reason } => {
                write!(f, "Handshake failed on {}: {}", carrier, reason)
            }
            Self::BadSenderSpecifier(s) => write!(f, "Bad sender specifier: {}", s),
            Self::MessageTooLarge { len, max } => {
                write!(f, "Message too large: {} bytes (max {})", len, max)
            }
            Self::BadFrame(s) => write!(f, "Bad frame: {}", s),
            Self::AckMismatch { expected, got } => write!(
                f,
                "Ack mismatch: expected {:?}, got {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(got)
            ),
            Self::IllegalTransition { from, to } => {
                write!(f, "Illegal protocol transition: {} -> {}", from, to)
            }
            Self::DelegateFailed(s) => write!(f, "Delegate carrier failed: {}", s),
            Self::Unsupported(s) => write!(f, "Unsupported: {}", s),
            Self::Closed => write!(f, "Connection closed"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Self::Closed;
        }
        Self::Io(e)
    }
}

impl ProtocolError {
    /// Shorthand for a handshake failure on `carrier`.
    pub fn handshake(carrier: &str, reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            carrier: carrier.to_string(),
            reason: reason.into(),
        }
    }
}

/// Packet pool bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Handle refers to a packet that has been recycled since.
    StaleHandle { index: u32, generation: u32 },

    /// A `dec` was issued on a packet whose count is already zero.
    CountUnderflow { index: u32 },

    /// Operation requires an active packet.
    NotActive { index: u32 },
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleHandle { index, generation } => {
                write!(f, "Stale packet handle {} (generation {})", index, generation)
            }
            Self::CountUnderflow { index } => {
                write!(f, "Packet {} reference count underflow", index)
            }
            Self::NotActive { index } => write!(f, "Packet {} is not active", index),
        }
    }
}

impl std::error::Error for PacketError {}

/// Configuration loading / validation errors.
#[derive(Debug)]
pub enum ConfigError {
    /// A field failed validation.
    Invalid(&'static str),

    /// Config file could not be parsed.
    Parse(String),

    /// I/O error while reading or writing a config file.
    Io(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(s) => write!(f, "Invalid configuration: {}", s),
            Self::Parse(s) => write!(f, "Config parse error: {}", s),
            Self::Io(e) => write!(f, "Config I/O error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_maps_to_closed() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, ProtocolError::Closed));

        let err: ProtocolError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_display() {
        let err = ProtocolError::HeaderNotRecognized(*b"GET / HT");
        assert_eq!(err.to_string(), "Protocol not recognized: GET / HT");

        let err = PacketError::CountUnderflow { index: 3 };
        assert_eq!(err.to_string(), "Packet 3 reference count underflow");
    }
}

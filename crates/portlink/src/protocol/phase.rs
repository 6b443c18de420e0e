// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection phases and the legal transitions between them.
//!
//! ```text
//!            open(route)                    open(name)
//!   Idle ─────────────► Prepared      Idle ─────────────► HeaderExpected
//!                          │                                   │
//!                 send_header                     expect_sender_specifier
//!                          ▼                                   ▼
//!                      HeaderSent                         SenderKnown
//!                          │                                   │
//!               expect_reply_to_header         extra header + respond_to_header
//!                          ▼                                   ▼
//!                          └────────────► Established ◄────────┘
//!                                          │      ▲
//!                            begin_read /  │      │  end_read / write done
//!                            write         ▼      │
//!                                     Reading | Writing
//!
//!   any phase ──close()──► Closed   (terminal)
//! ```

use std::fmt;

/// Phase of one [`super::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPhase {
    /// Constructed around a stream, nothing exchanged yet.
    Idle,
    /// Outbound: carrier chosen and `prepare_send` done.
    Prepared,
    /// Outbound: header and sender specifier written.
    HeaderSent,
    /// Inbound: carrier sniffed from the first 8 bytes.
    HeaderExpected,
    /// Inbound: sender specifier read.
    SenderKnown,
    /// Handshake complete, ready for messages.
    Established,
    /// Between `begin_read` and `end_read`.
    Reading,
    /// Inside `write`.
    Writing,
    /// Terminal.
    Closed,
}

impl ProtocolPhase {
    /// Whether `self -> to` is allowed.
    pub fn can_transition(self, to: ProtocolPhase) -> bool {
        use ProtocolPhase::*;
        if to == Closed {
            return self != Closed;
        }
        matches!(
            (self, to),
            (Idle, Prepared)
                | (Idle, HeaderExpected)
                | (Prepared, HeaderSent)
                | (HeaderSent, Established)
                | (HeaderExpected, SenderKnown)
                | (SenderKnown, Established)
                | (Established, Reading)
                | (Established, Writing)
                | (Reading, Established)
                | (Writing, Established)
        )
    }

    /// Handshake finished and not closed.
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Established | Self::Reading | Self::Writing)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Prepared => "Prepared",
            Self::HeaderSent => "HeaderSent",
            Self::HeaderExpected => "HeaderExpected",
            Self::SenderKnown => "SenderKnown",
            Self::Established => "Established",
            Self::Reading => "Reading",
            Self::Writing => "Writing",
            Self::Closed => "Closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ProtocolPhase::*;
    use super::*;

    #[test]
    fn test_outbound_path() {
        assert!(Idle.can_transition(Prepared));
        assert!(Prepared.can_transition(HeaderSent));
        assert!(HeaderSent.can_transition(Established));
        assert!(Established.can_transition(Writing));
        assert!(Writing.can_transition(Established));
    }

    #[test]
    fn test_inbound_path() {
        assert!(Idle.can_transition(HeaderExpected));
        assert!(HeaderExpected.can_transition(SenderKnown));
        assert!(SenderKnown.can_transition(Established));
        assert!(Established.can_transition(Reading));
        assert!(Reading.can_transition(Established));
    }

    #[test]
    fn test_illegal_orderings() {
        assert!(!Idle.can_transition(Established));
        assert!(!Prepared.can_transition(Established));
        assert!(!HeaderExpected.can_transition(Established));
        assert!(!Reading.can_transition(Writing));
        assert!(!Established.can_transition(HeaderSent));
    }

    #[test]
    fn test_closed_is_terminal() {
        for phase in [Idle, Prepared, HeaderSent, HeaderExpected, SenderKnown, Established, Reading, Writing] {
            assert!(phase.can_transition(Closed));
            assert!(!Closed.can_transition(phase));
        }
        assert!(!Closed.can_transition(Closed));
        assert!(Closed.is_terminal());
        assert!(!Closed.is_operational());
    }
}

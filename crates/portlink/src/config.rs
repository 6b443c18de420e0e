// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection-level configuration.

use std::time::Duration;

/// Default upper bound for a single message payload (16 MiB).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Default upper bound for a sender specifier.
pub const DEFAULT_MAX_SPECIFIER_LEN: usize = 4096;

/// Configuration applied to every [`crate::Protocol`].
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Largest payload accepted from an index frame.
    pub max_message_len: usize,

    /// Largest sender specifier accepted during the handshake.
    pub max_specifier_len: usize,

    /// Read/write timeout applied at open (None = block forever).
    pub timeout: Option<Duration>,

    /// Disable Nagle on TCP connections.
    pub nodelay: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_specifier_len: DEFAULT_MAX_SPECIFIER_LEN,
            timeout: None,
            nodelay: true,
        }
    }
}

impl ProtocolConfig {
    /// Builder: set maximum payload length.
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Builder: set maximum sender specifier length.
    pub fn with_max_specifier_len(mut self, len: usize) -> Self {
        self.max_specifier_len = len;
        self
    }

    /// Builder: set the connection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builder: keep Nagle enabled.
    pub fn without_nodelay(mut self) -> Self {
        self.nodelay = false;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_message_len == 0 {
            return Err("max_message_len must be > 0");
        }
        if self.max_specifier_len == 0 {
            return Err("max_specifier_len must be > 0");
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err("timeout must be > 0 when set");
        }
        Ok(())
    }
}

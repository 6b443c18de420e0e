// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-way byte streams consumed by the protocol layer.
//!
//! A [`TwoWayStream`] is a bidirectional stream plus the few socket-level
//! controls a carrier needs: addresses, timeouts, packet boundaries and a
//! thread-safe [`StreamInterrupter`] used to cancel a blocked read from
//! another thread.
//!
//! # Implementations
//!
//! - [`SocketStream`] - TCP
//! - [`DatagramStream`] - UDP, one datagram per message
//! - `mock::MockStream` - in-memory pipe pair (tests only)

mod datagram;
mod tcp;

#[cfg(test)]
pub mod mock;

pub use datagram::{DatagramStream, MAX_DATAGRAM_LEN};
pub use tcp::{bind_listener, SocketStream};

use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Bidirectional stream owned by one connection.
pub trait TwoWayStream: Read + Write + Send {
    /// Local address, if the stream has one.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote address, if the stream has one.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Set read timeout.
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

    /// Set write timeout.
    fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

    /// Handle that can shut this stream down from another thread.
    fn interrupter(&self) -> io::Result<StreamInterrupter>;

    /// Stop reading; a blocked reader returns end-of-stream.
    fn shutdown_input(&mut self) -> io::Result<()>;

    /// Mark the start of a message. Datagram streams drop any unread
    /// remainder and pending output here.
    fn begin_packet(&mut self) {}

    /// Mark the end of a message.
    fn end_packet(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Close both directions.
    fn close(&mut self);

    /// False once closed or after a fatal error.
    fn is_ok(&self) -> bool;
}

/// Boxed two-way stream.
pub type BoxedStream = Box<dyn TwoWayStream>;

/// Thread-safe handle that shuts a stream down.
///
/// Calling [`StreamInterrupter::interrupt`] from any thread releases a
/// reader blocked on the stream.
#[derive(Clone)]
pub struct StreamInterrupter {
    inner: Arc<dyn Fn() + Send + Sync>,
}

impl StreamInterrupter {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// Interrupter that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn interrupt(&self) {
        (self.inner)();
    }
}

impl fmt::Debug for StreamInterrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamInterrupter")
    }
}

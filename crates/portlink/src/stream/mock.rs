// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory blocking stream pair for protocol tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{StreamInterrupter, TwoWayStream};

#[derive(Debug, Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    cond: Condvar,
}

impl Pipe {
    fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }
}

/// One end of an in-memory connection. Reads block until data arrives or
/// either side closes.
#[derive(Debug)]
pub struct MockStream {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    ok: bool,
}

impl MockStream {
    /// Create a connected pair.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let addr_a: SocketAddr = "127.0.0.1:10001".parse().expect("static addr");
        let addr_b: SocketAddr = "127.0.0.1:10002".parse().expect("static addr");

        let a = Self {
            incoming: Arc::clone(&b_to_a),
            outgoing: Arc::clone(&a_to_b),
            local_addr: addr_a,
            peer_addr: addr_b,
            ok: true,
        };
        let b = Self {
            incoming: a_to_b,
            outgoing: b_to_a,
            local_addr: addr_b,
            peer_addr: addr_a,
            ok: true,
        };
        (a, b)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.incoming.state.lock();
        while state.buf.is_empty() && !state.closed {
            self.incoming.cond.wait(&mut state);
        }
        if state.buf.is_empty() {
            self.ok = false;
            return Ok(0);
        }
        let n = state.buf.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.outgoing.state.lock();
        if state.closed {
            self.ok = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock pipe closed"));
        }
        state.buf.extend(buf.iter().copied());
        self.outgoing.cond.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TwoWayStream for MockStream {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    fn set_read_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn interrupter(&self) -> io::Result<StreamInterrupter> {
        let incoming = Arc::clone(&self.incoming);
        let outgoing = Arc::clone(&self.outgoing);
        Ok(StreamInterrupter::new(move || {
            incoming.close();
            outgoing.close();
        }))
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        self.incoming.close();
        Ok(())
    }

    fn close(&mut self) {
        self.incoming.close();
        self.outgoing.close();
        self.ok = false;
    }

    fn is_ok(&self) -> bool {
        self.ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_transfers_bytes() {
        let (mut a, mut b) = MockStream::pair();
        a.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_close_gives_eof() {
        let (mut a, mut b) = MockStream::pair();
        a.close();
        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).unwrap(), 0);
        assert!(b.write_all(b"x").is_err());
    }
}

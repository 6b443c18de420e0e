// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP two-way stream.
//!
//! Writes between `begin_packet` and `end_packet` are gathered and sent as a
//! single datagram. Reads consume one datagram at a time. A closed flag is
//! polled between short socket timeouts so another thread can release a
//! blocked reader.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use super::{StreamInterrupter, TwoWayStream};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SOCKET_BUFFER_SIZE: usize = 1024 * 1024;

/// [`TwoWayStream`] over a UDP socket talking to a single peer.
#[derive(Debug)]
pub struct DatagramStream {
    socket: UdpSocket,
    peer: SocketAddr,
    read_buf: Vec<u8>,
    read_pos: usize,
    write_buf: Vec<u8>,
    read_timeout: Mutex<Option<Duration>>,
    closed: Arc<AtomicBool>,
}

impl DatagramStream {
    /// Bind `local` and exchange datagrams with `peer`.
    pub fn open(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
            log::debug!("[datagram] recv buffer size not applied: {}", e);
        }
        socket.bind(&local.into())?;
        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        log::debug!(
            "[datagram] open local={} peer={}",
            socket.local_addr()?,
            peer
        );

        Ok(Self {
            socket,
            peer,
            read_buf: Vec::new(),
            read_pos: 0,
            write_buf: Vec::new(),
            read_timeout: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn fill(&mut self) -> io::Result<bool> {
        let started = Instant::now();
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            if self.is_closed() {
                return Ok(false);
            }
            match self.socket.recv_from(&mut buf) {
                Ok((n, _from)) => {
                    buf.truncate(n);
                    self.read_buf = buf;
                    self.read_pos = 0;
                    return Ok(true);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    if let Some(limit) = *self.read_timeout.lock() {
                        if started.elapsed() >= limit {
                            return Err(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "datagram read timed out",
                            ));
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl Read for DatagramStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read_pos >= self.read_buf.len() && !self.fill()? {
            return Ok(0);
        }
        let available = &self.read_buf[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for DatagramStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "datagram stream closed"));
        }
        if self.write_buf.len() + buf.len() > MAX_DATAGRAM_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message exceeds datagram size",
            ));
        }
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let sent = self.socket.send_to(&self.write_buf, self.peer)?;
        if sent != self.write_buf.len() {
            log::warn!(
                "[datagram] short send: {} of {} bytes",
                sent,
                self.write_buf.len()
            );
        }
        self.write_buf.clear();
        Ok(())
    }
}

impl TwoWayStream for DatagramStream {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        // Socket timeout stays at the poll interval; the limit is enforced in fill().
        *self.read_timeout.lock() = dur;
        Ok(())
    }

    fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.socket.set_write_timeout(dur)
    }

    fn interrupter(&self) -> io::Result<StreamInterrupter> {
        let closed = Arc::clone(&self.closed);
        Ok(StreamInterrupter::new(move || {
            closed.store(true, Ordering::Release);
        }))
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn begin_packet(&mut self) {
        self.read_buf.clear();
        self.read_pos = 0;
        self.write_buf.clear();
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_ok(&self) -> bool {
        !self.is_closed()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP two-way stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{StreamInterrupter, TwoWayStream};

/// Non-blocking listener on `addr` with `SO_REUSEADDR`, for accept loops
/// that poll a shutdown flag.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// [`TwoWayStream`] over a connected `TcpStream`.
#[derive(Debug)]
pub struct SocketStream {
    stream: TcpStream,
    ok: bool,
}

impl SocketStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, ok: true }
    }

    /// Connect to `addr`, optionally bounded by `timeout`.
    pub fn connect(addr: &str, timeout: Option<Duration>) -> io::Result<Self> {
        let stream = match timeout {
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for sock_addr in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&sock_addr, timeout) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(s) => s,
                    None => {
                        return Err(last_err.unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::NotFound, "no address resolved")
                        }))
                    }
                }
            }
            None => TcpStream::connect(addr)?,
        };
        Ok(Self::new(stream))
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if !matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ) {
                self.ok = false;
            }
        }
        result
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.stream.read(buf);
        if matches!(result, Ok(0)) && !buf.is_empty() {
            self.ok = false;
        }
        self.track(result)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.stream.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.stream.flush();
        self.track(result)
    }
}

impl TwoWayStream for SocketStream {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(dur)
    }

    fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(dur)
    }

    fn interrupter(&self) -> io::Result<StreamInterrupter> {
        let handle = self.stream.try_clone()?;
        Ok(StreamInterrupter::new(move || {
            let _ = handle.shutdown(Shutdown::Both);
        }))
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Read)
    }

    fn close(&mut self) {
        if self.ok {
            let _ = self.stream.flush();
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.ok = false;
    }

    fn is_ok(&self) -> bool {
        self.ok
    }
}

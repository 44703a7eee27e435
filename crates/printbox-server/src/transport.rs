// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport seam between the scheduler and the network stack.
//
// The scheduler only ever needs four things from a connection: how many
// bytes are waiting, one byte at a time, a batched write, and whether the
// peer is still there.  Listeners are polled, never awaited: `accept`
// returns immediately when nothing is pending so one tick can visit every
// listener without stalling the clients already being served.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use printbox_core::error::{PrintboxError, Result};

/// Upper bound on bytes pulled off a socket ahead of the reader.
///
/// Large enough for the longest single IPP attribute value (u16 length).
const RX_WINDOW: usize = 64 * 1024;

/// How long a single batched write may wait on a full socket buffer.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted client connection.
pub trait Connection {
    /// Number of bytes that can be read right now without blocking.
    fn available(&mut self) -> usize;

    /// Take one byte, or `None` if nothing is buffered.
    fn read_byte(&mut self) -> Option<u8>;

    /// Send `data` in one batch.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// True while the peer is connected or unread bytes remain.
    fn connected(&mut self) -> bool;

    /// Tear the connection down.  Only ever called once per connection.
    fn close(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// A non-blocking listening socket.
pub trait Listener {
    type Conn: Connection;

    /// Accept a pending connection, or return `None` immediately.
    fn accept(&mut self) -> Option<Self::Conn>;

    fn local_port(&self) -> u16;
}

// ---------------------------------------------------------------------------
// std::net implementation
// ---------------------------------------------------------------------------

/// Non-blocking TCP listener bound to all interfaces.
pub struct StdListener {
    inner: TcpListener,
    port: u16,
}

impl StdListener {
    /// Bind `0.0.0.0:{port}` in non-blocking mode.
    pub fn bind(port: u16) -> Result<Self> {
        let bind_addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let inner =
            TcpListener::bind(bind_addr).map_err(|source| PrintboxError::Bind { port, source })?;
        inner
            .set_nonblocking(true)
            .map_err(|source| PrintboxError::Bind { port, source })?;
        // Port 0 asks the OS for an ephemeral port; report the real one.
        let port = inner.local_addr().map(|a| a.port()).unwrap_or(port);
        Ok(Self { inner, port })
    }
}

impl Listener for StdListener {
    type Conn = StdConnection;

    fn accept(&mut self) -> Option<StdConnection> {
        match self.inner.accept() {
            Ok((stream, peer)) => match StdConnection::new(stream, peer) {
                Ok(conn) => Some(conn),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "failed to configure accepted socket");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!(port = self.port, error = %e, "accept failed");
                None
            }
        }
    }

    fn local_port(&self) -> u16 {
        self.port
    }
}

/// Non-blocking TCP connection with a small receive window.
pub struct StdConnection {
    stream: TcpStream,
    peer: SocketAddr,
    rx: VecDeque<u8>,
    peer_closed: bool,
    closed: bool,
}

impl StdConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer,
            rx: VecDeque::new(),
            peer_closed: false,
            closed: false,
        })
    }

    /// Pull whatever the kernel has buffered, up to the receive window.
    fn fill(&mut self) {
        if self.closed || self.peer_closed {
            return;
        }
        let mut chunk = [0u8; 512];
        while self.rx.len() < RX_WINDOW {
            let room = (RX_WINDOW - self.rx.len()).min(chunk.len());
            match self.stream.read(&mut chunk[..room]) {
                Ok(0) => {
                    debug!(peer = %self.peer, "peer closed connection");
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => self.rx.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "read failed, treating as closed");
                    self.peer_closed = true;
                    break;
                }
            }
        }
    }
}

impl Connection for StdConnection {
    fn available(&mut self) -> usize {
        self.fill();
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.fill();
        }
        self.rx.pop_front()
    }

    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        let deadline = Instant::now() + WRITE_TIMEOUT;
        while !data.is_empty() {
            match self.stream.write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::ErrorKind::TimedOut.into());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn connected(&mut self) -> bool {
        self.fill();
        !self.closed && (!self.peer_closed || !self.rx.is_empty())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.clear();
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(peer = %self.peer, error = %e, "shutdown on closed socket");
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

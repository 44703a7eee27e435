// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Byte stream over one client connection.
//
// Reads block, but only for a bounded time: every availability wait polls the
// transport at a short interval and gives up once the configured timeout has
// elapsed since that wait began.  Giving up sets a monotonic failed flag.
// From then on reads return 0 (or an empty result), writes are dropped, and
// `has_more_data` is false, which is the only signal the scheduler needs to
// reap the slot.
//
// Writes go to a fixed-capacity buffer and are sent in one transport call
// when it fills, on `flush`, or when the stream is dropped.  Dropping also
// closes the connection, exactly once, whichever way the stream ends.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use printbox_core::config::ServerConfig;

use crate::slots::JobSource;
use crate::transport::Connection;

/// Timing and buffering parameters shared by every client stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Absolute bound on one availability wait.
    pub read_timeout: Duration,
    /// Interval between availability checks while waiting.
    pub poll_interval: Duration,
    /// Output buffer capacity.
    pub send_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for StreamConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            poll_interval: config.poll_interval(),
            send_buffer_size: config.send_buffer_size.max(1),
        }
    }
}

/// Sole owner of one accepted connection.
pub struct ByteStream<C: Connection> {
    conn: C,
    failed: bool,
    closed: bool,
    send_buffer: Box<[u8]>,
    send_len: usize,
    config: StreamConfig,
}

impl<C: Connection> ByteStream<C> {
    pub fn new(conn: C, config: StreamConfig) -> Self {
        Self {
            conn,
            failed: false,
            closed: false,
            send_buffer: vec![0u8; config.send_buffer_size.max(1)].into_boxed_slice(),
            send_len: 0,
            config,
        }
    }

    /// True once a wait has timed out or a write has failed.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.conn.peer_addr()
    }

    /// Bytes currently waiting in the output buffer.
    pub fn pending_output(&self) -> usize {
        self.send_len
    }

    /// Wait until at least `count` bytes are readable.
    ///
    /// Returns false (and marks the stream failed) on timeout.
    fn wait_available(&mut self, count: usize) -> bool {
        if self.failed {
            return false;
        }
        let start = Instant::now();
        while self.conn.available() < count {
            std::thread::sleep(self.config.poll_interval);
            if start.elapsed() > self.config.read_timeout {
                self.handle_timeout(count);
                return false;
            }
        }
        true
    }

    fn handle_timeout(&mut self, wanted: usize) {
        warn!(
            peer = ?self.conn.peer_addr(),
            wanted,
            timeout_ms = self.config.read_timeout.as_millis() as u64,
            "connection timed out"
        );
        self.failed = true;
        self.close_once();
    }

    fn close_once(&mut self) {
        if !self.closed {
            self.closed = true;
            self.conn.close();
        }
    }

    // -- Reads ---------------------------------------------------------------

    /// Read one byte, waiting at most the configured timeout.
    ///
    /// Returns 0 on timeout and for every read after it.
    pub fn read(&mut self) -> u8 {
        if !self.wait_available(1) {
            return 0;
        }
        match self.conn.read_byte() {
            Some(byte) => byte,
            None => {
                // Transport claimed data it could not deliver.
                self.failed = true;
                self.close_once();
                0
            }
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read()
    }

    /// Big-endian u16; waits for both bytes before consuming either.
    pub fn read_u16(&mut self) -> u16 {
        if !self.wait_available(2) {
            return 0;
        }
        let hi = self.read() as u16;
        let lo = self.read() as u16;
        (hi << 8) | lo
    }

    /// Big-endian u32; waits for all four bytes before consuming any.
    pub fn read_u32(&mut self) -> u32 {
        if !self.wait_available(4) {
            return 0;
        }
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.read() as u32;
        }
        value
    }

    /// Read up to (excluding) `delimiter`.  Empty on failure.
    pub fn read_until(&mut self, delimiter: u8) -> Vec<u8> {
        if self.failed {
            return Vec::new();
        }
        let mut result = Vec::with_capacity(16);
        loop {
            let byte = self.read();
            if self.failed {
                return Vec::new();
            }
            if byte == delimiter {
                return result;
            }
            result.push(byte);
        }
    }

    /// [`read_until`](Self::read_until) decoded as (lossy) UTF-8.
    pub fn read_line_until(&mut self, delimiter: u8) -> String {
        String::from_utf8_lossy(&self.read_until(delimiter)).into_owned()
    }

    /// Read exactly `len` bytes once they are all available.  Empty on timeout.
    pub fn read_exact_len(&mut self, len: usize) -> Vec<u8> {
        if !self.wait_available(len) {
            return Vec::new();
        }
        let mut result = Vec::with_capacity(len);
        for _ in 0..len {
            result.push(self.read());
        }
        if self.failed { Vec::new() } else { result }
    }

    /// True while not failed and the peer is still connected.
    pub fn has_more_data(&mut self) -> bool {
        !self.failed && self.conn.connected()
    }

    /// True while not failed and at least one byte can be read without
    /// waiting.
    pub fn data_available(&mut self) -> bool {
        !self.failed && self.conn.available() > 0
    }

    /// Bytes readable right now, without waiting.
    pub fn available_now(&mut self) -> usize {
        if self.failed { 0 } else { self.conn.available() }
    }

    // -- Writes --------------------------------------------------------------

    /// Append one byte, flushing when the buffer fills.
    pub fn write(&mut self, byte: u8) {
        if self.failed {
            return;
        }
        self.send_buffer[self.send_len] = byte;
        self.send_len += 1;
        if self.send_len == self.send_buffer.len() {
            self.flush();
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        for byte in value.to_be_bytes() {
            self.write(byte);
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        for byte in value.to_be_bytes() {
            self.write(byte);
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.write(byte);
        }
    }

    pub fn print(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Send everything buffered in one transport call.
    pub fn flush(&mut self) {
        if self.failed || self.send_len == 0 {
            return;
        }
        let result = self.conn.write_all(&self.send_buffer[..self.send_len]);
        self.send_len = 0;
        if let Err(e) = result {
            warn!(peer = ?self.conn.peer_addr(), error = %e, "send failed");
            self.failed = true;
            self.close_once();
        }
    }
}

/// Raw socket jobs have no end-of-job marker, so they never finish cleanly.
impl<C: Connection> JobSource for ByteStream<C> {
    fn has_more_data(&mut self) -> bool {
        ByteStream::has_more_data(self)
    }

    fn data_available(&mut self) -> bool {
        ByteStream::data_available(self)
    }

    fn read(&mut self) -> u8 {
        ByteStream::read(self)
    }
}

impl<C: Connection> Drop for ByteStream<C> {
    fn drop(&mut self) {
        self.flush();
        if !self.closed {
            info!(peer = ?self.conn.peer_addr(), "closing connection");
        } else {
            debug!(peer = ?self.conn.peer_addr(), "connection already closed");
        }
        self.close_once();
    }
}

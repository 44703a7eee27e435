// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory connections, listeners, printers and network manager shared by
// the unit tests.  Every handle is a cheap clone over shared state so a test
// can keep one copy while the server owns another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use printbox_core::types::{Encryption, NetworkInfo};

use crate::printer::Printer;
use crate::stream::StreamConfig;
use crate::transport::{Connection, Listener};
use crate::wifi::NetworkManager;

/// Short timeouts so failure paths finish quickly.
pub fn fast_stream_config() -> StreamConfig {
    StreamConfig {
        read_timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(1),
        send_buffer_size: 256,
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireEvent {
    Write,
    Close,
}

#[derive(Default)]
struct ConnectionState {
    inbound: VecDeque<u8>,
    hung_up: bool,
    written: Vec<u8>,
    fail_writes: bool,
    wire: Vec<WireEvent>,
}

#[derive(Clone, Default)]
pub struct MockConnection {
    state: Rc<RefCell<ConnectionState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: &[u8]) -> Self {
        let conn = Self::new();
        conn.push_input(bytes);
        conn
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.state.borrow_mut().inbound.extend(bytes);
    }

    /// Peer closes its side; unread bytes stay readable.
    pub fn hang_up(&self) {
        self.state.borrow_mut().hung_up = true;
    }

    pub fn fail_writes(&self) {
        self.state.borrow_mut().fail_writes = true;
    }

    pub fn unread(&self) -> Vec<u8> {
        self.state.borrow().inbound.iter().copied().collect()
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().written).into_owned()
    }

    pub fn write_calls(&self) -> usize {
        self.state.borrow().wire.iter().filter(|e| **e == WireEvent::Write).count()
    }

    pub fn close_calls(&self) -> usize {
        self.state.borrow().wire.iter().filter(|e| **e == WireEvent::Close).count()
    }

    /// No write happened after the connection was closed.
    pub fn flushed_before_close(&self) -> bool {
        let state = self.state.borrow();
        match state.wire.iter().position(|e| *e == WireEvent::Close) {
            Some(pos) => !state.wire[pos..].contains(&WireEvent::Write),
            None => false,
        }
    }
}

impl Connection for MockConnection {
    fn available(&mut self) -> usize {
        self.state.borrow().inbound.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.state.borrow_mut().inbound.pop_front()
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.wire.push(WireEvent::Write);
        if state.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn connected(&mut self) -> bool {
        let state = self.state.borrow();
        let closed = state.wire.contains(&WireEvent::Close);
        !closed && (!state.hung_up || !state.inbound.is_empty())
    }

    fn close(&mut self) {
        self.state.borrow_mut().wire.push(WireEvent::Close);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        "192.0.2.10:40000".parse().ok()
    }
}

/// Listener handing out queued mock connections.
#[derive(Clone, Default)]
pub struct MockListener {
    pending: Rc<RefCell<VecDeque<MockConnection>>>,
    accepts: Rc<RefCell<usize>>,
    port: u16,
}

impl MockListener {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Queue a client carrying `input`; returns a handle to inspect it.
    pub fn connect(&self, input: &[u8]) -> MockConnection {
        let conn = MockConnection::with_input(input);
        self.pending.borrow_mut().push_back(conn.clone());
        conn
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Connections actually taken off the listener.
    pub fn accepted(&self) -> usize {
        *self.accepts.borrow()
    }
}

impl Listener for MockListener {
    type Conn = MockConnection;

    fn accept(&mut self) -> Option<MockConnection> {
        let conn = self.pending.borrow_mut().pop_front()?;
        *self.accepts.borrow_mut() += 1;
        Some(conn)
    }

    fn local_port(&self) -> u16 {
        self.port
    }
}

// ---------------------------------------------------------------------------
// Printers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterEvent {
    Start(usize),
    Print(usize, u8),
    End(usize, bool),
}

struct PrinterState {
    events: Vec<PrinterEvent>,
    ready: bool,
    can_print_calls: usize,
}

/// Inspection handle for a [`RecordingPrinter`].
#[derive(Clone)]
pub struct PrinterLog {
    state: Rc<RefCell<PrinterState>>,
}

impl PrinterLog {
    pub fn events(&self) -> Vec<PrinterEvent> {
        self.state.borrow().events.clone()
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.borrow_mut().ready = ready;
    }

    pub fn can_print_calls(&self) -> usize {
        self.state.borrow().can_print_calls
    }

    /// Bytes printed on behalf of `slot`, in order.
    pub fn printed(&self, slot: usize) -> Vec<u8> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                PrinterEvent::Print(s, b) if *s == slot => Some(*b),
                _ => None,
            })
            .collect()
    }
}

/// Printer that records every call and accepts any slot while ready.
pub struct RecordingPrinter {
    name: String,
    state: Rc<RefCell<PrinterState>>,
}

impl RecordingPrinter {
    pub fn new(name: &str) -> (Self, PrinterLog) {
        let state = Rc::new(RefCell::new(PrinterState {
            events: Vec::new(),
            ready: true,
            can_print_calls: 0,
        }));
        (
            Self {
                name: name.to_string(),
                state: Rc::clone(&state),
            },
            PrinterLog { state },
        )
    }
}

impl Printer for RecordingPrinter {
    fn start_job(&mut self, slot: usize) {
        self.state.borrow_mut().events.push(PrinterEvent::Start(slot));
    }

    fn can_print(&mut self, _slot: usize) -> bool {
        let mut state = self.state.borrow_mut();
        state.can_print_calls += 1;
        state.ready
    }

    fn print_byte(&mut self, slot: usize, byte: u8) {
        self.state.borrow_mut().events.push(PrinterEvent::Print(slot, byte));
    }

    fn end_job(&mut self, slot: usize, success: bool) {
        self.state.borrow_mut().events.push(PrinterEvent::End(slot, success));
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> String {
        format!("recording printer {}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Network manager
// ---------------------------------------------------------------------------

/// A connect request as seen by the network manager, together with what the
/// HTTP client had received at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectCall {
    pub ssid: String,
    pub password: String,
    pub client_saw: String,
}

#[derive(Clone, Default)]
pub struct MockNetwork {
    calls: Rc<RefCell<Vec<ConnectCall>>>,
    watched: Rc<RefCell<Option<MockConnection>>>,
}

impl MockNetwork {
    /// Snapshot this connection's output whenever `connect` is called.
    pub fn watch(&self, conn: &MockConnection) {
        *self.watched.borrow_mut() = Some(conn.clone());
    }

    pub fn calls(&self) -> Vec<ConnectCall> {
        self.calls.borrow().clone()
    }
}

impl NetworkManager for MockNetwork {
    fn status(&self) -> String {
        "connected to lab (192.0.2.1)".into()
    }

    fn address(&self) -> String {
        "192.0.2.1".into()
    }

    fn scan(&mut self) -> Vec<NetworkInfo> {
        vec![
            NetworkInfo {
                ssid: "lab".into(),
                encryption: Encryption::Wpa2,
                rssi: -48,
            },
            NetworkInfo {
                ssid: "<guest>".into(),
                encryption: Encryption::Open,
                rssi: -80,
            },
        ]
    }

    fn connect(&mut self, ssid: &str, password: &str) {
        let client_saw = self
            .watched
            .borrow()
            .as_ref()
            .map(MockConnection::written_text)
            .unwrap_or_default();
        self.calls.borrow_mut().push(ConnectCall {
            ssid: ssid.into(),
            password: password.into(),
            client_saw,
        });
    }
}

// ---------------------------------------------------------------------------
// IPP request builder
// ---------------------------------------------------------------------------

pub const TAG_OPERATION: u8 = 0x01;
pub const TAG_END: u8 = 0x03;
pub const VALUE_CHARSET: u8 = 0x47;
pub const VALUE_LANGUAGE: u8 = 0x48;
pub const VALUE_URI: u8 = 0x45;
pub const VALUE_NAME: u8 = 0x42;

fn write_attr(buf: &mut Vec<u8>, tag: u8, name: &str, value: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}

/// Binary IPP message addressed to `printer_uri`, followed by `document`.
pub fn ipp_body(operation: u16, request_id: u32, printer_uri: &str, document: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x01, 0x01];
    buf.extend_from_slice(&operation.to_be_bytes());
    buf.extend_from_slice(&request_id.to_be_bytes());
    buf.push(TAG_OPERATION);
    write_attr(&mut buf, VALUE_CHARSET, "attributes-charset", b"utf-8");
    write_attr(&mut buf, VALUE_LANGUAGE, "attributes-natural-language", b"en");
    write_attr(&mut buf, VALUE_URI, "printer-uri", printer_uri.as_bytes());
    write_attr(&mut buf, VALUE_NAME, "job-name", b"test page");
    buf.push(TAG_END);
    buf.extend_from_slice(document);
    buf
}

/// `body` wrapped in an HTTP POST with a Content-Length header.
pub fn http_post(path: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {path} HTTP/1.1\r\nHost: printbox\r\n\
         Content-Type: application/ipp\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

/// `body` wrapped in an HTTP POST using chunked transfer encoding, split
/// into chunks of `chunk` bytes.
pub fn http_post_chunked(path: &str, body: &[u8], chunk: usize) -> Vec<u8> {
    let mut request = format!(
        "POST {path} HTTP/1.1\r\nHost: printbox\r\n\
         Content-Type: application/ipp\r\nTransfer-Encoding: chunked\r\n\r\n"
    )
    .into_bytes();
    for part in body.chunks(chunk) {
        request.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        request.extend_from_slice(part);
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"0\r\n\r\n");
    request
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The print server: three polled listeners feeding a fixed slot table.
//
// Everything runs on the caller's thread.  One `tick` services every
// occupied slot once (at most one byte each, in index order), then polls the
// raw socket, IPP and HTTP listeners in that order, admitting at most one
// connection from each.  Nothing in a tick returns an error; only `start`
// can fail.

use tracing::{debug, info, warn};

use printbox_core::config::ServerConfig;
use printbox_core::error::{PrintboxError, Result};
use printbox_core::types::{ServerStatus, SlotUsage};

use crate::http::HttpRequest;
use crate::ipp::{self, IppStream, STATUS_SERVER_ERROR_BUSY};
use crate::printer::PrinterRegistry;
use crate::slots::{JobSource, ServiceOutcome, SlotTable};
use crate::stream::{ByteStream, StreamConfig};
use crate::transport::{Connection, Listener};
use crate::web::{self, WebContext};
use crate::wifi::NetworkManager;

/// Client slots when no capacity is given.
pub const DEFAULT_MAX_CLIENTS: usize = 4;

/// What an admitted client sends job bytes through.
pub enum ClientStream<C: Connection> {
    /// Raw socket: every byte is job data.
    Raw(ByteStream<C>),
    /// IPP: only the document part of the HTTP body.
    Ipp(IppStream<C>),
}

impl<C: Connection> JobSource for ClientStream<C> {
    fn has_more_data(&mut self) -> bool {
        match self {
            Self::Raw(s) => JobSource::has_more_data(s),
            Self::Ipp(s) => s.has_more_data(),
        }
    }

    fn data_available(&mut self) -> bool {
        match self {
            Self::Raw(s) => JobSource::data_available(s),
            Self::Ipp(s) => s.data_available(),
        }
    }

    fn read(&mut self) -> u8 {
        match self {
            Self::Raw(s) => JobSource::read(s),
            Self::Ipp(s) => s.read(),
        }
    }

    fn finished_cleanly(&self) -> bool {
        match self {
            Self::Raw(s) => s.finished_cleanly(),
            Self::Ipp(s) => s.finished_cleanly(),
        }
    }
}

struct Listeners<L> {
    socket: L,
    ipp: L,
    http: L,
}

/// Work done by one [`PrintServer::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Bytes moved from clients to printers.
    pub forwarded: usize,
    /// Slots freed because their stream ended.
    pub reaped: usize,
    /// Clients given a slot (raw or IPP).
    pub admitted: usize,
    /// Web requests answered.
    pub web_requests: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub struct PrintServer<L: Listener, const MAX_CLIENTS: usize = DEFAULT_MAX_CLIENTS> {
    config: ServerConfig,
    stream_config: StreamConfig,
    slots: SlotTable<ClientStream<L::Conn>, MAX_CLIENTS>,
    printers: PrinterRegistry,
    network: Box<dyn NetworkManager>,
    listeners: Option<Listeners<L>>,
    next_job_id: i32,
}

impl<L: Listener, const MAX_CLIENTS: usize> PrintServer<L, MAX_CLIENTS> {
    /// Create a stopped server.  Call [`start`](Self::start) to bind.
    pub fn new(
        config: ServerConfig,
        printers: PrinterRegistry,
        network: Box<dyn NetworkManager>,
    ) -> Self {
        Self {
            stream_config: StreamConfig::from(&config),
            config,
            slots: SlotTable::new(),
            printers,
            network,
            listeners: None,
            next_job_id: 1,
        }
    }

    /// Create a running server around listeners that are already bound.
    pub fn with_listeners(
        config: ServerConfig,
        printers: PrinterRegistry,
        network: Box<dyn NetworkManager>,
        socket: L,
        ipp: L,
        http: L,
    ) -> Self {
        let mut server = Self::new(config, printers, network);
        server.listeners = Some(Listeners { socket, ipp, http });
        server
    }

    /// Bind the socket, IPP and HTTP listeners, in that order, through
    /// `bind(port)`.
    pub fn start(&mut self, mut bind: impl FnMut(u16) -> Result<L>) -> Result<()> {
        if self.listeners.is_some() {
            return Err(PrintboxError::AlreadyStarted);
        }
        let socket = bind(self.config.socket_port)?;
        let ipp = bind(self.config.ipp_port)?;
        let http = bind(self.config.http_port)?;
        info!(
            socket_port = socket.local_port(),
            ipp_port = ipp.local_port(),
            http_port = http.local_port(),
            max_clients = MAX_CLIENTS,
            printers = self.printers.len(),
            "print server started"
        );
        self.listeners = Some(Listeners { socket, ipp, http });
        Ok(())
    }

    pub fn status(&self) -> ServerStatus {
        if self.listeners.is_some() {
            ServerStatus::Running
        } else {
            ServerStatus::Stopped
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn printers(&self) -> &PrinterRegistry {
        &self.printers
    }

    pub fn usage(&self) -> SlotUsage {
        self.slots.usage()
    }

    /// Lowest empty slot index, or `None` at capacity.
    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.find_free_slot()
    }

    /// Bound ports as (socket, ipp, http), once started.
    pub fn ports(&self) -> Option<(u16, u16, u16)> {
        self.listeners.as_ref().map(|l| {
            (
                l.socket.local_port(),
                l.ipp.local_port(),
                l.http.local_port(),
            )
        })
    }

    pub fn log_slot_usage(&self) {
        let usage = self.usage();
        info!(used = usage.used, capacity = usage.capacity, "server slots: {usage}");
    }

    /// Move at most one byte for slot `index`, or reap it.
    pub fn service_slot(&mut self, index: usize) -> ServiceOutcome {
        self.slots.service(index, &mut self.printers)
    }

    /// Put a client into a free slot and open its job.
    fn register(&mut self, index: usize, stream: ClientStream<L::Conn>, printer: usize) -> bool {
        if self.slots.insert(index, stream, printer).is_err() {
            warn!(slot = index, "slot unexpectedly occupied; dropping client");
            return false;
        }
        if let Some(target) = self.printers.get_mut(printer) {
            target.start_job(index);
        }
        true
    }

    /// Accept one raw socket client if a slot is free.  At capacity the
    /// connection is left in the listener backlog.
    pub fn admit_socket_client(&mut self) -> bool {
        let Some(index) = self.slots.find_free_slot() else {
            return false;
        };
        let Some(listeners) = self.listeners.as_mut() else {
            return false;
        };
        let Some(conn) = listeners.socket.accept() else {
            return false;
        };
        let stream = ByteStream::new(conn, self.stream_config);
        if self.printers.is_empty() {
            warn!(peer = ?stream.peer_addr(), "no printers configured; dropping socket client");
            return false;
        }
        info!(peer = ?stream.peer_addr(), slot = index, "socket client connected");
        self.register(index, ClientStream::Raw(stream), 0)
    }

    /// Accept one IPP client and parse its request.  Only a Print-Job for a
    /// known printer that finds a free slot is kept; every other connection
    /// is answered (where possible) and dropped.
    pub fn admit_ipp_client(&mut self) -> bool {
        let Some(listeners) = self.listeners.as_mut() else {
            return false;
        };
        let Some(conn) = listeners.ipp.accept() else {
            return false;
        };
        let peer = conn.peer_addr();
        let mut stream = match IppStream::open(ByteStream::new(conn, self.stream_config)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = ?peer, error = %e, "unreadable IPP request");
                return false;
            }
        };
        let Some(job) = ipp::parse_request(&mut stream, &self.printers) else {
            return false;
        };

        let Some(index) = self.slots.find_free_slot() else {
            warn!(peer = ?peer, printer = job.printer, "all client slots busy; discarding IPP job");
            stream.respond(&ipp::error_response(
                STATUS_SERVER_ERROR_BUSY,
                job.request_id,
                "all client slots are busy",
            ));
            return false;
        };

        let job_id = self.next_job_id;
        self.next_job_id = self.next_job_id.checked_add(1).unwrap_or(1);
        stream.respond(&ipp::print_job_response(
            job.request_id,
            job_id,
            &job.printer_uri,
        ));
        info!(
            peer = ?peer,
            slot = index,
            printer = job.printer,
            job_id,
            job_name = job.job_name.as_deref().unwrap_or(""),
            user = job.user.as_deref().unwrap_or(""),
            "Print-Job accepted"
        );
        self.register(index, ClientStream::Ipp(stream), job.printer)
    }

    /// Accept one web client and answer it completely.
    pub fn admit_web_client(&mut self) -> bool {
        let Some(listeners) = self.listeners.as_mut() else {
            return false;
        };
        let Some(conn) = listeners.http.accept() else {
            return false;
        };
        let socket_port = listeners.socket.local_port();
        let ipp_port = listeners.ipp.local_port();
        let peer = conn.peer_addr();
        let request = match HttpRequest::parse(ByteStream::new(conn, self.stream_config)) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = ?peer, error = %e, "unreadable HTTP request");
                return false;
            }
        };
        let host = match &self.config.hostname {
            Some(host) => host.clone(),
            None => self.network.address(),
        };
        let mut ctx = WebContext {
            printers: &self.printers,
            network: &mut *self.network,
            host,
            ipp_port,
            socket_port,
        };
        web::serve(request, &mut ctx);
        true
    }

    /// One scheduling round: service slots, then admit new clients.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for index in 0..MAX_CLIENTS {
            match self.service_slot(index) {
                ServiceOutcome::Forwarded => report.forwarded += 1,
                ServiceOutcome::Reaped => report.reaped += 1,
                ServiceOutcome::Empty | ServiceOutcome::Idle => {}
            }
        }
        if self.admit_socket_client() {
            report.admitted += 1;
        }
        if self.admit_ipp_client() {
            report.admitted += 1;
        }
        if self.admit_web_client() {
            report.web_requests += 1;
        }
        report
    }
}

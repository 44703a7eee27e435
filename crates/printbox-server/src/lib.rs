// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printbox server: a single-threaded print server that multiplexes raw
// socket, IPP and HTTP clients over a fixed table of client slots.  Job bytes
// are forwarded one per slot per tick to the printer each client targets.

pub mod http;
pub mod ipp;
pub mod printer;
pub mod server;
pub mod slots;
pub mod stream;
pub mod transport;
pub mod web;
pub mod wifi;

#[cfg(test)]
mod testing;

pub use printer::{Printer, PrinterRegistry};
pub use server::{DEFAULT_MAX_CLIENTS, PrintServer, TickReport};
pub use stream::{ByteStream, StreamConfig};
pub use transport::{Connection, Listener, StdConnection, StdListener};
pub use wifi::NetworkManager;

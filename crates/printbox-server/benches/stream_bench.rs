// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the byte stream hot paths, IPP request parsing and
// IPP response building in the printbox-server crate.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use printbox_server::ipp::{
    IppResponseBuilder, IppStream, STATUS_OK, TAG_OPERATION_ATTRIBUTES, TAG_PRINTER_ATTRIBUTES,
    parse_request,
};
use printbox_server::slots::JobSource;
use printbox_server::{ByteStream, Connection, Printer, PrinterRegistry, StreamConfig};

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// Connection over a preloaded input buffer that discards output.
struct MemoryConnection {
    input: VecDeque<u8>,
    sent: usize,
}

impl MemoryConnection {
    fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            sent: 0,
        }
    }
}

impl Connection for MemoryConnection {
    fn available(&mut self) -> usize {
        self.input.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent += data.len();
        Ok(())
    }

    fn connected(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn close(&mut self) {}

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

struct NullPrinter;

impl Printer for NullPrinter {
    fn start_job(&mut self, _slot: usize) {}

    fn can_print(&mut self, _slot: usize) -> bool {
        true
    }

    fn print_byte(&mut self, _slot: usize, byte: u8) {
        black_box(byte);
    }

    fn end_job(&mut self, _slot: usize, _success: bool) {}

    fn name(&self) -> &str {
        "bench"
    }

    fn info(&self) -> String {
        "null printer".into()
    }
}

fn config() -> StreamConfig {
    StreamConfig {
        read_timeout: Duration::from_millis(5),
        poll_interval: Duration::from_millis(1),
        send_buffer_size: 1024,
    }
}

/// Print-Job for printer "bench" carrying `document`, wrapped in HTTP.
fn print_job_request(document: &[u8]) -> Vec<u8> {
    let mut ipp = vec![0x01, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01];
    ipp.push(TAG_OPERATION_ATTRIBUTES);
    for (tag, name, value) in [
        (0x47u8, "attributes-charset", "utf-8"),
        (0x48, "attributes-natural-language", "en"),
        (0x45, "printer-uri", "ipp://localhost:631/bench"),
    ] {
        ipp.push(tag);
        ipp.extend_from_slice(&(name.len() as u16).to_be_bytes());
        ipp.extend_from_slice(name.as_bytes());
        ipp.extend_from_slice(&(value.len() as u16).to_be_bytes());
        ipp.extend_from_slice(value.as_bytes());
    }
    ipp.push(0x03);
    ipp.extend_from_slice(document);

    let mut request = format!(
        "POST /bench HTTP/1.1\r\nContent-Type: application/ipp\r\nContent-Length: {}\r\n\r\n",
        ipp.len()
    )
    .into_bytes();
    request.extend_from_slice(&ipp);
    request
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Byte-at-a-time reads, the path every forwarded job byte takes.
fn bench_stream_reads(c: &mut Criterion) {
    let data = vec![0x5Au8; 64 * 1024];

    c.bench_function("byte_stream read (64 KiB)", |b| {
        b.iter(|| {
            let mut stream = ByteStream::new(MemoryConnection::new(&data), config());
            let mut sum = 0u32;
            while stream.data_available() {
                sum = sum.wrapping_add(stream.read() as u32);
            }
            black_box(sum);
        });
    });

    c.bench_function("byte_stream read_u32 (16 KiB)", |b| {
        b.iter(|| {
            let mut stream = ByteStream::new(MemoryConnection::new(&data[..16 * 1024]), config());
            for _ in 0..4096 {
                black_box(stream.read_u32());
            }
        });
    });
}

/// Buffered writes with periodic auto-flush.
fn bench_stream_writes(c: &mut Criterion) {
    let payload = vec![0xA5u8; 64 * 1024];

    c.bench_function("byte_stream write_bytes (64 KiB)", |b| {
        b.iter(|| {
            let mut stream = ByteStream::new(MemoryConnection::new(&[]), config());
            stream.write_bytes(black_box(&payload));
            stream.flush();
        });
    });
}

/// HTTP head + IPP header parsing, then draining a 4 KiB document.
fn bench_ipp_job(c: &mut Criterion) {
    let request = print_job_request(&vec![0xABu8; 4096]);
    let printers = PrinterRegistry::new(vec![Box::new(NullPrinter) as Box<dyn Printer>]);

    c.bench_function("ipp parse_request + drain (4 KiB document)", |b| {
        b.iter(|| {
            let conn = MemoryConnection::new(black_box(&request));
            let Ok(mut stream) = IppStream::open(ByteStream::new(conn, config())) else {
                panic!("http head");
            };
            assert!(parse_request(&mut stream, &printers).is_some());
            let mut count = 0usize;
            while stream.data_available() {
                black_box(stream.read());
                count += 1;
            }
            assert_eq!(count, 4096);
        });
    });
}

fn bench_build_ipp_response(c: &mut Criterion) {
    c.bench_function("build_ipp_response (printer attrs)", |b| {
        b.iter(|| {
            let mut builder = IppResponseBuilder::new(black_box(STATUS_OK), black_box(1));
            builder
                .begin_group(TAG_OPERATION_ATTRIBUTES)
                .charset("attributes-charset", "utf-8")
                .natural_language("attributes-natural-language", "en")
                .begin_group(TAG_PRINTER_ATTRIBUTES)
                .name_attr("printer-name", "bench")
                .uri("printer-uri-supported", "ipp://localhost:631/bench")
                .keyword("document-format-supported", "application/octet-stream")
                .enum_attr("printer-state", 3)
                .boolean("printer-is-accepting-jobs", true);
            black_box(builder.build());
        });
    });
}

criterion_group!(
    benches,
    bench_stream_reads,
    bench_stream_writes,
    bench_ipp_job,
    bench_build_ipp_response,
);
criterion_main!(benches);

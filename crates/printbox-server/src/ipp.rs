// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP/1.1 front-end.
//
// IPP is transported over HTTP POST (RFC 8010 SS3).  An `IppStream` reads the
// HTTP head, then exposes only the POST body, undoing chunked transfer
// coding or stopping at Content-Length.  `parse_request` reads the IPP
// operation header and attributes off that body and decides what to do with
// the connection:
//
//   - Print-Job              (0x0002)  RFC 8011 SS4.2.1  -> handed to a slot
//   - Validate-Job           (0x0004)  RFC 8011 SS4.2.3  -> answered here
//   - Get-Printer-Attributes (0x000B)  RFC 8011 SS4.2.5  -> answered here
//
// Everything after the end-of-attributes tag is document data, which the
// scheduler forwards byte by byte to the printer named in the request.

use tracing::{debug, info, warn};

use crate::http::{RequestError, RequestHead, decode_path_segment};
use crate::printer::PrinterRegistry;
use crate::slots::JobSource;
use crate::stream::ByteStream;
use crate::transport::Connection;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const IPP_VERSION_MAJOR: u8 = 0x01;
const IPP_VERSION_MINOR: u8 = 0x01;

// Delimiter tags (RFC 8010 SS3.5.1)
pub const TAG_OPERATION_ATTRIBUTES: u8 = 0x01;
pub const TAG_JOB_ATTRIBUTES: u8 = 0x02;
pub const TAG_END_OF_ATTRIBUTES: u8 = 0x03;
pub const TAG_PRINTER_ATTRIBUTES: u8 = 0x04;

/// Tags below this value are delimiters, everything else is a value tag.
const FIRST_VALUE_TAG: u8 = 0x10;

// Value tags (RFC 8010 SS3.5.2)
const VALUE_TAG_INTEGER: u8 = 0x21;
const VALUE_TAG_BOOLEAN: u8 = 0x22;
const VALUE_TAG_ENUM: u8 = 0x23;
const VALUE_TAG_TEXT: u8 = 0x41;
const VALUE_TAG_NAME: u8 = 0x42;
const VALUE_TAG_KEYWORD: u8 = 0x44;
const VALUE_TAG_URI: u8 = 0x45;
const VALUE_TAG_CHARSET: u8 = 0x47;
const VALUE_TAG_NATURAL_LANGUAGE: u8 = 0x48;
const VALUE_TAG_MIME_MEDIA_TYPE: u8 = 0x49;

// Operation ids (RFC 8011 SS5.4.15)
pub const OP_PRINT_JOB: u16 = 0x0002;
pub const OP_VALIDATE_JOB: u16 = 0x0004;
pub const OP_GET_PRINTER_ATTRIBUTES: u16 = 0x000B;

// Status codes (RFC 8011 SS B)
pub const STATUS_OK: u16 = 0x0000;
pub const STATUS_CLIENT_ERROR_NOT_FOUND: u16 = 0x0406;
pub const STATUS_SERVER_ERROR_OPERATION_NOT_SUPPORTED: u16 = 0x0501;
pub const STATUS_SERVER_ERROR_VERSION_NOT_SUPPORTED: u16 = 0x0503;
pub const STATUS_SERVER_ERROR_BUSY: u16 = 0x0507;

const JOB_STATE_PROCESSING: i32 = 5;
const PRINTER_STATE_IDLE: i32 = 3;

/// Attributes read before a request is considered hostile.
const MAX_ATTRIBUTES: usize = 512;

// ---------------------------------------------------------------------------
// Body stream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length {
        remaining: usize,
    },
    Chunked {
        /// Data bytes left in the current chunk.
        remaining: usize,
        /// A chunk has been started, so a CRLF precedes the next size line.
        after_data: bool,
        /// Terminal chunk and trailers consumed.
        done: bool,
    },
    /// Neither Content-Length nor chunked: the body runs until disconnect.
    UntilClose,
}

/// The body of one IPP-over-HTTP request.
pub struct IppStream<C: Connection> {
    stream: ByteStream<C>,
    head: RequestHead,
    framing: Framing,
    malformed: bool,
}

impl<C: Connection> IppStream<C> {
    /// Read the HTTP head and position the stream at the start of the body.
    ///
    /// A client that sent `Expect: 100-continue` is told to go ahead.
    pub fn open(mut stream: ByteStream<C>) -> Result<Self, RequestError> {
        let head = RequestHead::parse(&mut stream)?;
        if head.expects_continue() {
            stream.print("HTTP/1.1 100 Continue\r\n\r\n");
            stream.flush();
        }
        let framing = if head.is_chunked() {
            Framing::Chunked {
                remaining: 0,
                after_data: false,
                done: false,
            }
        } else if let Some(len) = head.content_length() {
            Framing::Length { remaining: len }
        } else {
            Framing::UntilClose
        };
        Ok(Self {
            stream,
            head,
            framing,
            malformed: false,
        })
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Queue an IPP message as the HTTP response.  It is sent when the
    /// output buffer fills or the stream is dropped.
    pub fn respond(&mut self, ipp: &[u8]) {
        let head = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: application/ipp\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            ipp.len()
        );
        self.stream.print(&head);
        self.stream.write_bytes(ipp);
    }

    fn body_complete(&self) -> bool {
        match self.framing {
            Framing::Length { remaining } => remaining == 0,
            Framing::Chunked { done, .. } => done,
            Framing::UntilClose => false,
        }
    }

    fn at_chunk_boundary(&self) -> bool {
        matches!(
            self.framing,
            Framing::Chunked {
                remaining: 0,
                done: false,
                ..
            }
        )
    }

    fn mark_malformed(&mut self, reason: &str) {
        if !self.malformed {
            warn!(peer = ?self.stream.peer_addr(), reason, "malformed chunked body");
            self.malformed = true;
        }
    }

    /// Read one line of chunk framing, or `None` if the stream failed.
    fn framing_line(&mut self) -> Option<String> {
        let line = self.stream.read_line_until(b'\n');
        if self.stream.is_failed() {
            return None;
        }
        Some(line.trim_end_matches('\r').to_string())
    }

    /// Consume the CRLF after the previous chunk and the next size line.
    fn next_chunk(&mut self) {
        let Framing::Chunked { after_data, .. } = self.framing else {
            return;
        };
        if after_data {
            match self.framing_line() {
                Some(line) if line.is_empty() => {}
                Some(_) => return self.mark_malformed("missing CRLF after chunk data"),
                None => return self.mark_malformed("stream ended inside chunk framing"),
            }
        }
        let Some(line) = self.framing_line() else {
            return self.mark_malformed("stream ended inside chunk framing");
        };
        let size_field = line.split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_field, 16) else {
            return self.mark_malformed("bad chunk size");
        };
        if size > 0 {
            self.framing = Framing::Chunked {
                remaining: size,
                after_data: true,
                done: false,
            };
            return;
        }
        // Trailer section ends with an empty line.
        loop {
            match self.framing_line() {
                Some(line) if line.is_empty() => break,
                Some(_) => continue,
                None => return self.mark_malformed("stream ended inside trailers"),
            }
        }
        self.framing = Framing::Chunked {
            remaining: 0,
            after_data: false,
            done: true,
        };
        debug!(peer = ?self.stream.peer_addr(), "chunked body complete");
    }

    /// Decode framing that has already arrived, without waiting.
    fn settle(&mut self) {
        if !self.malformed && self.at_chunk_boundary() && self.stream.available_now() > 0 {
            self.next_chunk();
        }
    }

    /// Next body byte, waiting at most the stream timeout.
    fn next_body_byte(&mut self) -> Option<u8> {
        if self.malformed {
            return None;
        }
        if self.at_chunk_boundary() {
            self.next_chunk();
        }
        if self.malformed || self.body_complete() {
            return None;
        }
        let byte = self.stream.read();
        if self.stream.is_failed() {
            return None;
        }
        match &mut self.framing {
            Framing::Length { remaining } | Framing::Chunked { remaining, .. } => *remaining -= 1,
            Framing::UntilClose => {}
        }
        Some(byte)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.next_body_byte()
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes([
            self.next_body_byte()?,
            self.next_body_byte()?,
        ]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            *byte = self.next_body_byte()?;
        }
        Some(u32::from_be_bytes(bytes))
    }

    pub fn read_exact_len(&mut self, len: usize) -> Option<Vec<u8>> {
        (0..len).map(|_| self.next_body_byte()).collect()
    }
}

impl<C: Connection> JobSource for IppStream<C> {
    fn has_more_data(&mut self) -> bool {
        self.settle();
        !self.malformed && !self.body_complete() && self.stream.has_more_data()
    }

    fn data_available(&mut self) -> bool {
        self.settle();
        !self.malformed
            && !self.body_complete()
            && !self.at_chunk_boundary()
            && self.stream.data_available()
    }

    fn read(&mut self) -> u8 {
        self.next_body_byte().unwrap_or(0)
    }

    /// The whole HTTP body arrived.
    fn finished_cleanly(&self) -> bool {
        !self.malformed && !self.stream.is_failed() && self.body_complete()
    }
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// Operation header plus the operation attributes we act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct IppRequest {
    version: (u8, u8),
    operation: u16,
    request_id: u32,
    printer_uri: Option<String>,
    job_name: Option<String>,
    user: Option<String>,
}

impl IppRequest {
    /// Read up to and including the end-of-attributes tag.
    fn read<C: Connection>(stream: &mut IppStream<C>) -> Option<Self> {
        let mut request = Self {
            version: (stream.read_u8()?, stream.read_u8()?),
            operation: stream.read_u16()?,
            request_id: stream.read_u32()?,
            ..Self::default()
        };

        let mut group = 0u8;
        for _ in 0..MAX_ATTRIBUTES {
            let tag = stream.read_u8()?;
            if tag == TAG_END_OF_ATTRIBUTES {
                return Some(request);
            }
            if tag < FIRST_VALUE_TAG {
                group = tag;
                continue;
            }
            let name_len = stream.read_u16()? as usize;
            let name = stream.read_exact_len(name_len)?;
            let value_len = stream.read_u16()? as usize;
            let value = stream.read_exact_len(value_len)?;
            if group != TAG_OPERATION_ATTRIBUTES {
                continue;
            }
            let value = String::from_utf8_lossy(&value).into_owned();
            match name.as_slice() {
                b"printer-uri" => request.printer_uri = Some(value),
                b"job-name" => request.job_name = Some(value),
                b"requesting-user-name" => request.user = Some(value),
                _ => {}
            }
        }
        warn!(peer = ?stream.peer_addr(), "too many IPP attributes");
        None
    }
}

/// An accepted Print-Job, waiting for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJobRequest {
    /// Index into the printer registry.
    pub printer: usize,
    pub request_id: u32,
    /// The URI the client addressed, echoed back in the job URI.
    pub printer_uri: String,
    pub job_name: Option<String>,
    pub user: Option<String>,
}

/// Path part of an absolute URI (`ipp://host:631/a/b` -> `/a/b`).
fn uri_path(uri: &str) -> &str {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let path = rest.find('/').map_or("", |i| &rest[i..]);
    path.split(['?', '#']).next().unwrap_or_default()
}

fn last_segment(path: &str) -> Option<String> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(decode_path_segment)
}

/// Printer named by the last segment of `printer-uri`, else of the HTTP path.
fn resolve_printer(
    printer_uri: Option<&str>,
    http_path: &str,
    printers: &PrinterRegistry,
) -> Option<usize> {
    printer_uri
        .map(uri_path)
        .into_iter()
        .chain(std::iter::once(http_path))
        .filter_map(last_segment)
        .find_map(|name| printers.find_by_name(&name))
}

/// Read the IPP request and either hand back a Print-Job or answer the
/// client directly.
///
/// Returns `None` for every request that does not become a job; in that
/// case a response has already been queued on the stream (unless the
/// stream itself failed) and the caller should drop it.
pub fn parse_request<C: Connection>(
    stream: &mut IppStream<C>,
    printers: &PrinterRegistry,
) -> Option<PrintJobRequest> {
    let Some(request) = IppRequest::read(stream) else {
        warn!(peer = ?stream.peer_addr(), "incomplete IPP request");
        return None;
    };
    debug!(
        peer = ?stream.peer_addr(),
        operation = request.operation,
        request_id = request.request_id,
        printer_uri = request.printer_uri.as_deref().unwrap_or(""),
        "IPP request"
    );

    if !(1..=2).contains(&request.version.0) {
        warn!(major = request.version.0, minor = request.version.1, "unsupported IPP version");
        stream.respond(&error_response(
            STATUS_SERVER_ERROR_VERSION_NOT_SUPPORTED,
            request.request_id,
            "IPP version not supported",
        ));
        return None;
    }

    let handled = matches!(
        request.operation,
        OP_PRINT_JOB | OP_VALIDATE_JOB | OP_GET_PRINTER_ATTRIBUTES
    );
    if !handled {
        info!(operation = request.operation, "unsupported IPP operation");
        stream.respond(&error_response(
            STATUS_SERVER_ERROR_OPERATION_NOT_SUPPORTED,
            request.request_id,
            "operation not supported",
        ));
        return None;
    }

    let path = stream.head().path.clone();
    let Some(printer) = resolve_printer(request.printer_uri.as_deref(), &path, printers) else {
        info!(
            printer_uri = request.printer_uri.as_deref().unwrap_or(""),
            path = %path,
            "IPP request for unknown printer"
        );
        stream.respond(&error_response(
            STATUS_CLIENT_ERROR_NOT_FOUND,
            request.request_id,
            "no such printer",
        ));
        return None;
    };

    let printer_uri = match &request.printer_uri {
        Some(uri) => uri.clone(),
        None => {
            let host = stream.head().header("host").unwrap_or("localhost");
            format!("ipp://{host}{path}")
        }
    };

    match request.operation {
        OP_PRINT_JOB => Some(PrintJobRequest {
            printer,
            request_id: request.request_id,
            printer_uri,
            job_name: request.job_name,
            user: request.user,
        }),
        OP_VALIDATE_JOB => {
            debug!("Validate-Job: returning successful-ok");
            stream.respond(
                &operation_group(STATUS_OK, request.request_id, "successful-ok").build(),
            );
            None
        }
        _ => {
            let (name, info) = printers
                .get(printer)
                .map(|p| (p.name().to_string(), p.info()))
                .unwrap_or_default();
            debug!(printer = %name, "Get-Printer-Attributes: returning capabilities");
            stream.respond(&printer_attributes_response(
                request.request_id,
                &printer_uri,
                &name,
                &info,
            ));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// IPP binary response builder
// ---------------------------------------------------------------------------

/// Builder for IPP response messages.
///
/// Produces the binary encoding described in RFC 8010 SS3.4.
pub struct IppResponseBuilder {
    /// Accumulated response bytes.
    buf: Vec<u8>,
}

impl IppResponseBuilder {
    /// Start a response with the given status code and echoed request-id.
    pub fn new(status_code: u16, request_id: u32) -> Self {
        let mut buf = Vec::with_capacity(256);
        // version-number: IPP 1.1
        buf.push(IPP_VERSION_MAJOR);
        buf.push(IPP_VERSION_MINOR);
        buf.extend_from_slice(&status_code.to_be_bytes());
        buf.extend_from_slice(&request_id.to_be_bytes());
        Self { buf }
    }

    /// Open an attribute group.
    pub fn begin_group(&mut self, delimiter: u8) -> &mut Self {
        self.buf.push(delimiter);
        self
    }

    /// textWithoutLanguage attribute.
    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_TEXT, name, value.as_bytes())
    }

    /// nameWithoutLanguage attribute.
    pub fn name_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_NAME, name, value.as_bytes())
    }

    pub fn keyword(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_KEYWORD, name, value.as_bytes())
    }

    /// Additional value of a 1setOf keyword: name-length 0 (RFC 8010 SS3.1.4).
    pub fn keyword_additional(&mut self, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_KEYWORD, "", value.as_bytes())
    }

    pub fn uri(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_URI, name, value.as_bytes())
    }

    pub fn charset(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_CHARSET, name, value.as_bytes())
    }

    pub fn natural_language(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_NATURAL_LANGUAGE, name, value.as_bytes())
    }

    pub fn mime_media_type(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_attr(VALUE_TAG_MIME_MEDIA_TYPE, name, value.as_bytes())
    }

    /// Four-byte signed integer attribute.
    pub fn integer(&mut self, name: &str, value: i32) -> &mut Self {
        self.write_attr(VALUE_TAG_INTEGER, name, &value.to_be_bytes())
    }

    /// Enum attribute (same wire encoding as integer).
    pub fn enum_attr(&mut self, name: &str, value: i32) -> &mut Self {
        self.write_attr(VALUE_TAG_ENUM, name, &value.to_be_bytes())
    }

    pub fn boolean(&mut self, name: &str, value: bool) -> &mut Self {
        self.write_attr(VALUE_TAG_BOOLEAN, name, &[u8::from(value)])
    }

    /// Write value-tag, name and value with their u16 length prefixes.
    ///
    /// An attribute whose name or value does not fit a u16 length is left out
    /// rather than written with a wrapped length.
    fn write_attr(&mut self, value_tag: u8, name: &str, value: &[u8]) -> &mut Self {
        let (Ok(name_len), Ok(value_len)) =
            (u16::try_from(name.len()), u16::try_from(value.len()))
        else {
            warn!(attribute = name, value_len = value.len(), "IPP attribute too long, omitted");
            return self;
        };
        self.buf.push(value_tag);
        self.buf.extend_from_slice(&name_len.to_be_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(&value_len.to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    /// Append end-of-attributes and return the message.
    pub fn build(mut self) -> Vec<u8> {
        self.buf.push(TAG_END_OF_ATTRIBUTES);
        self.buf
    }
}

/// Response with the mandatory operation attributes filled in.
fn operation_group(status: u16, request_id: u32, message: &str) -> IppResponseBuilder {
    let mut resp = IppResponseBuilder::new(status, request_id);
    resp.begin_group(TAG_OPERATION_ATTRIBUTES)
        .charset("attributes-charset", "utf-8")
        .natural_language("attributes-natural-language", "en")
        .text("status-message", message);
    resp
}

pub fn error_response(status: u16, request_id: u32, message: &str) -> Vec<u8> {
    operation_group(status, request_id, message).build()
}

/// Print-Job accepted: the job is processing as soon as the slot runs.
pub fn print_job_response(request_id: u32, job_id: i32, printer_uri: &str) -> Vec<u8> {
    let mut resp = operation_group(STATUS_OK, request_id, "successful-ok");
    resp.begin_group(TAG_JOB_ATTRIBUTES)
        .integer("job-id", job_id)
        .uri(
            "job-uri",
            &format!("{}/jobs/{job_id}", printer_uri.trim_end_matches('/')),
        )
        .enum_attr("job-state", JOB_STATE_PROCESSING)
        .keyword("job-state-reasons", "job-printing");
    resp.build()
}

fn printer_attributes_response(
    request_id: u32,
    printer_uri: &str,
    name: &str,
    info: &str,
) -> Vec<u8> {
    let mut resp = operation_group(STATUS_OK, request_id, "successful-ok");
    resp.begin_group(TAG_PRINTER_ATTRIBUTES)
        .uri("printer-uri-supported", printer_uri)
        .keyword("uri-security-supported", "none")
        .keyword("uri-authentication-supported", "none")
        .name_attr("printer-name", name)
        .text("printer-info", info)
        .text("printer-make-and-model", "printbox raw queue")
        .enum_attr("printer-state", PRINTER_STATE_IDLE)
        .keyword("printer-state-reasons", "none")
        .boolean("printer-is-accepting-jobs", true)
        .keyword("ipp-versions-supported", "1.0")
        .keyword_additional("1.1")
        .enum_attr("operations-supported", i32::from(OP_PRINT_JOB))
        .enum_attr("", i32::from(OP_VALIDATE_JOB))
        .enum_attr("", i32::from(OP_GET_PRINTER_ATTRIBUTES))
        .mime_media_type("document-format-supported", "application/octet-stream")
        .mime_media_type("document-format-default", "application/octet-stream")
        .charset("charset-configured", "utf-8")
        .charset("charset-supported", "utf-8")
        .natural_language("natural-language-configured", "en")
        .natural_language("generated-natural-language-supported", "en")
        .keyword("compression-supported", "none")
        .keyword("pdl-override-supported", "not-attempted");
    resp.build()
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 request parsing.
//
// Both the IPP listener (IPP is carried in HTTP POST bodies, RFC 8010 SS3)
// and the configuration web surface start by reading a request head off a
// byte stream.  Only what those two need is understood: the request line,
// header fields, Content-Length, chunked transfer coding and
// `application/x-www-form-urlencoded` bodies.

use std::collections::HashMap;

use thiserror::Error;

use crate::stream::ByteStream;
use crate::transport::Connection;

/// Upper bound on header fields per request.
const MAX_HEADERS: usize = 64;

/// Why a request head could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("client stopped sending before the request head was complete")]
    Incomplete,

    #[error("malformed request line: {0:?}")]
    RequestLine(String),

    #[error("malformed header field: {0:?}")]
    Header(String),

    #[error("more than {MAX_HEADERS} header fields")]
    TooManyHeaders,
}

/// Request line plus header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub version: String,
    headers: Vec<(String, String)>,
}

/// Read one CRLF (or bare LF) terminated line.
fn read_line<C: Connection>(stream: &mut ByteStream<C>) -> Result<String, RequestError> {
    let mut line = stream.read_line_until(b'\n');
    if stream.is_failed() {
        return Err(RequestError::Incomplete);
    }
    if line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

impl RequestHead {
    /// Read a request head, up to and including the blank line.
    pub fn parse<C: Connection>(stream: &mut ByteStream<C>) -> Result<Self, RequestError> {
        let request_line = read_line(stream)?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), version) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(RequestError::RequestLine(request_line));
        };
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        let mut head = Self {
            method: method.to_string(),
            path,
            query,
            version: version.unwrap_or("HTTP/1.0").to_string(),
            headers: Vec::new(),
        };

        loop {
            let line = read_line(stream)?;
            if line.is_empty() {
                break;
            }
            if head.headers.len() == MAX_HEADERS {
                return Err(RequestError::TooManyHeaders);
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(RequestError::Header(line));
            };
            head.headers
                .push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(head)
    }

    /// First value of the header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|v| v.parse::<usize>().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }
}

/// A parsed web request that owns its connection.
///
/// Responses are written through [`print`](Self::print) into the stream's
/// output buffer; they reach the client on [`flush`](Self::flush) or when the
/// request is dropped.
pub struct HttpRequest<C: Connection> {
    stream: ByteStream<C>,
    head: RequestHead,
}

impl<C: Connection> HttpRequest<C> {
    pub fn parse(mut stream: ByteStream<C>) -> Result<Self, RequestError> {
        let head = RequestHead::parse(&mut stream)?;
        Ok(Self { stream, head })
    }

    pub fn method(&self) -> &str {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Read the body and decode it as urlencoded form fields.
    ///
    /// Without a Content-Length only what has already arrived is read.
    pub fn form_fields(&mut self) -> HashMap<String, String> {
        let len = match self.head.content_length() {
            Some(len) => len,
            None => self.stream.available_now(),
        };
        if len == 0 {
            return HashMap::new();
        }
        let body = self.stream.read_exact_len(len);
        parse_urlencoded(&body)
    }

    pub fn print(&mut self, text: &str) {
        self.stream.print(text);
    }

    pub fn flush(&mut self) {
        self.stream.flush();
    }
}

/// Decode `a=1&b=two+words&c=%2F` into a map.  Later duplicates win.
pub fn parse_urlencoded(body: &[u8]) -> HashMap<String, String> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut kv = pair.splitn(2, |&b| b == b'=');
            let key = kv.next().unwrap_or_default();
            let value = kv.next().unwrap_or_default();
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// `+` becomes a space, `%XX` a byte; malformed escapes are kept literally.
pub fn percent_decode(input: &[u8]) -> String {
    decode(input, true)
}

/// Like [`percent_decode`] but keeps `+`, as URI path segments do.
pub fn decode_path_segment(segment: &str) -> String {
    decode(segment.as_bytes(), false)
}

fn decode(input: &[u8], plus_as_space: bool) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' => {
                let decoded = match (input.get(i + 1), input.get(i + 2)) {
                    (Some(&hi), Some(&lo)) => hex_value(hi).zip(hex_value(lo)),
                    _ => None,
                };
                match decoded {
                    Some((hi, lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, fast_stream_config};

    fn stream_over(bytes: &[u8]) -> ByteStream<MockConnection> {
        ByteStream::new(MockConnection::with_input(bytes), fast_stream_config())
    }

    #[test]
    fn parses_request_line_and_headers() {
        let mut stream =
            stream_over(b"GET /printerInfo?x=1 HTTP/1.1\r\nHost: printbox\r\nContent-Length: 3\r\n\r\nabc");
        let head = RequestHead::parse(&mut stream).expect("head");
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/printerInfo");
        assert_eq!(head.query.as_deref(), Some("x=1"));
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.header("HOST"), Some("printbox"));
        assert_eq!(head.content_length(), Some(3));
        assert!(!head.is_chunked());
        // Body untouched.
        assert_eq!(stream.read_exact_len(3), b"abc");
    }

    #[test]
    fn accepts_bare_lf_line_endings() {
        let mut stream =
            stream_over(b"POST /ipp HTTP/1.1\nTransfer-Encoding: chunked\nExpect: 100-continue\n\n");
        let head = RequestHead::parse(&mut stream).expect("head");
        assert!(head.is_chunked());
        assert!(head.expects_continue());
    }

    #[test]
    fn truncated_head_is_incomplete() {
        let mut stream = stream_over(b"GET / HTTP/1.1\r\nHost: x\r\n");
        assert_eq!(RequestHead::parse(&mut stream), Err(RequestError::Incomplete));
    }

    #[test]
    fn garbage_request_line_is_rejected() {
        let mut stream = stream_over(b"HELLO\r\n\r\n");
        assert!(matches!(
            RequestHead::parse(&mut stream),
            Err(RequestError::RequestLine(_))
        ));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut stream = stream_over(b"GET / HTTP/1.1\r\nbroken\r\n\r\n");
        assert_eq!(
            RequestHead::parse(&mut stream),
            Err(RequestError::Header("broken".into()))
        );
    }

    #[test]
    fn decodes_form_body() {
        let body = b"SSID=home+net&password=p%40ss%3D1&empty=";
        let fields = parse_urlencoded(body);
        assert_eq!(fields["SSID"], "home net");
        assert_eq!(fields["password"], "p@ss=1");
        assert_eq!(fields["empty"], "");
    }

    #[test]
    fn malformed_escapes_stay_literal() {
        assert_eq!(percent_decode(b"100%"), "100%");
        assert_eq!(percent_decode(b"%zz"), "%zz");
        assert_eq!(percent_decode(b"%4"), "%4");
        assert_eq!(percent_decode(b"%41"), "A");
    }

    #[test]
    fn path_segments_keep_plus() {
        assert_eq!(decode_path_segment("Office%20Laser+2"), "Office Laser+2");
    }

    #[test]
    fn form_fields_read_content_length_bytes() {
        let raw =
            b"POST /wifi-connect HTTP/1.1\r\nContent-Length: 25\r\n\r\nSSID=home&password=secret";
        let mut request = HttpRequest::parse(stream_over(raw)).expect("request");
        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/wifi-connect");
        let fields = request.form_fields();
        assert_eq!(fields.get("SSID").map(String::as_str), Some("home"));
        assert_eq!(fields.get("password").map(String::as_str), Some("secret"));
    }

    #[test]
    fn escape_html_covers_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}

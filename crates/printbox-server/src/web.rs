// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration pages served on the HTTP port.
//
// Each request is handled to completion inside one tick: route, write the
// page into the stream buffer, drop the request (flush + close).

use std::time::Instant;

use tracing::{debug, info};

use crate::http::{HttpRequest, escape_html};
use crate::printer::PrinterRegistry;
use crate::transport::Connection;
use crate::wifi::NetworkManager;

/// Everything the pages need from the server.
pub struct WebContext<'a> {
    pub printers: &'a PrinterRegistry,
    pub network: &'a mut dyn NetworkManager,
    /// Host part of advertised printer URIs.
    pub host: String,
    pub ipp_port: u16,
    pub socket_port: u16,
}

const OK_HEAD: &str = "HTTP/1.1 200 OK \r\n\r\n";
const NOT_FOUND_HEAD: &str = "HTTP/1.1 404 Not Found \r\n\r\n";

/// Route and answer one request.  Returns the HTTP status sent.
pub fn serve<C: Connection>(mut request: HttpRequest<C>, ctx: &mut WebContext<'_>) -> u16 {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.path().to_string();
    info!(peer = ?request.peer_addr(), method = %method, path = %path, "request parsed");

    let status = match (method.as_str(), path.as_str()) {
        ("GET", "/") => {
            request.print(OK_HEAD);
            request.print(
                "<h1>printbox print server</h1>\
                 <a href=\"/wifi\">WiFi configuration</a><br>\
                 <a href=\"/printerInfo\">Printers</a>",
            );
            200
        }
        ("GET", "/printerInfo") => {
            printer_info(&mut request, ctx);
            200
        }
        ("GET", "/wifi") => {
            wifi_page(&mut request, ctx);
            200
        }
        ("POST", "/wifi-connect") => {
            wifi_connect(&mut request, ctx);
            200
        }
        _ => {
            request.print(NOT_FOUND_HEAD);
            request.print("<h1>Not found</h1>");
            404
        }
    };

    drop(request);
    debug!(
        path = %path,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP client handled"
    );
    status
}

fn printer_info<C: Connection>(request: &mut HttpRequest<C>, ctx: &WebContext<'_>) {
    request.print(OK_HEAD);
    request.print("<h1>Available printers</h1>");
    let host = escape_html(&ctx.host);
    for (index, printer) in ctx.printers.iter().enumerate() {
        let name = escape_html(printer.name());
        request.print(&format!(
            "<h2>{name}</h2><p>{}</p><p>Accessible at:</p><ul><li>ipp://{host}:{}/{name}</li>",
            escape_html(&printer.info()),
            ctx.ipp_port,
        ));
        // Raw socket jobs always go to the first printer.
        if index == 0 {
            request.print(&format!("<li>socket://{host}:{}</li>", ctx.socket_port));
        }
        request.print("</ul>");
    }
}

fn wifi_page<C: Connection>(request: &mut HttpRequest<C>, ctx: &mut WebContext<'_>) {
    request.print(OK_HEAD);
    request.print("<h1>WiFi configuration</h1><p>Status: ");
    request.print(&escape_html(&ctx.network.status()));
    request.print(
        "</p><form method=\"POST\" action=\"/wifi-connect\">\
         Available networks (choose one to connect):<ul>",
    );
    for network in ctx.network.scan() {
        let ssid = escape_html(&network.ssid);
        request.print(&format!(
            "<li><input type=\"radio\" name=\"SSID\" value=\"{ssid}\">{ssid} ({}, {} dBm)</li>",
            network.encryption.display_name(),
            network.rssi,
        ));
    }
    request.print(
        "</ul>Password (leave blank for open networks): \
         <input type=\"password\" name=\"password\">\
         <input type=\"submit\" value=\"Connect\"></form>",
    );
}

/// Switching networks can drop the uplink, so the client gets its answer
/// before the network manager is called.
fn wifi_connect<C: Connection>(request: &mut HttpRequest<C>, ctx: &mut WebContext<'_>) {
    let fields = request.form_fields();
    let ssid = fields.get("SSID").map(String::as_str).unwrap_or_default();
    let password = fields.get("password").map(String::as_str).unwrap_or_default();
    request.print(OK_HEAD);
    request.print("<h1>OK</h1>");
    request.flush();
    info!(ssid, "connecting to network");
    ctx.network.connect(ssid, password);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::Printer;
    use crate::stream::ByteStream;
    use crate::testing::{
        ConnectCall, MockConnection, MockNetwork, RecordingPrinter, fast_stream_config,
    };

    fn registry() -> PrinterRegistry {
        let printers: Vec<Box<dyn Printer>> = vec![
            Box::new(RecordingPrinter::new("office").0),
            Box::new(RecordingPrinter::new("<lab>").0),
        ];
        PrinterRegistry::new(printers)
    }

    /// Serve `raw` and return (status, response text).
    fn exchange(raw: &[u8], network: &mut MockNetwork) -> (u16, MockConnection, String) {
        let conn = MockConnection::with_input(raw);
        network.watch(&conn);
        let printers = registry();
        let mut ctx = WebContext {
            printers: &printers,
            network,
            host: "192.0.2.1".into(),
            ipp_port: 631,
            socket_port: 9100,
        };
        let request = HttpRequest::parse(ByteStream::new(conn.clone(), fast_stream_config()))
            .expect("request");
        let status = serve(request, &mut ctx);
        let text = conn.written_text();
        (status, conn, text)
    }

    #[test]
    fn landing_page_links_to_subpages() {
        let (status, conn, text) = exchange(b"GET / HTTP/1.1\r\n\r\n", &mut MockNetwork::default());
        assert_eq!(status, 200);
        assert!(text.starts_with("HTTP/1.1 200 OK \r\n\r\n<h1>printbox print server</h1>"));
        assert!(text.contains("href=\"/wifi\""));
        assert!(text.contains("href=\"/printerInfo\""));
        assert_eq!(conn.close_calls(), 1);
    }

    #[test]
    fn printer_info_lists_every_printer() {
        let (status, _, text) = exchange(
            b"GET /printerInfo?refresh=1 HTTP/1.1\r\n\r\n",
            &mut MockNetwork::default(),
        );
        assert_eq!(status, 200);
        assert!(text.contains("<h2>office</h2><p>recording printer office</p>"));
        assert!(text.contains("<li>ipp://192.0.2.1:631/office</li>"));
        assert!(text.contains("<li>ipp://192.0.2.1:631/&lt;lab&gt;</li>"));
        assert_eq!(text.matches("socket://").count(), 1);
        assert!(text.contains("<li>socket://192.0.2.1:9100</li>"));
    }

    #[test]
    fn wifi_page_lists_scan_results() {
        let (status, _, text) =
            exchange(b"GET /wifi HTTP/1.1\r\n\r\n", &mut MockNetwork::default());
        assert_eq!(status, 200);
        assert!(text.contains("Status: connected to lab (192.0.2.1)"));
        assert!(text.contains("value=\"lab\">lab (WPA2, -48 dBm)</li>"));
        assert!(text.contains("&lt;guest&gt; (open, -80 dBm)"));
        assert!(!text.contains("<guest>"));
        assert!(text.contains("action=\"/wifi-connect\""));
    }

    #[test]
    fn wifi_connect_answers_before_switching() {
        let mut network = MockNetwork::default();
        let raw =
            b"POST /wifi-connect HTTP/1.1\r\nContent-Length: 25\r\n\r\nSSID=home&password=secret";
        let (status, _, text) = exchange(raw, &mut network);
        assert_eq!(status, 200);
        assert_eq!(text, "HTTP/1.1 200 OK \r\n\r\n<h1>OK</h1>");

        let calls = network.calls();
        assert_eq!(
            calls,
            vec![ConnectCall {
                ssid: "home".into(),
                password: "secret".into(),
                client_saw: "HTTP/1.1 200 OK \r\n\r\n<h1>OK</h1>".into(),
            }]
        );
    }

    #[test]
    fn unknown_routes_are_not_found() {
        for raw in [
            &b"GET /missing HTTP/1.1\r\n\r\n"[..],
            &b"POST / HTTP/1.1\r\n\r\n"[..],
            &b"GET /wifi-connect HTTP/1.1\r\n\r\n"[..],
        ] {
            let (status, _, text) = exchange(raw, &mut MockNetwork::default());
            assert_eq!(status, 404);
            assert_eq!(text, "HTTP/1.1 404 Not Found \r\n\r\n<h1>Not found</h1>");
        }
    }
}

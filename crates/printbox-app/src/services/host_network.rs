// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network manager for a general-purpose host.
//
// The host's own network stack owns association, so there is nothing to
// scan and nothing to join.  Connect requests from the web page are logged
// and remembered so the status line can show them.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::{debug, info};

use printbox_core::types::NetworkInfo;
use printbox_server::NetworkManager;

/// Any routable address; a UDP "connect" only selects the outgoing route.
const ROUTE_PROBE: &str = "192.0.2.1:9";

#[derive(Default)]
pub struct HostNetwork {
    requested: Option<String>,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self { requested: None }
    }

    /// Local address of the default route, or loopback when there is none.
    fn local_ip() -> IpAddr {
        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| {
                socket.connect(ROUTE_PROBE)?;
                socket.local_addr()
            })
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl NetworkManager for HostNetwork {
    fn status(&self) -> String {
        let address = self.address();
        match &self.requested {
            Some(ssid) => format!("host network ({address}); last requested network: {ssid}"),
            None => format!("host network ({address})"),
        }
    }

    fn address(&self) -> String {
        Self::local_ip().to_string()
    }

    fn scan(&mut self) -> Vec<NetworkInfo> {
        debug!("network scan not available on this host");
        Vec::new()
    }

    fn connect(&mut self, ssid: &str, password: &str) {
        info!(
            ssid,
            open = password.is_empty(),
            "network change requested; association is managed by the host"
        );
        self.requested = Some(ssid.to_string());
    }
}

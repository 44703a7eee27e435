// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network management seam used by the web configuration pages.

use printbox_core::types::NetworkInfo;

/// Association and credential handling for the device's uplink.
///
/// `connect` may take the uplink down while it switches networks, so callers
/// must finish talking to their own client before calling it.
pub trait NetworkManager {
    /// One-line status for the configuration page.
    fn status(&self) -> String;

    /// Address clients should use to reach this device.
    fn address(&self) -> String;

    /// Networks currently in range.
    fn scan(&mut self) -> Vec<NetworkInfo>;

    /// Join `ssid`.  An empty password means an open network.
    fn connect(&mut self, ssid: &str, password: &str);
}

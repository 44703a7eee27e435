// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Domain types shared between the server crate and the binary.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the print server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    /// Constructed, listeners not bound yet.
    Stopped,
    /// All three listeners bound; `tick` admits new clients.
    Running,
}

/// Occupancy of the client slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUsage {
    pub used: usize,
    pub capacity: usize,
}

impl SlotUsage {
    pub fn is_full(&self) -> bool {
        self.used >= self.capacity
    }
}

impl std::fmt::Display for SlotUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.used, self.capacity)
    }
}

/// Wireless encryption scheme reported by a network scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encryption {
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa3,
    Unknown,
}

impl Encryption {
    /// Human-readable name for the configuration page.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wep => "WEP",
            Self::Wpa => "WPA",
            Self::Wpa2 => "WPA2",
            Self::WpaWpa2 => "WPA/WPA2",
            Self::Wpa3 => "WPA3",
            Self::Unknown => "unknown",
        }
    }
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ssid: String,
    pub encryption: Encryption,
    /// Signal strength in dBm.
    pub rssi: i32,
}

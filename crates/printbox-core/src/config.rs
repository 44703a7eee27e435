// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server configuration, persisted as JSON.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PrintboxError, Result};

/// Default raw socket (JetDirect) port.
pub const DEFAULT_SOCKET_PORT: u16 = 9100;

/// Default IPP port (IANA-assigned).
pub const DEFAULT_IPP_PORT: u16 = 631;

/// Default port for the configuration web surface.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Where a printer's bytes end up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrinterBackendConfig {
    /// A character device such as `/dev/usb/lp0`, opened once per job.
    Device { path: PathBuf },
    /// A directory receiving one file per job.
    Spool { directory: PathBuf },
}

/// One entry of the printer registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Display name; also the last path segment of the printer's IPP URI.
    pub name: String,
    pub backend: PrinterBackendConfig,
}

/// Persistent server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port for raw job ingestion (all jobs go to the first printer).
    pub socket_port: u16,
    /// Port for the IPP listener.
    pub ipp_port: u16,
    /// Port for the HTTP configuration surface.
    pub http_port: u16,
    /// Absolute bound on a single availability wait, in milliseconds.
    pub read_timeout_ms: u64,
    /// How often an availability wait re-checks the transport.
    pub poll_interval_ms: u64,
    /// Output buffer capacity of every client stream.
    pub send_buffer_size: usize,
    /// Period of the slot usage log line emitted by the driver loop.
    pub status_interval_secs: u64,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Host name advertised in printer URIs. When unset the network
    /// manager's address is used.
    pub hostname: Option<String>,
    pub printers: Vec<PrinterConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_port: DEFAULT_SOCKET_PORT,
            ipp_port: DEFAULT_IPP_PORT,
            http_port: DEFAULT_HTTP_PORT,
            read_timeout_ms: 5_000,
            poll_interval_ms: 10,
            send_buffer_size: 1024,
            status_interval_secs: 60,
            log_filter: "info".into(),
            hostname: None,
            printers: vec![PrinterConfig {
                name: "spool".into(),
                backend: PrinterBackendConfig::Spool {
                    directory: PathBuf::from("spool"),
                },
            }],
        }
    }
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.printers.is_empty() {
            return Err(PrintboxError::Config(
                "at least one printer must be configured".into(),
            ));
        }
        let mut names = HashSet::new();
        for printer in &self.printers {
            if printer.name.is_empty() || printer.name.contains('/') {
                return Err(PrintboxError::Config(format!(
                    "invalid printer name {:?}",
                    printer.name
                )));
            }
            if !names.insert(printer.name.as_str()) {
                return Err(PrintboxError::Config(format!(
                    "duplicate printer name {:?}",
                    printer.name
                )));
            }
        }
        if self.send_buffer_size == 0 {
            return Err(PrintboxError::Config("send_buffer_size must be > 0".into()));
        }
        if self.poll_interval_ms > self.read_timeout_ms {
            return Err(PrintboxError::Config(format!(
                "poll_interval_ms ({}) exceeds read_timeout_ms ({})",
                self.poll_interval_ms, self.read_timeout_ms
            )));
        }
        let ports = [self.socket_port, self.ipp_port, self.http_port];
        if ports[0] == ports[1] || ports[0] == ports[2] || ports[1] == ports[2] {
            return Err(PrintboxError::Config(format!(
                "listener ports must differ: {ports:?}"
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

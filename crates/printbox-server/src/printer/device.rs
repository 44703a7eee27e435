// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer attached as a character device (USB printer class, parallel port).
//
// The device node is opened at the start of every job and closed at the end,
// so a printer that was unplugged between jobs is picked up again on the
// next one.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use tracing::debug;

use printbox_core::error::{PrintboxError, Result};

use super::PrinterBackend;

/// Writes job bytes straight to a device node such as `/dev/usb/lp0`.
pub struct DeviceBackend {
    path: PathBuf,
    device: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl DeviceBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            device: None,
            bytes_written: 0,
        }
    }

    /// Bytes written during the current job.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl PrinterBackend for DeviceBackend {
    fn open_job(&mut self, slot: usize) -> Result<()> {
        // Never create: a missing node means the printer is not attached.
        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                PrintboxError::PrinterBackend(format!("open {}: {e}", self.path.display()))
            })?;
        debug!(path = %self.path.display(), slot, "device opened");
        self.device = Some(BufWriter::new(file));
        self.bytes_written = 0;
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.device.is_some()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| PrintboxError::PrinterBackend("device not open".into()))?;
        device.write_all(&[byte])?;
        self.bytes_written += 1;
        Ok(())
    }

    fn close_job(&mut self, _success: bool) -> Result<()> {
        if let Some(mut device) = self.device.take() {
            device.flush()?;
            debug!(path = %self.path.display(), bytes = self.bytes_written, "device closed");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("device {}", self.path.display())
    }
}

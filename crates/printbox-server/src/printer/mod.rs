// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printers and the registry the scheduler addresses them through.
//
// The scheduler only knows the `Printer` capability set.  Concrete printers
// are a `JobGate` (which decides which slot currently owns the device)
// wrapped around a `PrinterBackend` (which moves bytes to the device).

pub mod device;
pub mod gate;
pub mod spool;

use tracing::info;

use printbox_core::config::{PrinterBackendConfig, PrinterConfig};
use printbox_core::error::Result;

pub use device::DeviceBackend;
pub use gate::{JobGate, PrinterBackend};
pub use spool::SpoolBackend;

/// A print destination, addressed by client slot index.
///
/// Every admitted connection gets exactly one `start_job` and exactly one
/// `end_job` for its slot.  `print_byte` is only called after `can_print`
/// returned true for the same slot in the same tick.
pub trait Printer {
    /// Begin accepting bytes for `slot`.
    fn start_job(&mut self, slot: usize);

    /// Non-blocking readiness check.  Only one slot may be accepted at a
    /// time; the printer enforces that here.
    fn can_print(&mut self, slot: usize) -> bool;

    fn print_byte(&mut self, slot: usize, byte: u8);

    /// Release per-slot state.  `success` is false when the job ended by
    /// disconnect or timeout rather than a protocol-level completion.
    fn end_job(&mut self, slot: usize, success: bool);

    fn name(&self) -> &str;

    /// Human-readable status line for the web surface.
    fn info(&self) -> String;
}

/// Fixed list of printers, built once at startup.
pub struct PrinterRegistry {
    printers: Vec<Box<dyn Printer>>,
}

impl PrinterRegistry {
    pub fn new(printers: Vec<Box<dyn Printer>>) -> Self {
        Self { printers }
    }

    /// Build a printer for every configured entry, in order.
    pub fn from_config(configs: &[PrinterConfig]) -> Result<Self> {
        let mut printers: Vec<Box<dyn Printer>> = Vec::with_capacity(configs.len());
        for config in configs {
            let printer: Box<dyn Printer> = match &config.backend {
                PrinterBackendConfig::Device { path } => Box::new(JobGate::new(
                    config.name.clone(),
                    DeviceBackend::new(path.clone()),
                )),
                PrinterBackendConfig::Spool { directory } => Box::new(JobGate::new(
                    config.name.clone(),
                    SpoolBackend::create(directory.clone(), &config.name)?,
                )),
            };
            info!(
                index = printers.len(),
                name = %config.name,
                info = %printer.info(),
                "printer registered"
            );
            printers.push(printer);
        }
        Ok(Self::new(printers))
    }

    pub fn len(&self) -> usize {
        self.printers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.printers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&(dyn Printer + 'static)> {
        self.printers.get(index).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Printer + 'static)> {
        self.printers.get_mut(index).map(|p| p.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Printer + 'static)> {
        self.printers.iter().map(|p| p.as_ref())
    }

    /// Index of the printer called exactly `name`.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.printers.iter().position(|p| p.name() == name)
    }
}

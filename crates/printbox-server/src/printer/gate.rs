// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer job ownership.
//
// Several slots may target the same printer, but only one may feed it at a
// time.  A slot that starts a job while the printer is busy joins a waiting
// list in arrival order and is promoted the first time it asks `can_print`
// after the printer goes idle.  Until then its bytes stay unread in its own
// connection, which is what keeps two jobs from interleaving.

use tracing::{debug, info, warn};

use printbox_core::error::Result;

use super::Printer;

/// The device side of a printer: moves bytes, knows nothing about slots.
pub trait PrinterBackend {
    /// Prepare the device for a new job owned by `slot`.
    fn open_job(&mut self, slot: usize) -> Result<()>;

    /// Non-blocking: can the device take a byte right now?
    fn is_ready(&mut self) -> bool;

    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Finish the current job.
    fn close_job(&mut self, success: bool) -> Result<()>;

    /// Short description of where the bytes go.
    fn describe(&self) -> String;
}

/// Wraps a backend with single-owner job scheduling.
pub struct JobGate<B: PrinterBackend> {
    name: String,
    backend: B,
    /// Slot currently feeding the backend.
    active: Option<usize>,
    /// Slots with a started job, oldest first.
    waiting: Vec<usize>,
    /// The active job hit a backend error; its remaining bytes are drained.
    faulted: bool,
    jobs_completed: u32,
    jobs_failed: u32,
}

impl<B: PrinterBackend> JobGate<B> {
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            backend,
            active: None,
            waiting: Vec::new(),
            faulted: false,
            jobs_completed: 0,
            jobs_failed: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.active
    }

    pub fn waiting_slots(&self) -> &[usize] {
        &self.waiting
    }

    /// Hand the printer to the oldest waiting slot if it is idle.
    fn promote(&mut self) {
        if self.active.is_some() || self.waiting.is_empty() {
            return;
        }
        let slot = self.waiting.remove(0);
        self.active = Some(slot);
        self.faulted = false;
        match self.backend.open_job(slot) {
            Ok(()) => info!(printer = %self.name, slot, "job started"),
            Err(e) => {
                // Drain the job instead of stalling the client forever.
                warn!(
                    printer = %self.name,
                    slot,
                    error = %e,
                    "could not open printer, discarding job"
                );
                self.faulted = true;
            }
        }
    }
}

impl<B: PrinterBackend> Printer for JobGate<B> {
    fn start_job(&mut self, slot: usize) {
        if self.active == Some(slot) || self.waiting.contains(&slot) {
            warn!(printer = %self.name, slot, "job already started for slot");
            return;
        }
        self.waiting.push(slot);
        if self.active.is_some() {
            debug!(
                printer = %self.name,
                slot,
                queued = self.waiting.len(),
                "printer busy, job waiting"
            );
        }
        self.promote();
    }

    fn can_print(&mut self, slot: usize) -> bool {
        self.promote();
        if self.active != Some(slot) {
            return false;
        }
        self.faulted || self.backend.is_ready()
    }

    fn print_byte(&mut self, slot: usize, byte: u8) {
        if self.active != Some(slot) {
            warn!(printer = %self.name, slot, "byte from slot that does not own the printer");
            return;
        }
        if self.faulted {
            return;
        }
        if let Err(e) = self.backend.write_byte(byte) {
            warn!(
                printer = %self.name,
                slot,
                error = %e,
                "printer write failed, discarding rest of job"
            );
            self.faulted = true;
        }
    }

    fn end_job(&mut self, slot: usize, success: bool) {
        if self.active == Some(slot) {
            let ok = success && !self.faulted;
            if let Err(e) = self.backend.close_job(ok) {
                warn!(printer = %self.name, slot, error = %e, "failed to finish job");
            }
            if ok {
                self.jobs_completed += 1;
            } else {
                self.jobs_failed += 1;
            }
            info!(printer = %self.name, slot, success = ok, "job ended");
            self.active = None;
            self.faulted = false;
            self.promote();
        } else if let Some(pos) = self.waiting.iter().position(|&s| s == slot) {
            self.waiting.remove(pos);
            debug!(printer = %self.name, slot, "waiting job withdrawn");
        } else {
            warn!(printer = %self.name, slot, "end of unknown job");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> String {
        let state = match self.active {
            Some(slot) if self.faulted => format!("discarding job from slot {slot}"),
            Some(slot) => format!("printing job from slot {slot}"),
            None => "idle".to_string(),
        };
        format!(
            "{}; {}, {} waiting; {} jobs finished, {} ended early",
            self.backend.describe(),
            state,
            self.waiting.len(),
            self.jobs_completed,
            self.jobs_failed
        )
    }
}

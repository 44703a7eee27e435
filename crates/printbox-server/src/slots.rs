// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-capacity client slot table.
//
// A slot is either empty or holds a stream together with the index of the
// printer it feeds.  The index of a slot is the job handle its printer sees,
// stable from admission until the slot is reaped.

use tracing::info;

use printbox_core::types::SlotUsage;

use crate::printer::PrinterRegistry;

/// What the scheduler reads job bytes from.
pub trait JobSource {
    /// False once the peer is gone (and nothing is left unread) or the
    /// stream has failed.
    fn has_more_data(&mut self) -> bool;

    /// A byte can be read without waiting.
    fn data_available(&mut self) -> bool;

    fn read(&mut self) -> u8;

    /// Whether the protocol itself signalled that the job was complete.
    fn finished_cleanly(&self) -> bool {
        false
    }
}

/// A populated slot.
pub struct ClientSlot<S> {
    pub stream: S,
    pub printer: usize,
}

/// Result of servicing one slot for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Slot was empty.
    Empty,
    /// Nothing to do this tick (no data, or printer not ready).
    Idle,
    /// One byte moved from the client to its printer.
    Forwarded,
    /// The stream ended; the slot is free again.
    Reaped,
}

pub struct SlotTable<S, const N: usize> {
    slots: [Option<ClientSlot<S>>; N],
}

impl<S: JobSource, const N: usize> SlotTable<S, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Lowest empty slot index, or `None` when the server is at capacity.
    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Populate an empty slot.  Hands the stream back if the slot is taken
    /// or out of range, so the caller decides how to dispose of it.
    pub fn insert(&mut self, index: usize, stream: S, printer: usize) -> Result<(), S> {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(ClientSlot { stream, printer });
                Ok(())
            }
            _ => Err(stream),
        }
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<&ClientSlot<S>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ClientSlot<S>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn usage(&self) -> SlotUsage {
        SlotUsage {
            used: self.slots.iter().filter(|s| s.is_some()).count(),
            capacity: N,
        }
    }

    /// Advance one slot by at most one byte.
    ///
    /// While the stream has more data, a byte is read only if one is already
    /// waiting and the target printer accepts this slot right now; otherwise
    /// the slot is left untouched until the next tick.  Once the stream has
    /// no more data it is dropped (flushing and closing it) and the printer
    /// is told the job ended.
    pub fn service(&mut self, index: usize, printers: &mut PrinterRegistry) -> ServiceOutcome {
        let Some(Some(slot)) = self.slots.get_mut(index) else {
            return ServiceOutcome::Empty;
        };

        if slot.stream.has_more_data() {
            if !slot.stream.data_available() {
                return ServiceOutcome::Idle;
            }
            let Some(printer) = printers.get_mut(slot.printer) else {
                return ServiceOutcome::Idle;
            };
            if !printer.can_print(index) {
                return ServiceOutcome::Idle;
            }
            let byte = slot.stream.read();
            printer.print_byte(index, byte);
            return ServiceOutcome::Forwarded;
        }

        let Some(ClientSlot { stream, printer }) = self.slots[index].take() else {
            return ServiceOutcome::Empty;
        };
        let success = stream.finished_cleanly();
        drop(stream);
        info!(slot = index, printer, success, "client disconnected");
        if let Some(target) = printers.get_mut(printer) {
            target.end_job(index, success);
        }
        ServiceOutcome::Reaped
    }
}

impl<S: JobSource, const N: usize> Default for SlotTable<S, N> {
    fn default() -> Self {
        Self::new()
    }
}

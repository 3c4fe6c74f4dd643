//! # Extended LVT Offset Allocation
//!
//! Each CPU registers at most one LVT offset per interrupt kind during a
//! bring-up pass. The first request attempts the registration; every later
//! request in the same pass gets the remembered outcome without touching
//! the interrupt controller again.
//!
//! ```text
//!            ┌─────────────┐  setup_eilvt ok   ┌──────────────┐
//!  reserve ─▶│ Unattempted │──────────────────▶│ Reserved(n)  │──▶ Some(n)
//!            └──────┬──────┘                   └──────────────┘
//!                   │ setup_eilvt failed       ┌──────────────┐
//!                   └─────────────────────────▶│    Failed    │──▶ None
//!                                              └──────────────┘
//! ```

use mca_hal::{CpuId, EilvtMessage, ExtendedLvt};

/// Interrupt routed through an extended LVT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    /// Threshold counter overflow
    Threshold,
    /// Deferred error
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    Unattempted,
    Reserved(u8),
    Failed,
}

/// Per-CPU, per-pass LVT offset reservations
#[derive(Debug, Clone)]
pub struct VectorAllocator {
    threshold_vector: u8,
    deferred_vector: u8,
    threshold: Reservation,
    deferred: Reservation,
}

impl VectorAllocator {
    /// Fresh allocator for one bring-up pass
    pub const fn new(threshold_vector: u8, deferred_vector: u8) -> Self {
        Self {
            threshold_vector,
            deferred_vector,
            threshold: Reservation::Unattempted,
            deferred: Reservation::Unattempted,
        }
    }

    /// Reserve an LVT offset for `kind`, preferring `preferred`
    ///
    /// Returns the granted offset, which may differ from `preferred` when an
    /// earlier request in this pass already succeeded.
    pub fn reserve<L: ExtendedLvt + ?Sized>(
        &mut self,
        lvt: &L,
        cpu: CpuId,
        kind: VectorKind,
        preferred: u8,
    ) -> Option<u8> {
        let vector = self.vector(kind);
        let slot = match kind {
            VectorKind::Threshold => &mut self.threshold,
            VectorKind::Deferred => &mut self.deferred,
        };

        match *slot {
            Reservation::Reserved(offset) => Some(offset),
            Reservation::Failed => None,
            Reservation::Unattempted => {
                match lvt.setup_eilvt(cpu, preferred, vector, EilvtMessage::Fixed, false) {
                    Ok(()) => {
                        log::debug!(
                            "cpu {}: {:?} vector {:#x} on LVT offset {}",
                            cpu,
                            kind,
                            vector,
                            preferred
                        );
                        *slot = Reservation::Reserved(preferred);
                        Some(preferred)
                    },
                    Err(err) => {
                        log::warn!(
                            "cpu {}: cannot route {:?} interrupts through LVT offset {}: {}",
                            cpu,
                            kind,
                            preferred,
                            err
                        );
                        *slot = Reservation::Failed;
                        None
                    },
                }
            },
        }
    }

    /// Offset granted for `kind` in this pass
    pub fn granted(&self, kind: VectorKind) -> Option<u8> {
        let slot = match kind {
            VectorKind::Threshold => self.threshold,
            VectorKind::Deferred => self.deferred,
        };
        match slot {
            Reservation::Reserved(offset) => Some(offset),
            _ => None,
        }
    }

    /// Interrupt vector used for `kind`
    pub const fn vector(&self, kind: VectorKind) -> u8 {
        match kind {
            VectorKind::Threshold => self.threshold_vector,
            VectorKind::Deferred => self.deferred_vector,
        }
    }
}

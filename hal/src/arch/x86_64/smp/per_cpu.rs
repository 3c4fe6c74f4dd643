//! # Per-CPU Data Management
//!
//! Lock-protected per-CPU slots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PerCpu<T>                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │ slot 0   │ spin::Mutex<T>                                   │
//! │ slot 1   │ spin::Mutex<T>                                   │
//! │  ...     │                                                  │
//! │ slot n-1 │ spin::Mutex<T>                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A slot is normally only locked by its own CPU (interrupt handlers, or
//! code delivered by a cross-call). The lock makes that serialisation
//! explicit and keeps host-side tests sound.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use super::{CpuId, MAX_CPUS};

// =============================================================================
// Per-CPU Slots
// =============================================================================

/// One lock-protected value per logical CPU
pub struct PerCpu<T> {
    slots: Box<[Mutex<T>]>,
}

impl<T> PerCpu<T> {
    /// Create `nr_cpus` slots (capped at [`MAX_CPUS`]) using `init`
    pub fn new_with(nr_cpus: usize, mut init: impl FnMut(CpuId) -> T) -> Self {
        let nr = nr_cpus.min(MAX_CPUS);
        let slots: Vec<Mutex<T>> = (0..nr).map(|cpu| Mutex::new(init(cpu as CpuId))).collect();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lock the slot of `cpu`
    pub fn lock(&self, cpu: CpuId) -> Option<MutexGuard<'_, T>> {
        self.slots.get(cpu as usize).map(Mutex::lock)
    }

    /// Try to lock the slot of `cpu` without spinning
    pub fn try_lock(&self, cpu: CpuId) -> Option<MutexGuard<'_, T>> {
        self.slots.get(cpu as usize).and_then(Mutex::try_lock)
    }
}

impl<T: Default> PerCpu<T> {
    /// Create `nr_cpus` default-initialised slots
    pub fn new(nr_cpus: usize) -> Self {
        Self::new_with(nr_cpus, |_| T::default())
    }
}

impl<T> core::fmt::Debug for PerCpu<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PerCpu").field("cpus", &self.slots.len()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_initialised_per_cpu() {
        let percpu = PerCpu::new_with(4, |cpu| cpu * 10);
        assert_eq!(percpu.len(), 4);
        assert_eq!(*percpu.lock(3).unwrap(), 30);
        assert!(percpu.lock(4).is_none());
    }

    #[test]
    fn test_slot_capacity_capped() {
        let percpu: PerCpu<u8> = PerCpu::new(MAX_CPUS + 8);
        assert_eq!(percpu.len(), MAX_CPUS);
    }

    #[test]
    fn test_try_lock_contended() {
        let percpu: PerCpu<u32> = PerCpu::new(1);
        let guard = percpu.lock(0).unwrap();
        assert!(percpu.try_lock(0).is_none());
        drop(guard);
        assert!(percpu.try_lock(0).is_some());
    }
}

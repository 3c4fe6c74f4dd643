//! # Simulated Platform
//!
//! Host-side stand-in for the machine-check hardware, used by unit tests of
//! this crate and of the threshold subsystem.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         SimPlatform                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │  cpu 0: MSR file (BTreeMap)  │  LVT[4]  │  eilvt calls        │
//! │  cpu 1: MSR file (BTreeMap)  │  LVT[4]  │  eilvt calls        │
//! │  ...                                                          │
//! │  shared: EilvtTable, cross-call counter, clock                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registers that were never populated read as unavailable, which is how
//! absent or disabled banks are modelled. Cross-calls run the function
//! inline on the calling thread.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::x86_64::apic::{
    ApicError, EilvtMessage, EilvtTable, ExtendedLvt, APIC_EILVT_MASKED, EILVT_NR_MAX,
};
use crate::arch::x86_64::core::msr::{MsrAccess, MsrError};
use crate::arch::x86_64::smp::{CpuId, CrossCall, SmpError};
use crate::arch::x86_64::timers::Clock;

/// Per-CPU simulated state
#[derive(Debug)]
struct SimCpu {
    msrs: Mutex<BTreeMap<u32, u64>>,
    lvt: Mutex<[u32; EILVT_NR_MAX]>,
    eilvt_calls: AtomicUsize,
}

impl SimCpu {
    fn new() -> Self {
        Self {
            msrs: Mutex::new(BTreeMap::new()),
            lvt: Mutex::new([APIC_EILVT_MASKED; EILVT_NR_MAX]),
            eilvt_calls: AtomicUsize::new(0),
        }
    }
}

/// Simulated multi-CPU machine-check platform
#[derive(Debug)]
pub struct SimPlatform {
    cpus: Vec<SimCpu>,
    table: EilvtTable,
    current: AtomicU32,
    cross_calls: AtomicUsize,
    fail_cross_calls: AtomicBool,
    fail_eilvt: AtomicBool,
    time: AtomicU64,
}

impl SimPlatform {
    /// Create a platform with `nr_cpus` CPUs and empty register files
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            cpus: (0..nr_cpus).map(|_| SimCpu::new()).collect(),
            table: EilvtTable::new(),
            current: AtomicU32::new(0),
            cross_calls: AtomicUsize::new(0),
            fail_cross_calls: AtomicBool::new(false),
            fail_eilvt: AtomicBool::new(false),
            time: AtomicU64::new(0),
        }
    }

    /// Number of simulated CPUs
    pub fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    fn cpu(&self, cpu: CpuId) -> Option<&SimCpu> {
        self.cpus.get(cpu as usize)
    }

    // =========================================================================
    // MSR file
    // =========================================================================

    /// Populate (or overwrite) a register
    pub fn set_msr(&self, cpu: CpuId, msr: u32, value: u64) {
        if let Some(sim) = self.cpu(cpu) {
            sim.msrs.lock().insert(msr, value);
        }
    }

    /// Current register value, `None` if unimplemented
    pub fn msr(&self, cpu: CpuId, msr: u32) -> Option<u64> {
        self.cpu(cpu)?.msrs.lock().get(&msr).copied()
    }

    /// Make a register unavailable
    pub fn remove_msr(&self, cpu: CpuId, msr: u32) {
        if let Some(sim) = self.cpu(cpu) {
            sim.msrs.lock().remove(&msr);
        }
    }

    // =========================================================================
    // Extended LVT
    // =========================================================================

    /// Shared reservation table
    pub fn eilvt_table(&self) -> &EilvtTable {
        &self.table
    }

    /// Raw LVT entry programmed on `cpu`
    pub fn lvt(&self, cpu: CpuId, offset: u8) -> Option<u32> {
        self.cpu(cpu)?.lvt.lock().get(offset as usize).copied()
    }

    /// Number of `setup_eilvt` calls made for `cpu`
    pub fn eilvt_calls(&self, cpu: CpuId) -> usize {
        self.cpu(cpu)
            .map_or(0, |sim| sim.eilvt_calls.load(Ordering::SeqCst))
    }

    /// Make every subsequent `setup_eilvt` fail
    pub fn set_eilvt_failure(&self, fail: bool) {
        self.fail_eilvt.store(fail, Ordering::SeqCst);
    }

    // =========================================================================
    // Cross-calls and time
    // =========================================================================

    /// Select the CPU reported as executing
    pub fn set_current_cpu(&self, cpu: CpuId) {
        self.current.store(cpu, Ordering::SeqCst);
    }

    /// Number of successful cross-calls
    pub fn cross_calls(&self) -> usize {
        self.cross_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent cross-call fail
    pub fn set_cross_call_failure(&self, fail: bool) {
        self.fail_cross_calls.store(fail, Ordering::SeqCst);
    }

    /// Set the value returned by [`Clock::timestamp`]
    pub fn set_time(&self, time: u64) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl MsrAccess for SimPlatform {
    fn read_msr(&self, cpu: CpuId, msr: u32) -> Result<u64, MsrError> {
        self.msr(cpu, msr).ok_or(MsrError::Unavailable(msr))
    }

    fn write_msr(&self, cpu: CpuId, msr: u32, value: u64) -> Result<(), MsrError> {
        let sim = self.cpu(cpu).ok_or(MsrError::Unavailable(msr))?;
        let mut msrs = sim.msrs.lock();
        match msrs.get_mut(&msr) {
            Some(slot) => {
                *slot = value;
                Ok(())
            },
            None => Err(MsrError::Unavailable(msr)),
        }
    }
}

impl ExtendedLvt for SimPlatform {
    fn setup_eilvt(
        &self,
        cpu: CpuId,
        offset: u8,
        vector: u8,
        msg: EilvtMessage,
        masked: bool,
    ) -> Result<(), ApicError> {
        let sim = self.cpu(cpu).ok_or(ApicError::NotPresent)?;
        sim.eilvt_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_eilvt.load(Ordering::SeqCst) {
            return Err(ApicError::NotPresent);
        }

        let mut lvt = sim.lvt.lock();
        let current = *lvt
            .get(offset as usize)
            .ok_or(ApicError::InvalidOffset(offset))?;
        let new = self.table.prepare(cpu, offset, current, vector, msg, masked)?;
        lvt[offset as usize] = new;
        Ok(())
    }
}

impl CrossCall for SimPlatform {
    fn current_cpu(&self) -> CpuId {
        self.current.load(Ordering::SeqCst)
    }

    fn run_on(&self, cpu: CpuId, f: &mut dyn FnMut()) -> Result<(), SmpError> {
        if self.cpu(cpu).is_none() {
            return Err(SmpError::InvalidCpu(cpu));
        }
        if self.fail_cross_calls.load(Ordering::SeqCst) {
            return Err(SmpError::CpuOffline(cpu));
        }
        f();
        self.cross_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Clock for SimPlatform {
    fn timestamp(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }
}

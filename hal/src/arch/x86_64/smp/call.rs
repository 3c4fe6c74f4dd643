//! # Cross-CPU Calls

use super::{CpuId, SmpError, MAX_CPUS};

/// Blocking "run on CPU N" primitive
///
/// `run_on` returns only after `f` has completed on `cpu`. The function runs
/// with interrupts disabled on the target so it serialises with interrupt
/// handlers there.
pub trait CrossCall: Send + Sync {
    /// Logical id of the executing CPU
    fn current_cpu(&self) -> CpuId;

    /// Run `f` on `cpu` and wait for it to complete
    fn run_on(&self, cpu: CpuId, f: &mut dyn FnMut()) -> Result<(), SmpError>;
}

/// Cross-call that only supports the executing CPU
///
/// Used during early bring-up, before the kernel's IPI-based call
/// mechanism is available.
#[derive(Debug)]
pub struct LocalCall {
    current_cpu: fn() -> CpuId,
}

impl LocalCall {
    /// Create a local-only cross-call
    pub const fn new(current_cpu: fn() -> CpuId) -> Self {
        Self { current_cpu }
    }
}

impl CrossCall for LocalCall {
    fn current_cpu(&self) -> CpuId {
        (self.current_cpu)()
    }

    fn run_on(&self, cpu: CpuId, f: &mut dyn FnMut()) -> Result<(), SmpError> {
        if cpu as usize >= MAX_CPUS {
            return Err(SmpError::InvalidCpu(cpu));
        }
        if cpu != (self.current_cpu)() {
            return Err(SmpError::RemoteCallUnsupported(cpu));
        }
        f();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_two() -> CpuId {
        2
    }

    #[test]
    fn test_local_call_runs_on_self() {
        let call = LocalCall::new(cpu_two);
        let mut ran = false;
        call.run_on(2, &mut || ran = true).unwrap();
        assert!(ran);
    }

    #[test]
    fn test_local_call_rejects_remote() {
        let call = LocalCall::new(cpu_two);
        let mut ran = false;
        assert_eq!(
            call.run_on(1, &mut || ran = true),
            Err(SmpError::RemoteCallUnsupported(1))
        );
        assert!(!ran);
        assert_eq!(
            call.run_on(MAX_CPUS as CpuId, &mut || ran = true),
            Err(SmpError::InvalidCpu(MAX_CPUS as CpuId))
        );
    }
}

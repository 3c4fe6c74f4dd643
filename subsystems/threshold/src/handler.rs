//! # Interrupt Handlers
//!
//! Both handlers run on the interrupted CPU with its state locked.
//!
//! ```text
//! threshold                               deferred
//! ─────────                               ────────
//! for bank in bank map:                   for bank in 0..num_banks:
//!   for block in bank (head first):         STATUS valid  ─▶ log, clear STATUS
//!     overflow?  ─▶ log STATUS                               (+ DESTAT, scalable)
//!                   clear STATUS          else, scalable:
//!                   (+ DESTAT, scalable)    DESTAT valid  ─▶ log, clear DESTAT
//!                   re-arm block
//! ```
//!
//! Records matching a known erratum are dropped; the status register is
//! cleared either way.

use mca_hal::msr::{addr, McStatus, ThresholdMisc};

use crate::config::CpuModel;
use crate::cpu::CpuState;
use crate::errata;
use crate::program::{self, ProgramMode};
use crate::record;
use crate::sink::ErrorSink;
use crate::Platform;

/// Everything needed to turn a status register into a forwarded record
struct BankLogger<'a, P: ?Sized, S: ?Sized> {
    platform: &'a P,
    state: &'a CpuState,
    sink: &'a S,
    model: CpuModel,
}

impl<P: Platform + ?Sized, S: ErrorSink + ?Sized> BankLogger<'_, P, S> {
    /// Log one status register if it holds a valid error and clear it
    ///
    /// Returns whether an error was found.
    fn log_bank(&self, bank: u32, status_register: u32, addr_register: u32, misc: u64) -> bool {
        let cpu = self.state.cpu;
        let Ok(status) = self.platform.read_msr(cpu, status_register) else {
            return false;
        };
        if !McStatus::from_raw(status).is_valid() {
            return false;
        }

        let record = record::extract(self.platform, self.state, bank, status, misc, addr_register);
        if errata::should_filter(&record, self.model) {
            log::debug!("cpu {}: bank {} error filtered (status {:#x})", cpu, bank, status);
        } else {
            self.sink.forward(&record);
        }

        if let Err(err) = self.platform.write_msr(cpu, status_register, 0) {
            log::warn!("cpu {}: cannot clear bank {} status: {}", cpu, bank, err);
        }
        true
    }

    /// Log the primary status register; under the scalable scheme a logged
    /// error also clears DESTAT
    fn log_primary(&self, bank: u32, misc: u64) -> bool {
        let scheme = self.state.scheme;
        let logged = self.log_bank(
            bank,
            scheme.status_register(bank),
            scheme.addr_register(bank),
            misc,
        );

        if logged && scheme.is_scalable() {
            let cpu = self.state.cpu;
            if let Err(err) = self.platform.write_msr(cpu, addr::smca_destat(bank), 0) {
                log::warn!("cpu {}: cannot clear bank {} deferred status: {}", cpu, bank, err);
            }
        }
        logged
    }
}

/// Threshold counter overflow
pub fn threshold_interrupt<P, S>(platform: &P, state: &CpuState, sink: &S, model: CpuModel)
where
    P: Platform + ?Sized,
    S: ErrorSink + ?Sized,
{
    if state.banks().is_none() {
        return;
    }
    let logger = BankLogger {
        platform,
        state,
        sink,
        model,
    };

    for bank in state.bank_map.iter().filter(|&bank| bank < state.num_banks) {
        let Some(entry) = state.bank(bank) else {
            continue;
        };

        for block in entry.blocks() {
            let Ok(raw) = platform.read_msr(block.cpu, block.address) else {
                continue;
            };
            if !ThresholdMisc::from_raw(raw).overflowed() {
                continue;
            }

            logger.log_primary(bank, raw);

            if let Err(err) = program::program(platform, state.scheme, block, ProgramMode::Reset) {
                log::warn!(
                    "cpu {}: cannot re-arm bank {} block {}: {}",
                    block.cpu,
                    bank,
                    block.block,
                    err
                );
            }
        }
    }
}

/// Deferred error
pub fn deferred_interrupt<P, S>(platform: &P, state: &CpuState, sink: &S, model: CpuModel)
where
    P: Platform + ?Sized,
    S: ErrorSink + ?Sized,
{
    if state.banks().is_none() {
        return;
    }
    let logger = BankLogger {
        platform,
        state,
        sink,
        model,
    };

    for bank in 0..state.num_banks {
        if logger.log_primary(bank, 0) {
            continue;
        }
        // Only deferred errors land in DESTAT/DEADDR
        if state.scheme.is_scalable() {
            logger.log_bank(bank, addr::smca_destat(bank), addr::smca_deaddr(bank), 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ThresholdBank, ThresholdBlock};
    use crate::config::{McaFeatures, ThresholdConfig};
    use crate::sink::RecordingSink;
    use mca_hal::sim::SimPlatform;

    const VAL: u64 = 1 << 63;
    const VALID: u64 = 1 << 63;
    const CNTP: u64 = 1 << 62;
    const OVERFLOW: u64 = 1 << 48;
    const MODEL: CpuModel = CpuModel::new(0x19, 0x01);

    fn legacy_bank4(sim: &SimPlatform) -> CpuState {
        let mut state = CpuState::new(0, &ThresholdConfig::new(6)).unwrap();
        sim.set_msr(0, 0x413, VALID | CNTP);
        let head = ThresholdBlock::new(0, 4, 0, 0x413, ThresholdMisc::from_raw(VALID | CNTP));
        state.staged.resize_with(4, || None);
        state.staged.push(Some(ThresholdBank::new(head).unwrap()));
        state.bank_map.set(4);
        state.publish();
        state
    }

    fn scalable(sim: &SimPlatform) -> CpuState {
        let config = ThresholdConfig::new(2)
            .with_features(McaFeatures::SCALABLE | McaFeatures::THRESHOLD | McaFeatures::SUCCOR);
        let mut state = CpuState::new(0, &config).unwrap();
        for bank in 0..2 {
            sim.set_msr(0, addr::smca_status(bank), 0);
            sim.set_msr(0, addr::smca_destat(bank), 0);
        }
        state.publish();
        state
    }

    #[test]
    fn test_threshold_logs_and_rearms() {
        let sim = SimPlatform::new(1);
        let state = legacy_bank4(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, 0x413, VALID | CNTP | OVERFLOW | (0xFFF << 32));
        sim.set_msr(0, addr::mc_status(4), VAL | (0x8 << 16));

        threshold_interrupt(&sim, &state, &sink, MODEL);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bank, 4);
        assert_eq!(records[0].misc, VALID | CNTP | OVERFLOW | (0xFFF << 32));
        assert!(records[0].is_memory_error());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(0));
        assert_eq!(sim.msr(0, 0x413).unwrap() & OVERFLOW, 0);
    }

    #[test]
    fn test_threshold_ignores_quiet_blocks() {
        let sim = SimPlatform::new(1);
        let state = legacy_bank4(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, addr::mc_status(4), VAL);

        threshold_interrupt(&sim, &state, &sink, MODEL);
        assert!(sink.is_empty());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(VAL));
    }

    #[test]
    fn test_filtered_record_still_cleared() {
        let sim = SimPlatform::new(1);
        let state = legacy_bank4(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, 0x413, VALID | CNTP | OVERFLOW);
        sim.set_msr(0, addr::mc_status(4), VAL | (0x5 << 16));

        threshold_interrupt(&sim, &state, &sink, CpuModel::new(0x15, 0x02));
        assert!(sink.is_empty());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(0));
    }

    #[test]
    fn test_unpublished_is_noop() {
        let sim = SimPlatform::new(1);
        let mut state = legacy_bank4(&sim);
        let sink = RecordingSink::new();
        state.unpublish();
        sim.set_msr(0, 0x413, VALID | CNTP | OVERFLOW);
        sim.set_msr(0, addr::mc_status(4), VAL);

        threshold_interrupt(&sim, &state, &sink, MODEL);
        deferred_interrupt(&sim, &state, &sink, MODEL);
        assert!(sink.is_empty());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(VAL));
    }

    #[test]
    fn test_deferred_primary_clears_destat() {
        let sim = SimPlatform::new(1);
        let state = scalable(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, addr::smca_status(1), VAL | (1 << 44));
        sim.set_msr(0, addr::smca_destat(1), VAL | (1 << 44));

        deferred_interrupt(&sim, &state, &sink, MODEL);
        assert_eq!(sink.len(), 1);
        assert!(sink.records()[0].is_deferred());
        assert_eq!(sim.msr(0, addr::smca_status(1)), Some(0));
        assert_eq!(sim.msr(0, addr::smca_destat(1)), Some(0));
    }

    #[test]
    fn test_destat_clear_failure_tolerated() {
        let sim = SimPlatform::new(1);
        let state = scalable(&sim);
        let sink = RecordingSink::new();
        sim.remove_msr(0, addr::smca_destat(0));
        sim.set_msr(0, addr::smca_status(0), VAL | (1 << 44));

        deferred_interrupt(&sim, &state, &sink, MODEL);
        assert_eq!(sink.len(), 1);
        assert_eq!(sim.msr(0, addr::smca_status(0)), Some(0));
        assert_eq!(sim.msr(0, addr::smca_destat(0)), None);
    }

    #[test]
    fn test_deferred_from_destat() {
        let sim = SimPlatform::new(1);
        let state = scalable(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, addr::smca_destat(0), VAL | (1 << 44) | (1 << 58));
        sim.set_msr(0, addr::smca_deaddr(0), 0x1000);

        deferred_interrupt(&sim, &state, &sink, MODEL);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, Some(0x1000));
        assert_eq!(sim.msr(0, addr::smca_destat(0)), Some(0));
    }

    #[test]
    fn test_legacy_deferred_never_touches_destat() {
        let sim = SimPlatform::new(1);
        let state = legacy_bank4(&sim);
        let sink = RecordingSink::new();
        sim.set_msr(0, addr::mc_status(2), VAL | (1 << 44));
        sim.set_msr(0, addr::smca_destat(2), VAL);

        deferred_interrupt(&sim, &state, &sink, MODEL);
        assert_eq!(sink.len(), 1);
        assert_eq!(sim.msr(0, addr::mc_status(2)), Some(0));
        assert_eq!(sim.msr(0, addr::smca_destat(2)), Some(VAL));
    }
}

//! # Threshold Subsystem
//!
//! Owns the platform, the error sink and one [`CpuState`] per logical CPU,
//! and exposes the hotplug lifecycle, the runtime tunables and the two
//! interrupt entry points.
//!
//! ## Lifecycle
//!
//! ```text
//!            on_core_feature_init          on_core_attach
//!  (none) ──────────────────────▶ staged ─────────────────▶ published
//!    ▲                                                         │
//!    └──────────────────── on_core_detach ◀────────────────────┘
//!                      (clear under lock, free after)
//! ```
//!
//! ## Tunables
//!
//! Writes are delivered to the owning CPU through [`CrossCall::run_on`]
//! and reprogram the block there. Reads that only need bookkeeping take
//! the per-CPU lock directly.

use alloc::string::String;
use core::sync::atomic::{AtomicBool, Ordering};

use mca_hal::msr::{addr, DeferredErrorConfig};
use mca_hal::{CpuId, PerCpu, MAX_CPUS};

use crate::catalog::BankType;
use crate::classify;
use crate::config::{McaFeatures, ThresholdConfig};
use crate::cpu::CpuState;
use crate::discovery;
use crate::errata;
use crate::error::{McaError, McaResult};
use crate::handler;
use crate::naming;
use crate::program::{self, ProgramMode};
use crate::sink::ErrorSink;
use crate::vector::VectorKind;
use crate::Platform;

/// The threshold subsystem
#[derive(Debug)]
pub struct ThresholdSubsystem<P: Platform, S: ErrorSink> {
    platform: P,
    sink: S,
    config: ThresholdConfig,
    cpus: PerCpu<Option<CpuState>>,
    /// Some CPU routed its threshold blocks to the APIC
    thresholding_irq_en: AtomicBool,
    /// Threshold interrupts are dispatched to the handler
    threshold_dispatch: AtomicBool,
    /// Deferred-error interrupts are dispatched to the handler
    deferred_dispatch: AtomicBool,
}

impl<P: Platform, S: ErrorSink> ThresholdSubsystem<P, S> {
    /// Create the subsystem for `nr_cpus` logical CPUs
    pub fn new(platform: P, sink: S, config: ThresholdConfig, nr_cpus: usize) -> McaResult<Self> {
        config.validate()?;
        if nr_cpus > MAX_CPUS {
            return Err(McaError::InvalidConfig("too many cpus"));
        }

        log::info!(
            "MCA threshold: {} banks, {:?} scheme, features {:?}",
            config.num_banks,
            config.scheme(),
            config.features
        );

        Ok(Self {
            platform,
            sink,
            config,
            cpus: PerCpu::new_with(nr_cpus, |_| None),
            thresholding_irq_en: AtomicBool::new(false),
            threshold_dispatch: AtomicBool::new(false),
            deferred_dispatch: AtomicBool::new(false),
        })
    }

    /// Hardware backend
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Record consumer
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Active configuration
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Threshold interrupts reach the handler
    pub fn threshold_dispatch_installed(&self) -> bool {
        self.threshold_dispatch.load(Ordering::Acquire)
    }

    /// Deferred-error interrupts reach the handler
    pub fn deferred_dispatch_installed(&self) -> bool {
        self.deferred_dispatch.load(Ordering::Acquire)
    }

    /// Inspect the state of `cpu`
    pub fn with_state<R>(&self, cpu: CpuId, f: impl FnOnce(&CpuState) -> R) -> McaResult<R> {
        let slot = self.cpus.lock(cpu).ok_or(McaError::InvalidCpu(cpu))?;
        let state = slot.as_ref().ok_or(McaError::NoDevice)?;
        Ok(f(state))
    }

    fn locked<R>(
        &self,
        cpu: CpuId,
        f: impl FnOnce(&mut CpuState) -> McaResult<R>,
    ) -> McaResult<R> {
        let mut slot = self.cpus.lock(cpu).ok_or(McaError::InvalidCpu(cpu))?;
        let state = slot.as_mut().ok_or(McaError::NoDevice)?;
        f(state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bring up machine-check thresholding on `cpu`
    ///
    /// Must run on `cpu`. Classifies and configures every bank, applies
    /// errata, discovers and programs the threshold blocks and enables
    /// deferred-error interrupts. The blocks stay staged until
    /// [`on_core_attach`](Self::on_core_attach). An earlier state of the
    /// same CPU is replaced.
    pub fn on_core_feature_init(&self, cpu: CpuId) -> McaResult<()> {
        if cpu as usize >= self.cpus.len() {
            return Err(McaError::InvalidCpu(cpu));
        }
        let fresh = CpuState::new(cpu, &self.config)?;

        let mut slot = self.cpus.lock(cpu).ok_or(McaError::InvalidCpu(cpu))?;
        let stale = slot.take().and_then(|mut old| old.unpublish());
        let state = slot.insert(fresh);

        let result = self.init_banks(state);
        if self.config.features.contains(McaFeatures::SUCCOR) {
            self.enable_deferred(state);
        }
        drop(slot);
        drop(stale);

        if let Err(err) = result {
            log::error!("cpu {}: threshold bring-up incomplete: {}", cpu, err);
        }
        result
    }

    fn init_banks(&self, state: &mut CpuState) -> McaResult<()> {
        let thresholding = self.config.features.contains(McaFeatures::THRESHOLD);

        for bank in 0..state.num_banks {
            if state.scheme.is_scalable() {
                classify::classify(&self.platform, state, bank);
                classify::configure_bank(&self.platform, state, bank);
            }

            let bank_type = state.bank_type(bank);
            if let Err(err) = errata::disable_err_thresholding(
                &self.platform,
                state.cpu,
                self.config.model,
                bank,
                bank_type,
            ) {
                log::warn!("cpu {}: bank {} errata workaround failed: {}", state.cpu, bank, err);
            }

            let mut entry = None;
            if thresholding {
                if let Some(found) = discovery::discover(&self.platform, state, bank)? {
                    for block in found.blocks() {
                        match program::initial_setup(&self.platform, state, block) {
                            Ok(true) => self.thresholding_irq_en.store(true, Ordering::Release),
                            Ok(false) => {},
                            Err(err) => log::warn!(
                                "cpu {}: cannot program bank {} block {}: {}",
                                state.cpu,
                                bank,
                                block.block,
                                err
                            ),
                        }
                    }
                    entry = Some(found);
                }
            }
            state.staged.push(entry);
        }
        Ok(())
    }

    fn enable_deferred(&self, state: &mut CpuState) {
        let Ok(raw) = self.platform.read_msr(state.cpu, addr::CU_DEF_ERR) else {
            return;
        };
        let mut def = DeferredErrorConfig::from_raw(raw);

        let mut offset = def.deferred_lvt_offset();
        if offset == 0 {
            log::error!(
                "[Firmware Bug]: Your BIOS is not setting up LVT offset 0x2 for deferred error IRQs correctly."
            );
            offset = DeferredErrorConfig::DEFAULT_DEF_LVT_OFFSET;
            def.set_deferred_lvt_offset(offset);
        }

        if state
            .vectors
            .reserve(&self.platform, state.cpu, VectorKind::Deferred, offset)
            .is_some()
        {
            self.deferred_dispatch.store(true, Ordering::Release);
        }

        if !state.scheme.is_scalable() {
            def.set_deferred_apic();
        }

        if let Err(err) = self.platform.write_msr(state.cpu, addr::CU_DEF_ERR, def.raw()) {
            log::warn!("cpu {}: cannot write CU_DEF_ERR: {}", state.cpu, err);
        }
    }

    /// Publish the blocks staged for `cpu`
    pub fn on_core_attach(&self, cpu: CpuId) -> McaResult<()> {
        let mut slot = self.cpus.lock(cpu).ok_or(McaError::InvalidCpu(cpu))?;
        let state = slot.as_mut().ok_or(McaError::NoDevice)?;

        if !state.publish() {
            log::debug!("cpu {}: threshold banks already attached", cpu);
            return Ok(());
        }
        drop(slot);

        if self.thresholding_irq_en.load(Ordering::Acquire) {
            self.threshold_dispatch.store(true, Ordering::Release);
        }
        log::debug!("cpu {}: threshold banks attached", cpu);
        Ok(())
    }

    /// Withdraw the blocks of `cpu`
    ///
    /// Handlers running after this see no blocks. The lists are freed once
    /// the per-CPU lock is released.
    pub fn on_core_detach(&self, cpu: CpuId) -> McaResult<()> {
        let mut slot = self.cpus.lock(cpu).ok_or(McaError::InvalidCpu(cpu))?;
        let handle = slot.as_mut().and_then(CpuState::unpublish);
        drop(slot);

        if handle.is_some() {
            log::debug!("cpu {}: threshold banks detached", cpu);
        }
        drop(handle);
        Ok(())
    }

    // =========================================================================
    // Tunables
    // =========================================================================

    /// Run `f` on `cpu` with its state locked
    fn on_cpu<R>(
        &self,
        cpu: CpuId,
        f: impl FnOnce(&P, &mut CpuState) -> McaResult<R>,
    ) -> McaResult<R> {
        if cpu as usize >= self.cpus.len() {
            return Err(McaError::InvalidCpu(cpu));
        }

        let mut f = Some(f);
        let mut result = Err(McaError::NoDevice);
        let mut call = || {
            if let Some(f) = f.take() {
                result = self.locked(cpu, |state| f(&self.platform, state));
            }
        };

        if let Err(err) = self.platform.run_on(cpu, &mut call) {
            log::warn!("cpu {}: tunable not applied: {}", cpu, err);
            return Err(McaError::NoDevice);
        }
        result
    }

    /// Current threshold limit of a block
    pub fn threshold_limit(&self, cpu: CpuId, bank: u32, block: u32) -> McaResult<u16> {
        self.with_state(cpu, |state| {
            state.banks().ok_or(McaError::NoDevice)?;
            state
                .block(bank, block)
                .map(|b| b.threshold_limit)
                .ok_or(McaError::NotFound)
        })?
    }

    /// Set the threshold limit of a block, clamped to `1..=0xFFF`
    ///
    /// Errors counted so far carry over to the new limit.
    pub fn set_threshold_limit(
        &self,
        cpu: CpuId,
        bank: u32,
        block: u32,
        limit: u16,
    ) -> McaResult<()> {
        self.on_cpu(cpu, |platform, state| {
            let scheme = state.scheme;
            state.banks().ok_or(McaError::NoDevice)?;
            let b = state.block_mut(bank, block).ok_or(McaError::NotFound)?;
            let old = b.set_threshold_limit(limit);
            program::program(platform, scheme, b, ProgramMode::LimitChange(old))
        })
    }

    /// Whether a block raises interrupts
    pub fn interrupt_enable(&self, cpu: CpuId, bank: u32, block: u32) -> McaResult<bool> {
        self.with_state(cpu, |state| {
            state.banks().ok_or(McaError::NoDevice)?;
            state
                .block(bank, block)
                .map(|b| b.interrupt_enabled)
                .ok_or(McaError::NotFound)
        })?
    }

    /// Enable or disable interrupts of a block
    ///
    /// Rejected with [`McaError::InvalidArgument`] for blocks that cannot
    /// interrupt.
    pub fn set_interrupt_enable(
        &self,
        cpu: CpuId,
        bank: u32,
        block: u32,
        enable: bool,
    ) -> McaResult<()> {
        self.on_cpu(cpu, |platform, state| {
            let scheme = state.scheme;
            state.banks().ok_or(McaError::NoDevice)?;
            let b = state.block_mut(bank, block).ok_or(McaError::NotFound)?;
            if !b.interrupt_capable {
                return Err(McaError::InvalidArgument);
            }
            b.interrupt_enabled = enable;
            let limit = b.threshold_limit;
            program::program(platform, scheme, b, ProgramMode::LimitChange(limit))
        })
    }

    /// Errors counted by a block since it was last armed
    pub fn error_count(&self, cpu: CpuId, bank: u32, block: u32) -> McaResult<u16> {
        self.on_cpu(cpu, |platform, state| {
            state.banks().ok_or(McaError::NoDevice)?;
            let b = state.block(bank, block).ok_or(McaError::NotFound)?;
            program::error_count(platform, b)
        })
    }

    /// Name of a bank
    pub fn bank_name(&self, cpu: CpuId, bank: u32) -> McaResult<String> {
        self.with_state(cpu, |state| {
            if bank >= state.num_banks {
                return Err(McaError::NotFound);
            }
            Ok(naming::bank_name(state, bank))
        })?
    }

    /// Name of a block
    pub fn block_name(&self, cpu: CpuId, bank: u32, block: u32) -> McaResult<String> {
        self.with_state(cpu, |state| {
            state.banks().ok_or(McaError::NoDevice)?;
            let b = state.block(bank, block).ok_or(McaError::NotFound)?;
            Ok(naming::block_name(state, b))
        })?
    }

    /// Classified type of a bank, `None` when unknown or not classified
    pub fn bank_type(&self, cpu: CpuId, bank: u32) -> Option<BankType> {
        self.with_state(cpu, |state| state.bank_type(bank)).ok().flatten()
    }

    // =========================================================================
    // Interrupt Entry
    // =========================================================================

    /// Threshold interrupt on `cpu`
    pub fn threshold_interrupt(&self, cpu: CpuId) {
        if !self.threshold_dispatch_installed() {
            log::error!(
                "Unexpected threshold interrupt at vector {:#x}",
                self.config.threshold_vector
            );
            return;
        }

        // The interrupted context may hold the slot on this CPU
        let Some(slot) = self.cpus.try_lock(cpu) else {
            log::debug!("cpu {}: threshold interrupt while state is busy", cpu);
            return;
        };
        if let Some(state) = slot.as_ref() {
            handler::threshold_interrupt(&self.platform, state, &self.sink, self.config.model);
        }
    }

    /// Deferred-error interrupt on `cpu`
    pub fn deferred_error_interrupt(&self, cpu: CpuId) {
        if !self.deferred_dispatch_installed() {
            log::error!(
                "Unexpected deferred interrupt at vector {:#x}",
                self.config.deferred_vector
            );
            return;
        }

        // The interrupted context may hold the slot on this CPU
        let Some(slot) = self.cpus.try_lock(cpu) else {
            log::debug!("cpu {}: deferred interrupt while state is busy", cpu);
            return;
        };
        if let Some(state) = slot.as_ref() {
            handler::deferred_interrupt(&self.platform, state, &self.sink, self.config.model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use mca_hal::msr::BankConfig;
    use mca_hal::sim::SimPlatform;

    type Subsystem = ThresholdSubsystem<SimPlatform, RecordingSink>;

    const VAL: u64 = 1 << 63;
    const ADDRV: u64 = 1 << 58;
    const VALID: u64 = 1 << 63;
    const CNTP: u64 = 1 << 62;
    const INTP: u64 = 1 << 60;
    const OVERFLOW: u64 = 1 << 48;
    const COUNT_MASK: u64 = 0xFFF << 32;
    const INT_TYPE_APIC: u64 = 1 << 49;

    fn subsystem(config: ThresholdConfig, nr_cpus: usize) -> Subsystem {
        ThresholdSubsystem::new(SimPlatform::new(nr_cpus), RecordingSink::new(), config, nr_cpus)
            .unwrap()
    }

    fn count(raw: u64) -> u64 {
        (raw & COUNT_MASK) >> 32
    }

    /// Legacy bank 4 with two blocks and LVT offset 1
    fn legacy_bank4(sim: &SimPlatform, cpu: CpuId) {
        sim.set_msr(cpu, 0x413, VALID | CNTP | (1 << 52) | 0x0100_0000);
        sim.set_msr(cpu, 0xC000_0408, VALID | CNTP | (1 << 52));
        sim.set_msr(cpu, addr::mc_status(4), 0);
        sim.set_msr(cpu, addr::mc_addr(4), 0);
    }

    /// Scalable UMC bank 0
    fn scalable_umc(sim: &SimPlatform) {
        let config = BankConfig::MCAX_SUPPORTED | BankConfig::DEFERRED_INT_TYPE_SUPPORTED;
        sim.set_msr(0, addr::smca_config(0), config);
        sim.set_msr(0, addr::smca_ipid(0), (0x96 << 32) | 0x0005_0F00);
        sim.set_msr(0, addr::smca_misc0(0), VALID | CNTP | INTP);
        sim.set_msr(0, addr::CU_DEF_ERR, 0x1020);
        sim.set_msr(0, addr::smca_status(0), 0);
        sim.set_msr(0, addr::smca_addr(0), 0);
        sim.set_msr(0, addr::smca_destat(0), 0);
        sim.set_msr(0, addr::smca_deaddr(0), 0);
    }

    fn scalable_config(num_banks: u32) -> ThresholdConfig {
        ThresholdConfig::new(num_banks)
            .with_features(McaFeatures::SCALABLE | McaFeatures::THRESHOLD | McaFeatures::SUCCOR)
            .with_model(0x19, 0x01)
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = ThresholdConfig::new(6).with_vectors(0xF9, 0xF9);
        assert!(
            ThresholdSubsystem::new(SimPlatform::new(1), RecordingSink::new(), config, 1).is_err()
        );
        let config = ThresholdConfig::new(6);
        assert!(
            ThresholdSubsystem::new(SimPlatform::new(1), RecordingSink::new(), config, MAX_CPUS + 1)
                .is_err()
        );
    }

    #[test]
    fn test_scalable_umc_end_to_end() {
        let sub = subsystem(scalable_config(1), 1);
        let sim = sub.platform();
        scalable_umc(sim);

        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();
        assert!(sub.threshold_dispatch_installed());
        assert!(sub.deferred_dispatch_installed());
        assert_eq!(sub.bank_type(0, 0), Some(BankType::Umc));
        assert_eq!(sub.bank_name(0, 0).unwrap(), "umc");
        assert_eq!(sub.block_name(0, 0, 0).unwrap(), "dram_ecc");
        assert_eq!(sim.lvt(0, 1), Some(0xF9));
        assert_eq!(sim.lvt(0, 2), Some(0xF4));

        let config = sim.msr(0, addr::smca_config(0)).unwrap();
        assert_ne!(config & BankConfig::MCAX_ENABLE, 0);
        assert_eq!(
            config & BankConfig::DEFERRED_INT_TYPE_MASK,
            BankConfig::DEFERRED_INT_TYPE_APIC
        );

        sub.set_threshold_limit(0, 0, 0, 10).unwrap();
        let misc = sim.msr(0, addr::smca_misc0(0)).unwrap();
        assert_eq!(count(misc), 0xFF5);
        assert_ne!(misc & INT_TYPE_APIC, 0);

        // Ten errors later the counter overflows
        sim.set_msr(0, addr::smca_misc0(0), (misc & !COUNT_MASK) | COUNT_MASK | OVERFLOW);
        sim.set_msr(0, addr::smca_status(0), VAL | ADDRV);
        sim.set_msr(0, addr::smca_addr(0), (12 << 56) | 0x0000_1234_5678_9ABC);
        sim.set_msr(0, addr::smca_destat(0), VAL);
        sim.set_time(1000);

        sub.threshold_interrupt(0);

        let records = sub.sink().records();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert!(rec.is_memory_error());
        assert_eq!(rec.address, Some(0x0000_1234_5678_9000));
        assert_eq!(rec.ipid, Some((0x96 << 32) | 0x0005_0F00));
        assert_eq!(rec.bank_type, Some(BankType::Umc));
        assert_eq!(rec.timestamp, 1000);
        assert_eq!(sim.msr(0, addr::smca_status(0)), Some(0));
        assert_eq!(sim.msr(0, addr::smca_destat(0)), Some(0));

        let misc = sim.msr(0, addr::smca_misc0(0)).unwrap();
        assert_eq!(count(misc), 0xFF5);
        assert_eq!(misc & OVERFLOW, 0);
    }

    #[test]
    fn test_two_cores_share_lvt_offset() {
        let config = ThresholdConfig::new(6).with_model(0x10, 0x02);
        let sub = subsystem(config, 2);
        legacy_bank4(sub.platform(), 0);
        legacy_bank4(sub.platform(), 1);

        let sub_ref = &sub;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|cpu| scope.spawn(move || sub_ref.on_core_feature_init(cpu)))
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        let sim = sub.platform();
        for cpu in 0..2 {
            sub.on_core_attach(cpu).unwrap();
            assert_eq!(sim.eilvt_calls(cpu), 1);
            assert_eq!(sim.lvt(cpu, 1), Some(0xF9));
            for reg in [0x413, 0xC000_0408] {
                let misc = sim.msr(cpu, reg).unwrap();
                assert_ne!(misc & INT_TYPE_APIC, 0);
                assert_eq!((misc >> 52) & 0xF, 1);
            }
            assert_eq!(sub.block_name(cpu, 4, 0).unwrap(), "dram");
            assert_eq!(sub.block_name(cpu, 4, 1).unwrap(), "ht_links");
        }
        assert!(sub.threshold_dispatch_installed());
        assert!(!sub.deferred_dispatch_installed());
    }

    #[test]
    fn test_unknown_ipid_still_configured() {
        let sub = subsystem(scalable_config(1), 1);
        let sim = sub.platform();
        scalable_umc(sim);
        sim.set_msr(0, addr::smca_ipid(0), (0x123 << 32) | 1);

        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        assert_eq!(sub.bank_type(0, 0), None);
        assert_eq!(sub.bank_name(0, 0).unwrap(), "th_bank_0");
        assert_eq!(sub.block_name(0, 0, 0).unwrap(), "th_bank_0");
        assert_eq!(sub.threshold_limit(0, 0, 0).unwrap(), 0xFFF);
        let config = sim.msr(0, addr::smca_config(0)).unwrap();
        assert_ne!(config & BankConfig::MCAX_ENABLE, 0);
    }

    #[test]
    fn test_detach_makes_handlers_noops() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();
        sub.on_core_detach(0).unwrap();

        sim.set_msr(0, 0x413, VALID | CNTP | OVERFLOW);
        sim.set_msr(0, addr::mc_status(4), VAL);
        sub.threshold_interrupt(0);

        assert!(sub.sink().is_empty());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(VAL));
        assert_eq!(sub.with_state(0, |state| state.bank_map().bits()).unwrap(), 0);
        assert_eq!(sub.threshold_limit(0, 4, 0), Err(McaError::NoDevice));
        sub.on_core_detach(0).unwrap();
    }

    #[test]
    fn test_interrupt_while_state_locked() {
        let sub = subsystem(scalable_config(1), 1);
        let sim = sub.platform();
        scalable_umc(sim);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        let misc = sim.msr(0, addr::smca_misc0(0)).unwrap();
        sim.set_msr(0, addr::smca_misc0(0), misc | OVERFLOW);
        sim.set_msr(0, addr::smca_status(0), VAL);

        sub.with_state(0, |_| {
            sub.threshold_interrupt(0);
            sub.deferred_error_interrupt(0);
        })
        .unwrap();

        assert!(sub.sink().is_empty());
        assert_eq!(sim.msr(0, addr::smca_status(0)), Some(VAL));
        assert_ne!(sim.msr(0, addr::smca_misc0(0)).unwrap() & OVERFLOW, 0);

        sub.threshold_interrupt(0);
        assert_eq!(sub.sink().len(), 1);
        assert_eq!(sim.msr(0, addr::smca_status(0)), Some(0));
    }

    #[test]
    fn test_interrupt_before_attach_unexpected() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sub.on_core_feature_init(0).unwrap();

        sim.set_msr(0, 0x413, VALID | CNTP | OVERFLOW);
        sim.set_msr(0, addr::mc_status(4), VAL);
        sub.threshold_interrupt(0);
        sub.deferred_error_interrupt(0);

        assert!(!sub.threshold_dispatch_installed());
        assert!(sub.sink().is_empty());
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(VAL));
    }

    #[test]
    fn test_tunables_clamp_and_reject() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sim.set_msr(0, 0x407, VALID | CNTP);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        sub.set_threshold_limit(0, 4, 0, 0).unwrap();
        assert_eq!(sub.threshold_limit(0, 4, 0).unwrap(), 1);
        sub.set_threshold_limit(0, 4, 0, 0x5000).unwrap();
        assert_eq!(sub.threshold_limit(0, 4, 0).unwrap(), 0xFFF);

        assert_eq!(sub.set_interrupt_enable(0, 1, 0, true), Err(McaError::InvalidArgument));
        assert!(!sub.interrupt_enable(0, 1, 0).unwrap());

        sub.set_interrupt_enable(0, 4, 1, false).unwrap();
        assert!(!sub.interrupt_enable(0, 4, 1).unwrap());
        assert_eq!(sim.msr(0, 0xC000_0408).unwrap() & INT_TYPE_APIC, 0);

        assert_eq!(sub.threshold_limit(0, 4, 3), Err(McaError::NotFound));
        assert_eq!(sub.set_threshold_limit(0, 2, 0, 5), Err(McaError::NotFound));
        assert_eq!(sub.bank_name(0, 9), Err(McaError::NotFound));
        assert_eq!(sub.threshold_limit(5, 4, 0), Err(McaError::InvalidCpu(5)));
    }

    #[test]
    fn test_error_count_tunable() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        sub.set_threshold_limit(0, 4, 0, 100).unwrap();
        let misc = sim.msr(0, 0x413).unwrap();
        sim.set_msr(0, 0x413, misc + (7 << 32));
        assert_eq!(sub.error_count(0, 4, 0).unwrap(), 7);
    }

    #[test]
    fn test_cross_call_failure() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        sim.set_cross_call_failure(true);
        assert_eq!(sub.set_threshold_limit(0, 4, 0, 10), Err(McaError::NoDevice));
        assert_eq!(sub.error_count(0, 4, 0), Err(McaError::NoDevice));
        assert_eq!(sub.threshold_limit(0, 4, 0).unwrap(), 0xFFF);
    }

    #[test]
    fn test_tunable_without_state() {
        let sub = subsystem(ThresholdConfig::new(6), 2);
        assert_eq!(sub.set_threshold_limit(1, 4, 0, 10), Err(McaError::NoDevice));
        assert_eq!(sub.bank_name(1, 0), Err(McaError::NoDevice));
        assert_eq!(sub.bank_type(1, 0), None);
    }

    #[test]
    fn test_legacy_deferred_enable() {
        let config = ThresholdConfig::new(6)
            .with_features(McaFeatures::THRESHOLD | McaFeatures::SUCCOR);
        let sub = subsystem(config, 1);
        let sim = sub.platform();
        legacy_bank4(sim, 0);
        sim.set_msr(0, addr::CU_DEF_ERR, 0);

        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();

        let def = sim.msr(0, addr::CU_DEF_ERR).unwrap();
        assert_eq!(def & DeferredErrorConfig::DEF_LVT_OFFSET_MASK, 0x20);
        assert_eq!(
            def & DeferredErrorConfig::DEF_INT_TYPE_MASK,
            DeferredErrorConfig::DEF_INT_TYPE_APIC
        );
        assert!(sub.deferred_dispatch_installed());
        assert_eq!(sim.lvt(0, 2), Some(0xF4));

        sim.set_msr(0, addr::mc_status(4), VAL | (1 << 44));
        sub.deferred_error_interrupt(0);
        assert_eq!(sub.sink().len(), 1);
        assert_eq!(sim.msr(0, addr::mc_status(4)), Some(0));
    }

    #[test]
    fn test_threshold_feature_off_skips_discovery() {
        let config = ThresholdConfig::new(6).with_features(McaFeatures::empty());
        let sub = subsystem(config, 1);
        legacy_bank4(sub.platform(), 0);

        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();
        assert_eq!(sub.platform().eilvt_calls(0), 0);
        assert_eq!(sub.threshold_limit(0, 4, 0), Err(McaError::NotFound));
    }

    #[test]
    fn test_reinit_replaces_state() {
        let sub = subsystem(ThresholdConfig::new(6), 1);
        legacy_bank4(sub.platform(), 0);
        sub.on_core_feature_init(0).unwrap();
        sub.on_core_attach(0).unwrap();
        sub.set_threshold_limit(0, 4, 0, 10).unwrap();

        sub.on_core_feature_init(0).unwrap();
        assert_eq!(sub.threshold_limit(0, 4, 0), Err(McaError::NoDevice));
        sub.on_core_attach(0).unwrap();
        assert_eq!(sub.threshold_limit(0, 4, 0).unwrap(), 0xFFF);
    }
}

//! # Threshold Block Programming
//!
//! Every write to a threshold block goes through [`program`]. The register
//! is read, edited and written back as a single 64-bit value.
//!
//! ```text
//! high half of the block register
//! 31  30  29  28  27..24  23..20  19   18..17  16   15..12  11..0
//! Val CntP Lck IntP  --   LVTOFF  CntEn IntTyp Ovrflw  --   ErrCnt
//! ```
//!
//! | Mode                | Counter                                   |
//! |---------------------|-------------------------------------------|
//! | `InitialSetup(off)` | preload `0xFFF - limit`, install LVT off  |
//! | `LimitChange(old)`  | shift by `old - new`, keep progress       |
//! | `Reset`             | preload only if the counter overflowed    |

use mca_hal::msr::{addr, DeferredErrorConfig, ThresholdFlags, ThresholdMisc};
use mca_hal::MsrAccess;

use crate::addressing::AddressingScheme;
use crate::block::ThresholdBlock;
use crate::cpu::CpuState;
use crate::error::McaResult;
use crate::vector::VectorKind;
use crate::{Platform, THRESHOLD_MAX};

/// What a call to [`program`] is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramMode {
    /// First programming after discovery, with the granted LVT offset
    InitialSetup(Option<u8>),
    /// The limit changed; carries the previous limit
    LimitChange(u16),
    /// Re-arm after an interrupt
    Reset,
}

/// Program `block` on its owning CPU
pub fn program<M: MsrAccess + ?Sized>(
    msr: &M,
    scheme: AddressingScheme,
    block: &ThresholdBlock,
    mode: ProgramMode,
) -> McaResult<()> {
    let mut misc = ThresholdMisc::from_raw(msr.read_msr(block.cpu, block.address)?);
    let setup = matches!(mode, ProgramMode::InitialSetup(_));

    if setup || misc.overflowed() {
        misc.hi &= !(ThresholdMisc::ERR_COUNT_MASK | ThresholdFlags::OVERFLOW.bits());
        misc.set_error_count(block.preload() as u32);
    } else if let ProgramMode::LimitChange(old) = mode {
        let count = misc.error_count() as i32 + old as i32 - block.threshold_limit as i32;
        misc.set_error_count(count.clamp(0, THRESHOLD_MAX as i32) as u32);
    }

    misc.hi &= !ThresholdMisc::INT_TYPE_MASK;

    if block.interrupt_capable {
        if let ProgramMode::InitialSetup(offset) = mode {
            if lvt_offset_valid(scheme, block, misc, offset) {
                if let Some(offset) = offset {
                    misc.set_lvt_offset(offset);
                }
            }
        }
        if block.interrupt_enabled {
            misc.hi |= ThresholdMisc::INT_TYPE_APIC;
        }
    }

    misc.hi |= ThresholdFlags::COUNT_EN.bits();

    msr.write_msr(block.cpu, block.address, misc.raw())?;
    Ok(())
}

/// Check the granted offset against the one the block already carries
fn lvt_offset_valid(
    scheme: AddressingScheme,
    block: &ThresholdBlock,
    misc: ThresholdMisc,
    offset: Option<u8>,
) -> bool {
    let Some(offset) = offset else {
        log::error!(
            "[Firmware Bug]: cpu {}, failed to setup threshold interrupt for bank {}, block {} (MSR{:08X}=0x{:x}{:08x})",
            block.cpu,
            block.bank,
            block.block,
            block.address,
            misc.hi,
            misc.lo
        );
        return false;
    };

    if offset != misc.lvt_offset() {
        // Scalable parts take the offset from CU_DEF_ERR; the field is reserved.
        if !scheme.is_scalable() {
            log::error!(
                "[Firmware Bug]: cpu {}, invalid threshold interrupt offset {} for bank {}, block {} (MSR{:08X}=0x{:x}{:08x})",
                block.cpu,
                misc.lvt_offset(),
                block.bank,
                block.block,
                block.address,
                misc.hi,
                misc.lo
            );
        }
        return false;
    }

    true
}

/// Reserve the threshold LVT offset for `block` and program it for the
/// first time
///
/// Returns whether the threshold vector is routed on this CPU. A capable
/// block whose LVT offset cannot be read is left untouched.
pub fn initial_setup<P: Platform + ?Sized>(
    platform: &P,
    state: &mut CpuState,
    block: &ThresholdBlock,
) -> McaResult<bool> {
    let mut granted = state.vectors.granted(VectorKind::Threshold);

    if block.interrupt_capable {
        match preferred_offset(platform, state, block) {
            Some(preferred) => {
                granted =
                    state
                        .vectors
                        .reserve(platform, state.cpu, VectorKind::Threshold, preferred);
            },
            None => {
                log::warn!(
                    "cpu {}: no threshold LVT offset for bank {}, block {}",
                    state.cpu,
                    block.bank,
                    block.block
                );
                return Ok(false);
            },
        }
    }

    program(platform, state.scheme, block, ProgramMode::InitialSetup(granted))?;
    Ok(granted.is_some())
}

fn preferred_offset<M: MsrAccess + ?Sized>(
    msr: &M,
    state: &CpuState,
    block: &ThresholdBlock,
) -> Option<u8> {
    match state.scheme {
        AddressingScheme::Legacy => msr
            .read_msr(state.cpu, block.address)
            .ok()
            .map(|raw| ThresholdMisc::from_raw(raw).lvt_offset()),
        AddressingScheme::Scalable => msr
            .read_msr(state.cpu, addr::CU_DEF_ERR)
            .ok()
            .map(|raw| DeferredErrorConfig::from_raw(raw).threshold_lvt_offset()),
    }
}

/// Errors counted since the block was last armed
pub fn error_count<M: MsrAccess + ?Sized>(msr: &M, block: &ThresholdBlock) -> McaResult<u16> {
    let misc = ThresholdMisc::from_raw(msr.read_msr(block.cpu, block.address)?);
    Ok((misc.error_count() as u16).saturating_sub(block.preload()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{McaFeatures, ThresholdConfig};
    use mca_hal::sim::SimPlatform;

    const VALID: u32 = 1 << 31;
    const CNTP: u32 = 1 << 30;
    const INTP: u32 = 1 << 28;
    const COUNT_EN: u32 = 1 << 19;
    const OVERFLOW: u32 = 1 << 16;

    fn raw(hi: u32) -> u64 {
        (hi as u64) << 32
    }

    fn hi(sim: &SimPlatform, address: u32) -> u32 {
        (sim.msr(0, address).unwrap() >> 32) as u32
    }

    fn block(sim: &SimPlatform, bank: u32, address: u32, hi: u32) -> ThresholdBlock {
        sim.set_msr(0, address, raw(hi));
        ThresholdBlock::new(0, bank, 0, address, ThresholdMisc::from_raw(raw(hi)))
    }

    #[test]
    fn test_initial_setup_preloads() {
        let sim = SimPlatform::new(1);
        let mut b = block(&sim, 1, 0x407, VALID | CNTP | INTP | OVERFLOW | 0x123);
        b.set_threshold_limit(10);

        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::InitialSetup(Some(0))).unwrap();

        let hi = hi(&sim, 0x407);
        assert_eq!(hi & 0xFFF, 0xFF5);
        assert_eq!(hi & OVERFLOW, 0);
        assert_ne!(hi & COUNT_EN, 0);
        assert_eq!(hi & ThresholdMisc::INT_TYPE_MASK, ThresholdMisc::INT_TYPE_APIC);
    }

    #[test]
    fn test_limit_change_preserves_progress() {
        let sim = SimPlatform::new(1);
        let mut b = block(&sim, 1, 0x407, VALID | CNTP | INTP);
        b.set_threshold_limit(100);
        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::InitialSetup(Some(0))).unwrap();

        // 30 errors counted
        let misc = sim.msr(0, 0x407).unwrap();
        sim.set_msr(0, 0x407, misc + raw(30));
        assert_eq!(error_count(&sim, &b).unwrap(), 30);

        let old = b.set_threshold_limit(50);
        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::LimitChange(old)).unwrap();

        assert_eq!(hi(&sim, 0x407) & 0xFFF, 0xFFF - 50 + 30);
        assert_eq!(error_count(&sim, &b).unwrap(), 30);
    }

    #[test]
    fn test_limit_change_clamps() {
        let sim = SimPlatform::new(1);
        let mut b = block(&sim, 1, 0x407, VALID | CNTP | 0xFFE);

        let old = b.set_threshold_limit(1);
        assert_eq!(old, 0xFFF);
        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::LimitChange(old)).unwrap();
        assert_eq!(hi(&sim, 0x407) & 0xFFF, 0xFFF);

        sim.set_msr(0, 0x407, raw(VALID | CNTP | 0x001));
        let old = b.set_threshold_limit(0xFFF);
        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::LimitChange(old)).unwrap();
        assert_eq!(hi(&sim, 0x407) & 0xFFF, 0);
    }

    #[test]
    fn test_reset_only_rearms_overflowed() {
        let sim = SimPlatform::new(1);
        let b = block(&sim, 1, 0x407, VALID | CNTP | INTP | 0x010);

        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::Reset).unwrap();
        assert_eq!(hi(&sim, 0x407) & 0xFFF, 0x010);

        sim.set_msr(0, 0x407, raw(VALID | CNTP | INTP | OVERFLOW | 0xFFF));
        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::Reset).unwrap();
        let hi = hi(&sim, 0x407);
        assert_eq!(hi & 0xFFF, 0);
        assert_eq!(hi & OVERFLOW, 0);
    }

    #[test]
    fn test_legacy_lvt_mismatch_left_unchanged() {
        let sim = SimPlatform::new(1);
        let b = block(&sim, 4, 0x413, VALID | CNTP | (1 << 20));

        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::InitialSetup(Some(2))).unwrap();

        let hi = hi(&sim, 0x413);
        assert_eq!((hi & ThresholdMisc::LVT_OFFSET_MASK) >> 20, 1);
        assert_eq!(hi & ThresholdMisc::INT_TYPE_MASK, ThresholdMisc::INT_TYPE_APIC);
    }

    #[test]
    fn test_not_capable_not_routed() {
        let sim = SimPlatform::new(1);
        let b = block(&sim, 1, 0x407, VALID | CNTP | ThresholdMisc::INT_TYPE_APIC);

        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::InitialSetup(None)).unwrap();
        assert_eq!(hi(&sim, 0x407) & ThresholdMisc::INT_TYPE_MASK, 0);
    }

    #[test]
    fn test_interrupt_disabled_clears_int_type() {
        let sim = SimPlatform::new(1);
        let mut b = block(&sim, 1, 0x407, VALID | CNTP | INTP | ThresholdMisc::INT_TYPE_APIC);
        b.interrupt_enabled = false;

        program(&sim, AddressingScheme::Legacy, &b, ProgramMode::Reset).unwrap();
        assert_eq!(hi(&sim, 0x407) & ThresholdMisc::INT_TYPE_MASK, 0);
    }

    #[test]
    fn test_initial_setup_reserves_once() {
        let sim = SimPlatform::new(1);
        let mut state = CpuState::new(0, &ThresholdConfig::new(6)).unwrap();
        let b0 = block(&sim, 4, 0x413, VALID | CNTP | (1 << 20));
        let b1 = block(&sim, 4, 0xC000_0408, VALID | CNTP | (1 << 20));

        assert!(initial_setup(&sim, &mut state, &b0).unwrap());
        assert!(initial_setup(&sim, &mut state, &b1).unwrap());
        assert_eq!(sim.eilvt_calls(0), 1);
        assert_eq!(sim.lvt(0, 1), Some(0xF9));
    }

    #[test]
    fn test_initial_setup_scalable_offset() {
        let sim = SimPlatform::new(1);
        let config = ThresholdConfig::new(4)
            .with_features(McaFeatures::SCALABLE | McaFeatures::THRESHOLD);
        let mut state = CpuState::new(0, &config).unwrap();
        sim.set_msr(0, addr::CU_DEF_ERR, 0x1020);
        let b = block(&sim, 0, addr::smca_misc0(0), VALID | CNTP | INTP);

        assert!(initial_setup(&sim, &mut state, &b).unwrap());
        assert_eq!(state.vectors.granted(VectorKind::Threshold), Some(1));
        assert_eq!(hi(&sim, addr::smca_misc0(0)) & ThresholdMisc::LVT_OFFSET_MASK, 0);
    }

    #[test]
    fn test_initial_setup_skips_without_offset() {
        let sim = SimPlatform::new(1);
        let config = ThresholdConfig::new(4)
            .with_features(McaFeatures::SCALABLE | McaFeatures::THRESHOLD);
        let mut state = CpuState::new(0, &config).unwrap();
        let b = block(&sim, 0, addr::smca_misc0(0), VALID | CNTP | INTP | 0x123);

        assert!(!initial_setup(&sim, &mut state, &b).unwrap());
        assert_eq!(sim.eilvt_calls(0), 0);
        assert_eq!(hi(&sim, addr::smca_misc0(0)), VALID | CNTP | INTP | 0x123);
    }
}

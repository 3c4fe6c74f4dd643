//! # Threshold Block Discovery
//!
//! Walks the threshold blocks of one bank with a bounded loop and collects
//! the countable ones into a [`ThresholdBank`].
//!
//! ```text
//! for block in 0..NR_BLOCKS:
//!     address unresolvable  ──▶ stop
//!     register unreadable   ──▶ stop
//!     Valid clear           ──▶ block 0: probe next, otherwise stop
//!     CntP clear / Locked   ──▶ probe next
//!     otherwise             ──▶ append ThresholdBlock
//! ```

use mca_hal::msr::{addr, BankConfig, ThresholdMisc};
use mca_hal::MsrAccess;

use crate::block::{ThresholdBank, ThresholdBlock};
use crate::cpu::CpuState;
use crate::error::McaResult;
use crate::NR_BLOCKS;

/// Enumerate the threshold blocks of `bank`
///
/// Returns `Ok(None)` when the bank has no countable block. The bank is
/// marked in the enable map as soon as its first block is created; under
/// the scalable scheme the extended-MISC map is updated while probing
/// block 0.
pub fn discover<M: MsrAccess + ?Sized>(
    msr: &M,
    state: &mut CpuState,
    bank: u32,
) -> McaResult<Option<ThresholdBank>> {
    if bank >= state.num_banks {
        return Ok(None);
    }

    let cpu = state.cpu;
    let scheme = state.scheme;
    let mut found: Option<ThresholdBank> = None;
    let mut address = scheme.first_block_address(bank);
    let mut block0 = ThresholdMisc::from_raw(0);
    let mut extended = false;

    for block in 0..NR_BLOCKS {
        if block > 0 {
            match scheme.next_block_address(bank, block, address, block0, extended) {
                Some(next) if next != 0 => address = next,
                _ => break,
            }
        }

        let Ok(raw) = msr.read_msr(cpu, address) else {
            break;
        };
        let misc = ThresholdMisc::from_raw(raw);

        if block == 0 {
            block0 = misc;
            if scheme.is_scalable() {
                extended = probe_extended_misc(msr, state, bank, misc);
            }
        }

        if !misc.is_valid() {
            if block == 0 {
                continue;
            }
            break;
        }

        if !misc.is_countable() {
            continue;
        }

        let entry = ThresholdBlock::new(cpu, bank, block, address, misc);
        match found.as_mut() {
            Some(list) => list.push(entry)?,
            None => {
                found = Some(ThresholdBank::new(entry)?);
                state.bank_map.set(bank);
            },
        }
    }

    if let Some(list) = &found {
        log::debug!(
            "cpu {}: bank {} has {} threshold block(s)",
            cpu,
            bank,
            list.blocks().len()
        );
    }

    Ok(found)
}

fn probe_extended_misc<M: MsrAccess + ?Sized>(
    msr: &M,
    state: &mut CpuState,
    bank: u32,
    misc0: ThresholdMisc,
) -> bool {
    let present = msr
        .read_msr(state.cpu, addr::smca_config(bank))
        .map(|raw| state.scheme.extended_misc_present(BankConfig::from_raw(raw), misc0))
        .unwrap_or(false);

    if present {
        state.misc_map.set(bank);
    } else {
        state.misc_map.clear(bank);
    }
    present
}

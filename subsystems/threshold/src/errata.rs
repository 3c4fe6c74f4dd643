//! # Processor Errata
//!
//! | Family / model     | Bank        | Problem                        | Action                  |
//! |--------------------|-------------|--------------------------------|-------------------------|
//! | 0x15               | 4           | thresholding unreliable        | clear CntP on MC4_MISC* |
//! | 0x17, 0x10..=0x2F  | insn fetch  | erratum 1114, spurious XEC 10  | clear CntP, filter      |
//! | < 0x17             | 4           | GART TLB errors (XEC 5)        | filter                  |

use mca_hal::msr::{addr, Hwcr, McStatus, ThresholdMisc};
use mca_hal::{CpuId, MsrAccess};

use crate::catalog::BankType;
use crate::config::CpuModel;
use crate::error::McaResult;
use crate::record::ErrorRecord;
use crate::NR_BLOCKS;

/// Whether a record should be dropped instead of forwarded
pub fn should_filter(record: &ErrorRecord, model: CpuModel) -> bool {
    let status = McStatus::from_raw(record.status);

    if model.is(0x17, 0x10, 0x2F)
        && record.bank_type == Some(BankType::If)
        && status.xec(0x3F) == 10
    {
        return true;
    }

    model.family < 0x17 && record.bank == 4 && status.xec(0x1F) == 0x5
}

/// Threshold registers whose counters must be switched off on this model
fn affected_registers(
    model: CpuModel,
    bank: u32,
    bank_type: Option<BankType>,
) -> ([u32; NR_BLOCKS as usize], usize) {
    let mut regs = [0; NR_BLOCKS as usize];

    if model.family == 0x15 && bank == 4 {
        regs[0] = addr::mc_misc(4);
        regs[1] = addr::MCG_XBLK_ADDR + 8;
        return (regs, 2);
    }

    if model.is(0x17, 0x10, 0x2F) && bank_type == Some(BankType::If) {
        regs[0] = addr::smca_misc0(bank);
        return (regs, 1);
    }

    (regs, 0)
}

/// Turn off error thresholding on banks where it is broken
///
/// Clearing CntP requires `HWCR.McStatusWrEn`; the previous HWCR value is
/// restored afterwards. Returns whether any register was touched.
pub fn disable_err_thresholding<M: MsrAccess + ?Sized>(
    msr: &M,
    cpu: CpuId,
    model: CpuModel,
    bank: u32,
    bank_type: Option<BankType>,
) -> McaResult<bool> {
    let (regs, count) = affected_registers(model, bank, bank_type);
    if count == 0 {
        return Ok(false);
    }

    let hwcr = Hwcr::from_bits_retain(msr.read_msr(cpu, addr::K7_HWCR)?);
    let need_toggle = !hwcr.contains(Hwcr::MC_STATUS_WR_EN);
    if need_toggle {
        msr.write_msr(cpu, addr::K7_HWCR, (hwcr | Hwcr::MC_STATUS_WR_EN).bits())?;
    }

    for &reg in &regs[..count] {
        if let Err(err) = msr.clear_bit(cpu, reg, ThresholdMisc::CNTP_BIT) {
            log::debug!("cpu {}: cannot clear CntP in {:#x}: {}", cpu, reg, err);
        }
    }

    if need_toggle {
        msr.write_msr(cpu, addr::K7_HWCR, hwcr.bits())?;
    }

    log::info!("cpu {}: error thresholding disabled on bank {}", cpu, bank);
    Ok(true)
}

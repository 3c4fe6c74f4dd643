//! # Bank Classification
//!
//! Scalable MCA banks are identified through `MCA_IPID`. Classification
//! resolves the hardware id and MCA type against the catalog and numbers
//! the banks of each type in discovery order.
//!
//! ```text
//! MCA_IPID
//! 63          48 47   44 43        32 31                        0
//! ┌─────────────┬───────┬────────────┬───────────────────────────┐
//! │   McaType   │  --   │ HardwareID │        InstanceId         │
//! └─────────────┴───────┴────────────┴───────────────────────────┘
//! ```
//!
//! The same pass also acknowledges the scalable register set in
//! `MCA_CONFIG`, which must happen before uncorrectable errors are raised.

use mca_hal::msr::{addr, BankConfig, Ipid};
use mca_hal::MsrAccess;

use crate::catalog::{self, BankType, BankTypeDescriptor};
use crate::cpu::CpuState;

/// Result of classifying one bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankClassification {
    /// Catalog entry, `None` when the bank is present but unknown
    pub descriptor: Option<&'static BankTypeDescriptor>,
    /// `MCA_IPID[InstanceId]`
    pub instance_id: u32,
    /// Number of banks of the same type classified before this one
    pub per_type_sequence: u8,
}

impl BankClassification {
    /// Present but unknown bank
    pub const UNCLASSIFIED: Self = Self {
        descriptor: None,
        instance_id: 0,
        per_type_sequence: 0,
    };

    /// Classified type
    pub fn bank_type(&self) -> Option<BankType> {
        self.descriptor.map(|desc| desc.bank_type)
    }
}

/// Classify `bank` from its `MCA_IPID` and record the result in `state`
pub fn classify<M: MsrAccess + ?Sized>(
    msr: &M,
    state: &mut CpuState,
    bank: u32,
) -> BankClassification {
    let class = match msr.read_msr(state.cpu, addr::smca_ipid(bank)) {
        Ok(raw) => {
            let ipid = Ipid::from_raw(raw);
            let key = catalog::hwid_mcatype(ipid.hwid(), ipid.mcatype());
            match catalog::lookup(key) {
                Some(desc) => {
                    let count = &mut state.type_counts[desc.bank_type.index()];
                    let sequence = *count;
                    *count = count.saturating_add(1);
                    BankClassification {
                        descriptor: Some(desc),
                        instance_id: ipid.instance_id(),
                        per_type_sequence: sequence,
                    }
                },
                None => {
                    log::debug!(
                        "cpu {}: bank {} has unknown hwid/mcatype {:#x}",
                        state.cpu,
                        bank,
                        key
                    );
                    BankClassification::UNCLASSIFIED
                },
            }
        },
        Err(_) => {
            log::warn!("Failed to read MCA_IPID for bank {}", bank);
            BankClassification::UNCLASSIFIED
        },
    };

    if let Some(slot) = state.classes.get_mut(bank as usize) {
        *slot = class;
    }
    class
}

/// Acknowledge the scalable register set of `bank` in `MCA_CONFIG`
///
/// Sets McaX enable, selects APIC delivery for deferred errors when the
/// firmware left the choice open, and records where the bank reports the
/// address LSB.
pub fn configure_bank<M: MsrAccess + ?Sized>(msr: &M, state: &mut CpuState, bank: u32) {
    let reg = addr::smca_config(bank);
    let Ok(raw) = msr.read_msr(state.cpu, reg) else {
        return;
    };

    let mut config = BankConfig::from_raw(raw);
    config.enable_mcax();
    config.enable_deferred_apic();

    if config.lsb_in_status() {
        state.lsb_in_status.set(bank);
    } else {
        state.lsb_in_status.clear(bank);
    }

    if let Err(err) = msr.write_msr(state.cpu, reg, config.raw()) {
        log::warn!("cpu {}: cannot write MCA_CONFIG of bank {}: {}", state.cpu, bank, err);
    }
}

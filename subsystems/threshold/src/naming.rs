//! # Diagnostic Names
//!
//! Names under which banks and blocks are presented to the tunable layer.
//! Every call builds a fresh `String`.
//!
//! | Scheme   | Bank                                 | Block                             |
//! |----------|--------------------------------------|-----------------------------------|
//! | Legacy   | fixed name per bank, `th_bank_N`     | bank 4 by address, else bank name |
//! | Scalable | type name, `type_seq`, `th_bank_N`   | UMC block names, `th_block_N`     |

use alloc::format;
use alloc::string::{String, ToString};

use crate::addressing::AddressingScheme;
use crate::block::ThresholdBlock;
use crate::cpu::CpuState;

const LEGACY_BANK_NAMES: [&str; 6] = [
    "load_store",
    "insn_fetch",
    "combined_unit",
    "decode_unit",
    "northbridge",
    "execution_unit",
];

const UMC_BLOCK_NAMES: [&str; 2] = ["dram_ecc", "misc_umc"];

/// Name of `bank` on the CPU described by `state`
pub fn bank_name(state: &CpuState, bank: u32) -> String {
    match state.scheme {
        AddressingScheme::Legacy => match LEGACY_BANK_NAMES.get(bank as usize) {
            Some(name) => name.to_string(),
            None => format!("th_bank_{}", bank),
        },
        AddressingScheme::Scalable => {
            let Some(class) = state.classification(bank) else {
                return format!("th_bank_{}", bank);
            };
            let Some(bank_type) = class.bank_type() else {
                return format!("th_bank_{}", bank);
            };
            if state.type_count(bank_type) == 1 {
                bank_type.name().to_string()
            } else {
                format!("{}_{}", bank_type.name(), class.per_type_sequence)
            }
        },
    }
}

/// Name of `block`
pub fn block_name(state: &CpuState, block: &ThresholdBlock) -> String {
    match state.scheme {
        AddressingScheme::Legacy if block.bank == 4 => bank4_block_name(block),
        // Legacy blocks outside bank 4 share the name of their bank
        AddressingScheme::Legacy => bank_name(state, block.bank),
        AddressingScheme::Scalable => {
            let umc = state.bank_type(block.bank).is_some_and(|ty| ty.is_umc());
            if umc {
                if let Some(name) = UMC_BLOCK_NAMES.get(block.block as usize) {
                    return name.to_string();
                }
            }
            if block.block != 0 {
                return format!("th_block_{}", block.block);
            }
            bank_name(state, block.bank)
        },
    }
}

fn bank4_block_name(block: &ThresholdBlock) -> String {
    match block.address {
        0x0000_0413 => "dram".to_string(),
        0xC000_0408 => "ht_links".to_string(),
        0xC000_0409 => "l3_cache".to_string(),
        address => {
            log::warn!("cpu {}: unexpected bank 4 block address {:#x}", block.cpu, address);
            format!("th_block_{}", block.block)
        },
    }
}

//! # Register Addressing
//!
//! Legacy and scalable banks place their threshold blocks at different
//! registers. The scheme is chosen once per CPU from the feature flags and
//! every address computation goes through it.
//!
//! ```text
//! Legacy                               Scalable
//! ──────                               ────────
//! block 0  MCi_MISC  (0x403 + 4*b)     block 0  MCA_MISC0 (0xC0002003 + 0x10*b)
//! block 1  0xC0000400 + BLKPTR*8       block 1+ MCA_MISC1..4, only if block 0
//! block 2+ previous + 1                         advertised them (BLKPTR != 0)
//! ```

use mca_hal::msr::{addr, BankConfig, ThresholdMisc};

use crate::NR_BLOCKS;

/// Register layout generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingScheme {
    /// `MCi_*` registers at `0x400 + 4 * bank`
    Legacy,
    /// Scalable MCA registers at `0xC000_2000 + 0x10 * bank`
    Scalable,
}

impl AddressingScheme {
    /// Scalable MCA layout in use
    #[inline]
    pub const fn is_scalable(self) -> bool {
        matches!(self, AddressingScheme::Scalable)
    }

    /// Register of block 0
    pub const fn first_block_address(self, bank: u32) -> u32 {
        match self {
            AddressingScheme::Legacy => addr::mc_misc(bank),
            AddressingScheme::Scalable => addr::smca_misc0(bank),
        }
    }

    /// Register of `block` (>= 1), or `None` when the bank has no such block
    ///
    /// `current` is the address of the previous block and `block0` the value
    /// read from block 0. `extended` tells whether the bank advertised
    /// MISC1..4 under the scalable scheme.
    pub fn next_block_address(
        self,
        bank: u32,
        block: u32,
        current: u32,
        block0: ThresholdMisc,
        extended: bool,
    ) -> Option<u32> {
        if block == 0 || block >= NR_BLOCKS {
            return None;
        }

        match self {
            AddressingScheme::Scalable => {
                extended.then(|| addr::smca_misc_y(bank, block - 1))
            },
            AddressingScheme::Legacy if block == 1 => {
                let offset = (block0.lo & ThresholdMisc::BLKPTR_MASK) >> 21;
                (offset != 0).then(|| addr::MCG_XBLK_ADDR + offset)
            },
            AddressingScheme::Legacy => current.checked_add(1),
        }
    }

    /// Whether a bank exposes MISC1..4
    ///
    /// Only scalable banks with McaX support and a non-zero block pointer in
    /// MISC0 do.
    pub fn extended_misc_present(self, config: BankConfig, misc0: ThresholdMisc) -> bool {
        self.is_scalable() && config.mcax_supported() && misc0.block_pointer() != 0
    }

    /// Status register of `bank`
    pub const fn status_register(self, bank: u32) -> u32 {
        match self {
            AddressingScheme::Legacy => addr::mc_status(bank),
            AddressingScheme::Scalable => addr::smca_status(bank),
        }
    }

    /// Address register of `bank`
    pub const fn addr_register(self, bank: u32) -> u32 {
        match self {
            AddressingScheme::Legacy => addr::mc_addr(bank),
            AddressingScheme::Scalable => addr::smca_addr(bank),
        }
    }
}

//! # Threshold Blocks and Banks
//!
//! A bank owns an ordered list of blocks. The first block is the list head;
//! there is no separate sentinel, so a bank exists only while it has at
//! least one block.

use alloc::vec::Vec;

use mca_hal::msr::ThresholdMisc;
use mca_hal::CpuId;

use crate::error::{McaError, McaResult};
use crate::THRESHOLD_MAX;

// =============================================================================
// Threshold Block
// =============================================================================

/// One error counter within a bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdBlock {
    /// Bank index
    pub bank: u32,
    /// Block index within the bank
    pub block: u32,
    /// Owning CPU
    pub cpu: CpuId,
    /// Threshold register
    pub address: u32,
    /// The block can raise an APIC interrupt
    pub interrupt_capable: bool,
    /// Interrupt delivery requested
    pub interrupt_enabled: bool,
    /// Errors counted before the interrupt fires, in `1..=0xFFF`
    pub threshold_limit: u16,
}

impl ThresholdBlock {
    /// Build a block from its register value
    ///
    /// Bank 4 is interrupt capable on every generation; other banks
    /// advertise it through IntP.
    pub fn new(cpu: CpuId, bank: u32, block: u32, address: u32, misc: ThresholdMisc) -> Self {
        let interrupt_capable = bank == 4 || misc.interrupt_present();
        Self {
            bank,
            block,
            cpu,
            address,
            interrupt_capable,
            interrupt_enabled: interrupt_capable,
            threshold_limit: THRESHOLD_MAX,
        }
    }

    /// Clamp and store a new limit, returning the previous one
    pub fn set_threshold_limit(&mut self, limit: u16) -> u16 {
        let old = self.threshold_limit;
        self.threshold_limit = limit.clamp(1, THRESHOLD_MAX);
        old
    }

    /// Counter value that makes the block interrupt after `threshold_limit`
    /// more errors
    #[inline]
    pub fn preload(&self) -> u16 {
        THRESHOLD_MAX - self.threshold_limit
    }
}

// =============================================================================
// Threshold Bank
// =============================================================================

/// Blocks discovered in one bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdBank {
    bank: u32,
    blocks: Vec<ThresholdBlock>,
}

impl ThresholdBank {
    /// Create a bank from its first block
    pub fn new(head: ThresholdBlock) -> McaResult<Self> {
        let mut blocks = Vec::new();
        blocks.try_reserve(1).map_err(|_| McaError::OutOfMemory)?;
        let bank = head.bank;
        blocks.push(head);
        Ok(Self { bank, blocks })
    }

    /// Append a block
    pub fn push(&mut self, block: ThresholdBlock) -> McaResult<()> {
        self.blocks.try_reserve(1).map_err(|_| McaError::OutOfMemory)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Bank index
    pub fn bank(&self) -> u32 {
        self.bank
    }

    /// First block
    pub fn head(&self) -> &ThresholdBlock {
        &self.blocks[0]
    }

    /// All blocks, head first
    pub fn blocks(&self) -> &[ThresholdBlock] {
        &self.blocks
    }

    /// All blocks, head first
    pub fn blocks_mut(&mut self) -> &mut [ThresholdBlock] {
        &mut self.blocks
    }

    /// Block with the given index within the bank
    pub fn block(&self, block: u32) -> Option<&ThresholdBlock> {
        self.blocks.iter().find(|b| b.block == block)
    }

    /// Block with the given index within the bank
    pub fn block_mut(&mut self, block: u32) -> Option<&mut ThresholdBlock> {
        self.blocks.iter_mut().find(|b| b.block == block)
    }
}

// =============================================================================
// Bank Bitmap
// =============================================================================

/// Bitset over bank indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankMap(u64);

impl BankMap {
    /// Empty map
    pub const fn new() -> Self {
        Self(0)
    }

    /// Mark a bank
    #[inline]
    pub fn set(&mut self, bank: u32) {
        if bank < 64 {
            self.0 |= 1 << bank;
        }
    }

    /// Unmark a bank
    #[inline]
    pub fn clear(&mut self, bank: u32) {
        if bank < 64 {
            self.0 &= !(1 << bank);
        }
    }

    /// Check a bank
    #[inline]
    pub const fn contains(&self, bank: u32) -> bool {
        bank < 64 && self.0 & (1 << bank) != 0
    }

    /// Unmark every bank
    #[inline]
    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    /// Raw bits
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Marked banks in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..64).filter(move |&bank| self.contains(bank))
    }
}

//! # Per-CPU Context
//!
//! Everything the subsystem knows about one logical CPU: its bank
//! classifications, the bank bitmaps, the LVT reservations of the current
//! bring-up pass and the published threshold banks.
//!
//! ```text
//! on_core_feature_init ──▶ staged banks ──on_core_attach──▶ banks (handle)
//!                                                              │
//!                              handlers read ◀─────────────────┤
//!                                                              │
//!                          on_core_detach: take handle, then drop it
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;

use mca_hal::CpuId;

use crate::addressing::AddressingScheme;
use crate::block::{BankMap, ThresholdBank, ThresholdBlock};
use crate::catalog::{BankType, N_BANK_TYPES};
use crate::classify::BankClassification;
use crate::config::ThresholdConfig;
use crate::error::{McaError, McaResult};
use crate::vector::VectorAllocator;

/// Per-CPU threshold state
#[derive(Debug)]
pub struct CpuState {
    pub(crate) cpu: CpuId,
    pub(crate) scheme: AddressingScheme,
    pub(crate) num_banks: u32,
    pub(crate) classes: Vec<BankClassification>,
    pub(crate) type_counts: [u8; N_BANK_TYPES],
    pub(crate) bank_map: BankMap,
    pub(crate) misc_map: BankMap,
    pub(crate) lsb_in_status: BankMap,
    pub(crate) vectors: VectorAllocator,
    pub(crate) staged: Vec<Option<ThresholdBank>>,
    pub(crate) banks: Option<Box<[Option<ThresholdBank>]>>,
}

impl CpuState {
    /// Empty state for `cpu`
    pub fn new(cpu: CpuId, config: &ThresholdConfig) -> McaResult<Self> {
        let num_banks = config.num_banks;

        let mut classes = Vec::new();
        classes
            .try_reserve_exact(num_banks as usize)
            .map_err(|_| McaError::OutOfMemory)?;
        classes.resize(num_banks as usize, BankClassification::UNCLASSIFIED);

        let mut staged = Vec::new();
        staged
            .try_reserve_exact(num_banks as usize)
            .map_err(|_| McaError::OutOfMemory)?;

        Ok(Self {
            cpu,
            scheme: config.scheme(),
            num_banks,
            classes,
            type_counts: [0; N_BANK_TYPES],
            bank_map: BankMap::new(),
            misc_map: BankMap::new(),
            lsb_in_status: BankMap::new(),
            vectors: VectorAllocator::new(config.threshold_vector, config.deferred_vector),
            staged,
            banks: None,
        })
    }

    /// Owning CPU
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    /// Addressing scheme
    pub fn scheme(&self) -> AddressingScheme {
        self.scheme
    }

    /// Number of banks
    pub fn num_banks(&self) -> u32 {
        self.num_banks
    }

    /// Classification of `bank`
    pub fn classification(&self, bank: u32) -> Option<&BankClassification> {
        self.classes.get(bank as usize)
    }

    /// Classified type of `bank`
    pub fn bank_type(&self, bank: u32) -> Option<BankType> {
        self.classification(bank)?.bank_type()
    }

    /// Number of banks of `bank_type` classified on this CPU
    pub fn type_count(&self, bank_type: BankType) -> u8 {
        self.type_counts[bank_type.index()]
    }

    /// Banks that produced at least one block
    pub fn bank_map(&self) -> BankMap {
        self.bank_map
    }

    /// Banks exposing MISC1..4
    pub fn misc_map(&self) -> BankMap {
        self.misc_map
    }

    /// Banks reporting the address LSB in MCA_STATUS
    pub fn lsb_in_status(&self) -> BankMap {
        self.lsb_in_status
    }

    /// Published banks, `None` before attach and after detach
    pub fn banks(&self) -> Option<&[Option<ThresholdBank>]> {
        self.banks.as_deref()
    }

    /// Published bank
    pub fn bank(&self, bank: u32) -> Option<&ThresholdBank> {
        self.banks.as_deref()?.get(bank as usize)?.as_ref()
    }

    /// Published block
    pub fn block(&self, bank: u32, block: u32) -> Option<&ThresholdBlock> {
        self.bank(bank)?.block(block)
    }

    /// Published block, looked up for modification
    pub(crate) fn block_mut(&mut self, bank: u32, block: u32) -> Option<&mut ThresholdBlock> {
        self.banks
            .as_deref_mut()?
            .get_mut(bank as usize)?
            .as_mut()?
            .block_mut(block)
    }

    /// Move staged banks into the published handle
    ///
    /// Returns `false` when a handle was already published.
    pub(crate) fn publish(&mut self) -> bool {
        if self.banks.is_some() {
            return false;
        }
        let mut staged = core::mem::take(&mut self.staged);
        staged.resize_with(self.num_banks as usize, || None);
        self.banks = Some(staged.into_boxed_slice());
        true
    }

    /// Detach the published handle and clear the bank map
    pub(crate) fn unpublish(&mut self) -> Option<Box<[Option<ThresholdBank>]>> {
        self.bank_map.clear_all();
        self.banks.take()
    }
}

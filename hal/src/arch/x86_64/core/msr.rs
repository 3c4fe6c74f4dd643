//! # Machine-Check Model-Specific Registers
//!
//! MSR definitions and accessors for the machine-check banks of AMD
//! processors, both the legacy bank layout and Scalable MCA (SMCA).
//!
//! ## Overview
//!
//! Every MCA bank exposes a small register file. Legacy processors place it
//! at `0x400 + 4 * bank`; SMCA processors move it to `0xC000_2000 + 0x10 *
//! bank` and add configuration, identification, syndrome and deferred-error
//! registers. This module provides:
//!
//! - Raw read/write functions
//! - Address formulas for both layouts
//! - Structured register types with field accessors
//! - The [`MsrAccess`] trait used by the threshold subsystem
//!
//! ## Register Layouts
//!
//! ```text
//! MCi_MISC / MCA_MISCy  (threshold block)
//! 63    62   61     60   59..56  55..52  51     50..49  48    43..32
//! ┌─────┬────┬──────┬────┬──────┬───────┬──────┬──────┬─────┬──────────┐
//! │Valid│CntP│Locked│IntP│  --  │LvtOff │CntEn │IntTyp│ Ovrf│ ErrCnt   │
//! └─────┴────┴──────┴────┴──────┴───────┴──────┴──────┴─────┴──────────┘
//! 31..24 : BlkPtr (next block pointer / "more MISC registers" marker)
//! ```
//!
//! ## Safety
//!
//! MSR access requires ring 0 privilege. Accessing an unimplemented MSR
//! raises #GP. [`rdmsr`] and [`wrmsr`] carry no exception-table entry, so
//! [`NativeMsr`] never reports a missing register; it faults instead.

use core::fmt;

use crate::arch::x86_64::smp::CpuId;

// =============================================================================
// RAW MSR ACCESS
// =============================================================================

/// Read a Model-Specific Register
///
/// # Safety
/// - Must be in ring 0
/// - MSR must exist (otherwise #GP)
#[cfg(target_arch = "x86_64")]
#[inline]
pub unsafe fn rdmsr(msr: u32) -> u64 {
    let (low, high): (u32, u32);
    unsafe {
        core::arch::asm!(
            "rdmsr",
            in("ecx") msr,
            out("eax") low,
            out("edx") high,
            options(nomem, nostack, preserves_flags)
        );
    }
    ((high as u64) << 32) | (low as u64)
}

/// Write a Model-Specific Register
///
/// # Safety
/// - Must be in ring 0
/// - MSR must exist and be writable
/// - Value must be valid for the MSR
#[cfg(target_arch = "x86_64")]
#[inline]
pub unsafe fn wrmsr(msr: u32, value: u64) {
    let low = value as u32;
    let high = (value >> 32) as u32;
    unsafe {
        core::arch::asm!(
            "wrmsr",
            in("ecx") msr,
            in("eax") low,
            in("edx") high,
            options(nomem, nostack, preserves_flags)
        );
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// MSR access error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsrError {
    /// The register is not implemented or the bank is disabled
    Unavailable(u32),
    /// The access was requested for a CPU other than the executing one
    WrongCpu(CpuId),
}

impl fmt::Display for MsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsrError::Unavailable(msr) => write!(f, "MSR {:#010x} unavailable", msr),
            MsrError::WrongCpu(cpu) => write!(f, "MSR access targeted remote cpu {}", cpu),
        }
    }
}

// =============================================================================
// ACCESS TRAIT
// =============================================================================

/// Per-CPU MSR file.
///
/// Machine-check registers are replicated per logical CPU. Reads may fail
/// when a bank is absent or disabled; callers treat that as "skip".
pub trait MsrAccess: Send + Sync {
    /// Read `msr` as seen by `cpu`
    fn read_msr(&self, cpu: CpuId, msr: u32) -> Result<u64, MsrError>;

    /// Write `value` to `msr` on `cpu`
    fn write_msr(&self, cpu: CpuId, msr: u32, value: u64) -> Result<(), MsrError>;

    /// Clear a single bit, returning whether it was previously set
    fn clear_bit(&self, cpu: CpuId, msr: u32, bit: u32) -> Result<bool, MsrError> {
        let value = self.read_msr(cpu, msr)?;
        let mask = 1u64 << bit;
        if value & mask == 0 {
            return Ok(false);
        }
        self.write_msr(cpu, msr, value & !mask)?;
        Ok(true)
    }
}

/// Native MSR access on the executing CPU.
///
/// Only [`MsrError::WrongCpu`] is ever returned. Reads and writes go straight
/// to `rdmsr`/`wrmsr`, so an unimplemented register raises #GP rather than
/// [`MsrError::Unavailable`]. Callers that probe registers which may not
/// exist (threshold block discovery) must only be handed addresses the
/// processor implements, or use an accessor backed by the kernel's #GP
/// fixup.
#[derive(Debug)]
pub struct NativeMsr {
    /// Returns the logical id of the executing CPU
    current_cpu: fn() -> CpuId,
}

impl NativeMsr {
    /// Create a native accessor
    ///
    /// # Safety
    /// The caller must run in ring 0, only access implemented MSRs, and
    /// `current_cpu` must return the executing CPU's id.
    pub const unsafe fn new(current_cpu: fn() -> CpuId) -> Self {
        Self { current_cpu }
    }

    fn check_cpu(&self, cpu: CpuId) -> Result<(), MsrError> {
        if (self.current_cpu)() == cpu {
            Ok(())
        } else {
            Err(MsrError::WrongCpu(cpu))
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl MsrAccess for NativeMsr {
    fn read_msr(&self, cpu: CpuId, msr: u32) -> Result<u64, MsrError> {
        self.check_cpu(cpu)?;
        Ok(unsafe { rdmsr(msr) })
    }

    fn write_msr(&self, cpu: CpuId, msr: u32, value: u64) -> Result<(), MsrError> {
        self.check_cpu(cpu)?;
        unsafe { wrmsr(msr, value) };
        Ok(())
    }
}

// =============================================================================
// MSR ADDRESSES
// =============================================================================

/// MSR address namespace
pub mod addr {
    //! Machine-check MSR addresses for legacy and SMCA layouts

    // =========================================================================
    // Global
    // =========================================================================

    /// Hardware Configuration (AMD)
    pub const K7_HWCR: u32 = 0xC001_0015;
    /// Extended threshold block base for legacy block 1+
    pub const MCG_XBLK_ADDR: u32 = 0xC000_0400;
    /// Core-unit deferred error / LVT offset configuration
    pub const CU_DEF_ERR: u32 = 0xC000_0410;

    // =========================================================================
    // Legacy banks (IA32_MCi_*)
    // =========================================================================

    /// Machine Check Bank 0 Status
    pub const IA32_MC0_STATUS: u32 = 0x0000_0401;
    /// Machine Check Bank 0 Address
    pub const IA32_MC0_ADDR: u32 = 0x0000_0402;
    /// Machine Check Bank 0 Misc
    pub const IA32_MC0_MISC: u32 = 0x0000_0403;

    /// Legacy MCi_STATUS
    #[inline]
    pub const fn mc_status(bank: u32) -> u32 {
        IA32_MC0_STATUS + 4 * bank
    }

    /// Legacy MCi_ADDR
    #[inline]
    pub const fn mc_addr(bank: u32) -> u32 {
        IA32_MC0_ADDR + 4 * bank
    }

    /// Legacy MCi_MISC
    #[inline]
    pub const fn mc_misc(bank: u32) -> u32 {
        IA32_MC0_MISC + 4 * bank
    }

    // =========================================================================
    // Scalable MCA banks (MCA_*)
    // =========================================================================

    /// SMCA bank 0 status
    pub const SMCA_MC0_STATUS: u32 = 0xC000_2001;
    /// SMCA bank 0 address
    pub const SMCA_MC0_ADDR: u32 = 0xC000_2002;
    /// SMCA bank 0 first misc register
    pub const SMCA_MC0_MISC0: u32 = 0xC000_2003;
    /// SMCA bank 0 configuration
    pub const SMCA_MC0_CONFIG: u32 = 0xC000_2004;
    /// SMCA bank 0 IP identification
    pub const SMCA_MC0_IPID: u32 = 0xC000_2005;
    /// SMCA bank 0 syndrome
    pub const SMCA_MC0_SYND: u32 = 0xC000_2006;
    /// SMCA bank 0 deferred error status
    pub const SMCA_MC0_DESTAT: u32 = 0xC000_2008;
    /// SMCA bank 0 deferred error address
    pub const SMCA_MC0_DEADDR: u32 = 0xC000_2009;
    /// SMCA bank 0 MISC1 (MISC2..4 follow at +1..+3)
    pub const SMCA_MC0_MISC1: u32 = 0xC000_200A;
    /// SMCA bank 0 syndrome 1
    pub const SMCA_MC0_SYND1: u32 = 0xC000_200E;
    /// SMCA bank 0 syndrome 2
    pub const SMCA_MC0_SYND2: u32 = 0xC000_200F;

    /// Stride between SMCA bank register files
    pub const SMCA_BANK_STRIDE: u32 = 0x10;

    /// MCA_STATUS
    #[inline]
    pub const fn smca_status(bank: u32) -> u32 {
        SMCA_MC0_STATUS + SMCA_BANK_STRIDE * bank
    }

    /// MCA_ADDR
    #[inline]
    pub const fn smca_addr(bank: u32) -> u32 {
        SMCA_MC0_ADDR + SMCA_BANK_STRIDE * bank
    }

    /// MCA_MISC0
    #[inline]
    pub const fn smca_misc0(bank: u32) -> u32 {
        SMCA_MC0_MISC0 + SMCA_BANK_STRIDE * bank
    }

    /// MCA_CONFIG
    #[inline]
    pub const fn smca_config(bank: u32) -> u32 {
        SMCA_MC0_CONFIG + SMCA_BANK_STRIDE * bank
    }

    /// MCA_IPID
    #[inline]
    pub const fn smca_ipid(bank: u32) -> u32 {
        SMCA_MC0_IPID + SMCA_BANK_STRIDE * bank
    }

    /// MCA_SYND
    #[inline]
    pub const fn smca_synd(bank: u32) -> u32 {
        SMCA_MC0_SYND + SMCA_BANK_STRIDE * bank
    }

    /// MCA_DESTAT
    #[inline]
    pub const fn smca_destat(bank: u32) -> u32 {
        SMCA_MC0_DESTAT + SMCA_BANK_STRIDE * bank
    }

    /// MCA_DEADDR
    #[inline]
    pub const fn smca_deaddr(bank: u32) -> u32 {
        SMCA_MC0_DEADDR + SMCA_BANK_STRIDE * bank
    }

    /// MCA_MISC{y+1}; `y` is 0-based from MISC1
    #[inline]
    pub const fn smca_misc_y(bank: u32, y: u32) -> u32 {
        SMCA_MC0_MISC1 + y + SMCA_BANK_STRIDE * bank
    }

    /// MCA_SYND1
    #[inline]
    pub const fn smca_synd1(bank: u32) -> u32 {
        SMCA_MC0_SYND1 + SMCA_BANK_STRIDE * bank
    }

    /// MCA_SYND2
    #[inline]
    pub const fn smca_synd2(bank: u32) -> u32 {
        SMCA_MC0_SYND2 + SMCA_BANK_STRIDE * bank
    }
}

// =============================================================================
// MCA_STATUS
// =============================================================================

bitflags::bitflags! {
    /// MCi_STATUS / MCA_STATUS / MCA_DESTAT
    ///
    /// Unknown bits are retained so the raw value round-trips into records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct McStatus: u64 {
        /// Register holds a valid error
        const VAL = 1 << 63;
        /// Error overflow
        const OVER = 1 << 62;
        /// Uncorrected error
        const UC = 1 << 61;
        /// Error reporting enabled
        const EN = 1 << 60;
        /// MISC register valid
        const MISCV = 1 << 59;
        /// ADDR register valid
        const ADDRV = 1 << 58;
        /// Processor context corrupt
        const PCC = 1 << 57;
        /// Syndrome registers valid (SMCA)
        const SYNDV = 1 << 53;
        /// Deferred error
        const DEFERRED = 1 << 44;
        /// Poison consumption
        const POISON = 1 << 43;

        const _ = !0;
    }
}

impl McStatus {
    /// Wrap a raw register value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Extended error code, `(status >> 16) & mask`
    #[inline]
    pub const fn xec(self, mask: u64) -> u64 {
        (self.bits() >> 16) & mask
    }

    /// Address LSB as reported in status bits 29:24
    #[inline]
    pub const fn addr_lsb(self) -> u32 {
        ((self.bits() >> 24) & 0x3F) as u32
    }

    /// Check if the register holds a valid error
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.bits() & Self::VAL.bits() != 0
    }
}

// =============================================================================
// THRESHOLD BLOCK (MCi_MISC / MCA_MISCy)
// =============================================================================

bitflags::bitflags! {
    /// Single-bit fields in the high half of a threshold block register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThresholdFlags: u32 {
        /// Block is implemented
        const VALID = 1 << 31;
        /// Error counter present
        const CNTP = 1 << 30;
        /// Counter locked by firmware
        const LOCKED = 1 << 29;
        /// Block can raise an APIC interrupt
        const INTP = 1 << 28;
        /// Counting enabled
        const COUNT_EN = 1 << 19;
        /// Counter overflowed
        const OVERFLOW = 1 << 16;
    }
}

/// Threshold block register split into the two halves written by `wrmsr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdMisc {
    /// Low 32 bits
    pub lo: u32,
    /// High 32 bits
    pub hi: u32,
}

impl ThresholdMisc {
    /// Maximum error count, also the interrupt trigger point
    pub const THRESHOLD_MAX: u32 = 0xFFF;
    /// Error count field (hi 11:0)
    pub const ERR_COUNT_MASK: u32 = 0x0000_0FFF;
    /// Interrupt type field (hi 18:17)
    pub const INT_TYPE_MASK: u32 = 0x0006_0000;
    /// APIC interrupt type value
    pub const INT_TYPE_APIC: u32 = 0x0002_0000;
    /// LVT offset field (hi 23:20)
    pub const LVT_OFFSET_MASK: u32 = 0x00F0_0000;
    /// LVT offset shift
    pub const LVT_OFFSET_SHIFT: u32 = 20;
    /// Block pointer field (lo 31:24)
    pub const BLKPTR_MASK: u32 = 0xFF00_0000;
    /// Counter-present bit within the full 64-bit register
    pub const CNTP_BIT: u32 = 62;

    /// Split a raw 64-bit value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            lo: raw as u32,
            hi: (raw >> 32) as u32,
        }
    }

    /// Join both halves
    #[inline]
    pub const fn raw(self) -> u64 {
        ((self.hi as u64) << 32) | self.lo as u64
    }

    /// Flags portion of the high half
    #[inline]
    pub fn flags(self) -> ThresholdFlags {
        ThresholdFlags::from_bits_truncate(self.hi)
    }

    /// Block implemented
    #[inline]
    pub fn is_valid(self) -> bool {
        self.flags().contains(ThresholdFlags::VALID)
    }

    /// Counter present and not locked by firmware
    #[inline]
    pub fn is_countable(self) -> bool {
        let flags = self.flags();
        flags.contains(ThresholdFlags::CNTP) && !flags.contains(ThresholdFlags::LOCKED)
    }

    /// Counter overflowed
    #[inline]
    pub fn overflowed(self) -> bool {
        self.flags().contains(ThresholdFlags::OVERFLOW)
    }

    /// Interrupt-present bit
    #[inline]
    pub fn interrupt_present(self) -> bool {
        self.flags().contains(ThresholdFlags::INTP)
    }

    /// Current error count
    #[inline]
    pub const fn error_count(self) -> u32 {
        self.hi & Self::ERR_COUNT_MASK
    }

    /// Replace the error count field
    #[inline]
    pub fn set_error_count(&mut self, count: u32) {
        self.hi = (self.hi & !Self::ERR_COUNT_MASK) | (count & Self::ERR_COUNT_MASK);
    }

    /// LVT offset programmed in the block
    #[inline]
    pub const fn lvt_offset(self) -> u8 {
        ((self.hi & Self::LVT_OFFSET_MASK) >> Self::LVT_OFFSET_SHIFT) as u8
    }

    /// Replace the LVT offset field
    #[inline]
    pub fn set_lvt_offset(&mut self, offset: u8) {
        self.hi = (self.hi & !Self::LVT_OFFSET_MASK)
            | (((offset as u32) << Self::LVT_OFFSET_SHIFT) & Self::LVT_OFFSET_MASK);
    }

    /// Block pointer (legacy next-block offset / SMCA "more MISC" marker)
    #[inline]
    pub const fn block_pointer(self) -> u32 {
        (self.lo & Self::BLKPTR_MASK) >> 24
    }
}

// =============================================================================
// MCA_CONFIG (SMCA)
// =============================================================================

/// Per-bank MCA_CONFIG register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    value: u64,
}

impl BankConfig {
    /// McaX supported (bit 0)
    pub const MCAX_SUPPORTED: u64 = 1 << 0;
    /// DeferredIntType field implemented (bit 5)
    pub const DEFERRED_INT_TYPE_SUPPORTED: u64 = 1 << 5;
    /// Address LSB reported in MCA_STATUS (bit 8)
    pub const LSB_IN_STATUS: u64 = 1 << 8;
    /// OS acknowledges the extended register set (bit 32)
    pub const MCAX_ENABLE: u64 = 1 << 32;
    /// DeferredIntType field (bits 38:37)
    pub const DEFERRED_INT_TYPE_MASK: u64 = 0b11 << 37;
    /// DeferredIntType value selecting APIC delivery
    pub const DEFERRED_INT_TYPE_APIC: u64 = 0b01 << 37;

    /// Wrap a raw value
    #[inline]
    pub const fn from_raw(value: u64) -> Self {
        Self { value }
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.value
    }

    /// McaX supported
    #[inline]
    pub const fn mcax_supported(self) -> bool {
        self.value & Self::MCAX_SUPPORTED != 0
    }

    /// Address LSB lives in MCA_STATUS
    #[inline]
    pub const fn lsb_in_status(self) -> bool {
        self.value & Self::LSB_IN_STATUS != 0
    }

    /// Acknowledge the extended register set
    #[inline]
    pub fn enable_mcax(&mut self) {
        self.value |= Self::MCAX_ENABLE;
    }

    /// Select APIC delivery for deferred errors unless firmware already chose
    ///
    /// Returns `true` if the field was changed.
    pub fn enable_deferred_apic(&mut self) -> bool {
        let supported = self.value & Self::DEFERRED_INT_TYPE_SUPPORTED != 0;
        let unset = self.value & Self::DEFERRED_INT_TYPE_MASK == 0;
        if supported && unset {
            self.value |= Self::DEFERRED_INT_TYPE_APIC;
            true
        } else {
            false
        }
    }
}

// =============================================================================
// MCA_IPID (SMCA)
// =============================================================================

/// Per-bank IP identification register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipid {
    value: u64,
}

impl Ipid {
    /// Hardware ID mask (bits 43:32, high half 11:0)
    pub const HWID_MASK: u32 = 0x0000_0FFF;
    /// MCA type mask (bits 63:48, high half 31:16)
    pub const MCATYPE_MASK: u32 = 0xFFFF_0000;

    /// Wrap a raw value
    #[inline]
    pub const fn from_raw(value: u64) -> Self {
        Self { value }
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.value
    }

    /// Instance id (bits 31:0)
    #[inline]
    pub const fn instance_id(self) -> u32 {
        self.value as u32
    }

    /// Hardware id
    #[inline]
    pub const fn hwid(self) -> u32 {
        (self.value >> 32) as u32 & Self::HWID_MASK
    }

    /// MCA type
    #[inline]
    pub const fn mcatype(self) -> u32 {
        ((self.value >> 32) as u32 & Self::MCATYPE_MASK) >> 16
    }
}

// =============================================================================
// CU_DEF_ERR
// =============================================================================

/// Deferred-error and threshold LVT configuration (`CU_DEF_ERR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredErrorConfig {
    value: u64,
}

impl DeferredErrorConfig {
    /// Deferred interrupt type (bits 2:1)
    pub const DEF_INT_TYPE_MASK: u64 = 0x0000_0006;
    /// APIC delivery for deferred errors
    pub const DEF_INT_TYPE_APIC: u64 = 0x2;
    /// Deferred LVT offset (bits 7:4)
    pub const DEF_LVT_OFFSET_MASK: u64 = 0x0000_00F0;
    /// Offset the firmware is expected to program
    pub const DEFAULT_DEF_LVT_OFFSET: u8 = 0x2;
    /// SMCA threshold LVT offset (bits 15:12)
    pub const THR_LVT_OFFSET_MASK: u64 = 0x0000_F000;

    /// Wrap a raw value
    #[inline]
    pub const fn from_raw(value: u64) -> Self {
        Self { value }
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.value
    }

    /// Deferred-error LVT offset
    #[inline]
    pub const fn deferred_lvt_offset(self) -> u8 {
        ((self.value & Self::DEF_LVT_OFFSET_MASK) >> 4) as u8
    }

    /// Replace the deferred-error LVT offset
    #[inline]
    pub fn set_deferred_lvt_offset(&mut self, offset: u8) {
        self.value =
            (self.value & !Self::DEF_LVT_OFFSET_MASK) | (((offset as u64) << 4) & Self::DEF_LVT_OFFSET_MASK);
    }

    /// Threshold LVT offset (SMCA)
    #[inline]
    pub const fn threshold_lvt_offset(self) -> u8 {
        ((self.value & Self::THR_LVT_OFFSET_MASK) >> 12) as u8
    }

    /// Route deferred errors through the APIC
    #[inline]
    pub fn set_deferred_apic(&mut self) {
        self.value = (self.value & !Self::DEF_INT_TYPE_MASK) | Self::DEF_INT_TYPE_APIC;
    }
}

// =============================================================================
// HWCR
// =============================================================================

bitflags::bitflags! {
    /// Hardware Configuration Register (AMD)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hwcr: u64 {
        /// Allow software writes to MCi_STATUS and counter-present bits
        const MC_STATUS_WR_EN = 1 << 18;

        const _ = !0;
    }
}

static_assertions::const_assert_eq!(addr::mc_misc(4), 0x0000_0413);
static_assertions::const_assert_eq!(addr::smca_misc_y(1, 3), 0xC000_201D);

// =============================================================================
// TESTS
// =============================================================================

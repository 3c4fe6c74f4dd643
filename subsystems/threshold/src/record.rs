//! # Error Records
//!
//! An [`ErrorRecord`] is a snapshot of one bank's error registers, taken in
//! interrupt context and handed to the [`ErrorSink`](crate::sink::ErrorSink).
//!
//! Under the scalable scheme the address register carries junk below the
//! reported LSB and above bit 55/56; [`extract`] masks it.

use mca_hal::msr::{addr, McStatus};
use mca_hal::{Clock, CpuId, MsrAccess};

use crate::addressing::AddressingScheme;
use crate::catalog::BankType;
use crate::cpu::CpuState;

/// SMCA syndrome registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syndrome {
    /// `MCA_SYND`
    pub synd: u64,
    /// `MCA_SYND1`
    pub synd1: u64,
    /// `MCA_SYND2`
    pub synd2: u64,
}

/// One logged machine-check error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    /// CPU the bank belongs to
    pub cpu: CpuId,
    /// Bank index
    pub bank: u32,
    /// Status register value
    pub status: u64,
    /// Threshold block register, or 0 for deferred errors
    pub misc: u64,
    /// Error address, when ADDRV was set
    pub address: Option<u64>,
    /// Time of extraction
    pub timestamp: u64,
    /// `MCA_IPID` (scalable only)
    pub ipid: Option<u64>,
    /// Syndrome registers (scalable, SYNDV set)
    pub syndrome: Option<Syndrome>,
    /// Classified bank type (scalable only)
    pub bank_type: Option<BankType>,
    /// Register generation the record was read with
    pub scheme: AddressingScheme,
}

/// `GENMASK_ULL(high, low)`
const fn genmask(high: u32, low: u32) -> u64 {
    if low > high {
        return 0;
    }
    (!0u64 >> (63 - high)) & (!0u64 << low)
}

/// Keep only the valid address bits of a scalable address register
fn mask_address(raw: u64, status: McStatus, lsb_in_status: bool) -> u64 {
    if lsb_in_status {
        raw & genmask(56, status.addr_lsb())
    } else {
        let lsb = ((raw >> 56) & 0x3F) as u32;
        raw & genmask(55, lsb)
    }
}

/// Build a record for `bank` from an already-read status value
///
/// `addr_register` is the address register paired with the status register
/// that produced `status` (`MCA_ADDR` or `MCA_DEADDR`).
pub fn extract<P: MsrAccess + Clock + ?Sized>(
    platform: &P,
    state: &CpuState,
    bank: u32,
    status: u64,
    misc: u64,
    addr_register: u32,
) -> ErrorRecord {
    let cpu = state.cpu;
    let scheme = state.scheme;
    let flags = McStatus::from_raw(status);

    let address = if flags.contains(McStatus::ADDRV) {
        platform.read_msr(cpu, addr_register).ok().map(|raw| {
            if scheme.is_scalable() {
                mask_address(raw, flags, state.lsb_in_status.contains(bank))
            } else {
                raw
            }
        })
    } else {
        None
    };

    let mut record = ErrorRecord {
        cpu,
        bank,
        status,
        misc,
        address,
        timestamp: platform.timestamp(),
        ipid: None,
        syndrome: None,
        bank_type: None,
        scheme,
    };

    if scheme.is_scalable() {
        record.ipid = platform.read_msr(cpu, addr::smca_ipid(bank)).ok();
        record.bank_type = state.bank_type(bank);

        if flags.contains(McStatus::SYNDV) {
            let read = |msr: u32| platform.read_msr(cpu, msr).unwrap_or(0);
            record.syndrome = Some(Syndrome {
                synd: read(addr::smca_synd(bank)),
                synd1: read(addr::smca_synd1(bank)),
                synd2: read(addr::smca_synd2(bank)),
            });
        }
    }

    record
}

impl ErrorRecord {
    #[inline]
    fn flags(&self) -> McStatus {
        McStatus::from_raw(self.status)
    }

    /// Deferred error
    pub fn is_deferred(&self) -> bool {
        self.flags().contains(McStatus::DEFERRED)
    }

    /// DRAM ECC error
    pub fn is_memory_error(&self) -> bool {
        match self.scheme {
            AddressingScheme::Legacy => self.bank == 4 && self.flags().xec(0x1F) == 0x8,
            AddressingScheme::Scalable => {
                self.flags().xec(0x3F) == 0 && self.bank_type.is_some_and(BankType::is_umc)
            },
        }
    }

    /// The address can be acted on (page offlining)
    pub fn is_usable_address(&self) -> bool {
        if self.scheme == AddressingScheme::Legacy {
            if self.is_memory_error() {
                return true;
            }
            if self.bank == 4 {
                return false;
            }
        }
        self.flags().contains(McStatus::POISON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{McaFeatures, ThresholdConfig};
    use mca_hal::sim::SimPlatform;

    const VAL: u64 = 1 << 63;
    const ADDRV: u64 = 1 << 58;
    const SYNDV: u64 = 1 << 53;
    const DEFERRED: u64 = 1 << 44;
    const POISON: u64 = 1 << 43;

    fn legacy() -> CpuState {
        CpuState::new(0, &ThresholdConfig::new(6)).unwrap()
    }

    fn scalable() -> CpuState {
        let config = ThresholdConfig::new(4)
            .with_features(McaFeatures::SCALABLE | McaFeatures::THRESHOLD);
        CpuState::new(0, &config).unwrap()
    }

    fn record(scheme: AddressingScheme, bank: u32, status: u64) -> ErrorRecord {
        ErrorRecord {
            cpu: 0,
            bank,
            status,
            misc: 0,
            address: None,
            timestamp: 0,
            ipid: None,
            syndrome: None,
            bank_type: None,
            scheme,
        }
    }

    #[test]
    fn test_genmask() {
        assert_eq!(genmask(55, 0), 0x00FF_FFFF_FFFF_FFFF);
        assert_eq!(genmask(56, 12), 0x01FF_FFFF_FFFF_F000);
        assert_eq!(genmask(3, 4), 0);
    }

    #[test]
    fn test_legacy_extract() {
        let sim = SimPlatform::new(1);
        let state = legacy();
        sim.set_time(42);
        sim.set_msr(0, addr::mc_addr(4), 0xFF00_0000_1234_5678);

        let rec = extract(&sim, &state, 4, VAL | ADDRV, 0x55, addr::mc_addr(4));
        assert_eq!(rec.address, Some(0xFF00_0000_1234_5678));
        assert_eq!(rec.timestamp, 42);
        assert_eq!(rec.misc, 0x55);
        assert!(rec.ipid.is_none());
        assert!(rec.syndrome.is_none());

        let rec = extract(&sim, &state, 4, VAL, 0, addr::mc_addr(4));
        assert!(rec.address.is_none());
    }

    #[test]
    fn test_scalable_address_lsb_from_addr() {
        let sim = SimPlatform::new(1);
        let state = scalable();
        // lsb = 12 in bits 61:56
        sim.set_msr(0, addr::smca_addr(1), (12 << 56) | 0x0000_1234_5678_9ABC);
        sim.set_msr(0, addr::smca_ipid(1), 0x0096_0000_0000_0001);

        let rec = extract(&sim, &state, 1, VAL | ADDRV, 0, addr::smca_addr(1));
        assert_eq!(rec.address, Some(0x0000_1234_5678_9000));
        assert_eq!(rec.ipid, Some(0x0096_0000_0000_0001));
    }

    #[test]
    fn test_scalable_address_lsb_from_status() {
        let sim = SimPlatform::new(1);
        let mut state = scalable();
        state.lsb_in_status.set(1);
        sim.set_msr(0, addr::smca_addr(1), 0x01FF_FFFF_FFFF_FFFF);

        let status = VAL | ADDRV | (6 << 24);
        let rec = extract(&sim, &state, 1, status, 0, addr::smca_addr(1));
        assert_eq!(rec.address, Some(0x01FF_FFFF_FFFF_FFC0));
    }

    #[test]
    fn test_syndrome_only_when_syndv() {
        let sim = SimPlatform::new(1);
        let state = scalable();
        sim.set_msr(0, addr::smca_synd(2), 0xAA);
        sim.set_msr(0, addr::smca_synd1(2), 0xBB);
        sim.set_msr(0, addr::smca_synd2(2), 0xCC);

        let rec = extract(&sim, &state, 2, VAL, 0, addr::smca_addr(2));
        assert!(rec.syndrome.is_none());

        let rec = extract(&sim, &state, 2, VAL | SYNDV, 0, addr::smca_addr(2));
        assert_eq!(
            rec.syndrome,
            Some(Syndrome {
                synd: 0xAA,
                synd1: 0xBB,
                synd2: 0xCC
            })
        );
    }

    #[test]
    fn test_memory_error() {
        let dram = record(AddressingScheme::Legacy, 4, VAL | (0x8 << 16));
        assert!(dram.is_memory_error());
        assert!(!record(AddressingScheme::Legacy, 3, VAL | (0x8 << 16)).is_memory_error());

        let mut umc = record(AddressingScheme::Scalable, 5, VAL);
        umc.bank_type = Some(BankType::UmcV2);
        assert!(umc.is_memory_error());
        umc.status |= 0x1 << 16;
        assert!(!umc.is_memory_error());

        let mut ls = record(AddressingScheme::Scalable, 0, VAL);
        ls.bank_type = Some(BankType::Ls);
        assert!(!ls.is_memory_error());
    }

    #[test]
    fn test_usable_address() {
        assert!(record(AddressingScheme::Legacy, 4, VAL | (0x8 << 16)).is_usable_address());
        assert!(!record(AddressingScheme::Legacy, 4, VAL | POISON).is_usable_address());
        assert!(record(AddressingScheme::Legacy, 2, VAL | POISON).is_usable_address());
        assert!(!record(AddressingScheme::Legacy, 2, VAL).is_usable_address());
        assert!(record(AddressingScheme::Scalable, 4, VAL | POISON).is_usable_address());
    }

    #[test]
    fn test_deferred() {
        assert!(record(AddressingScheme::Scalable, 0, VAL | DEFERRED).is_deferred());
        assert!(!record(AddressingScheme::Scalable, 0, VAL).is_deferred());
    }
}

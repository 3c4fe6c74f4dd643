//! # Bank Type Catalog
//!
//! Scalable MCA banks identify the IP block behind them through
//! `MCA_IPID[HardwareID]` and `MCA_IPID[McaType]`. The pair is packed into a
//! single key, `(hwid << 16) | mcatype`, and resolved against this table.
//!
//! The table is constant and its keys are unique; uniqueness is checked at
//! compile time.

use static_assertions::const_assert;

/// Semantic type of a scalable MCA bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BankType {
    /// Load-store unit
    Ls,
    /// Load-store unit, v2
    LsV2,
    /// Instruction fetch unit
    If,
    /// L2 cache
    L2Cache,
    /// Decode unit
    De,
    /// Reserved
    Reserved,
    /// Execution unit
    Ex,
    /// Floating point unit
    Fp,
    /// L3 cache
    L3Cache,
    /// Coherent slave
    Cs,
    /// Coherent slave, v2
    CsV2,
    /// Power, interrupts, etc.
    Pie,
    /// Unified memory controller
    Umc,
    /// Unified memory controller, v2
    UmcV2,
    /// Memory attached last level cache
    MaLlc,
    /// Parameter block
    Pb,
    /// Platform security processor
    Psp,
    /// Platform security processor, v2
    PspV2,
    /// System management unit
    Smu,
    /// System management unit, v2
    SmuV2,
    /// Microprocessor 5 unit
    Mp5,
    /// MPDMA unit
    Mpdma,
    /// Northbridge IO unit
    Nbio,
    /// PCI Express unit
    Pcie,
    /// PCI Express unit, v2
    PcieV2,
    /// xGMI PCS unit
    XgmiPcs,
    /// NBIF unit
    Nbif,
    /// System hub unit
    Shub,
    /// SATA unit
    Sata,
    /// USB unit
    Usb,
    /// USR data path
    UsrDp,
    /// USR control path
    UsrCp,
    /// GMI PCS unit
    GmiPcs,
    /// xGMI PHY unit
    XgmiPhy,
    /// WAFL PHY unit
    WaflPhy,
    /// GMI PHY unit
    GmiPhy,
}

/// Number of bank types
pub const N_BANK_TYPES: usize = BankType::GmiPhy as usize + 1;

impl BankType {
    /// Dense index for per-type counters
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name; versioned variants share their base name except
    /// the memory controllers, which can coexist in one system
    pub const fn name(self) -> &'static str {
        match self {
            BankType::Ls | BankType::LsV2 => "load_store",
            BankType::If => "insn_fetch",
            BankType::L2Cache => "l2_cache",
            BankType::De => "decode_unit",
            BankType::Reserved => "reserved",
            BankType::Ex => "execution_unit",
            BankType::Fp => "floating_point",
            BankType::L3Cache => "l3_cache",
            BankType::Cs | BankType::CsV2 => "coherent_slave",
            BankType::Pie => "pie",
            BankType::Umc => "umc",
            BankType::UmcV2 => "umc_v2",
            BankType::MaLlc => "ma_llc",
            BankType::Pb => "param_block",
            BankType::Psp | BankType::PspV2 => "psp",
            BankType::Smu | BankType::SmuV2 => "smu",
            BankType::Mp5 => "mp5",
            BankType::Mpdma => "mpdma",
            BankType::Nbio => "nbio",
            BankType::Pcie | BankType::PcieV2 => "pcie",
            BankType::XgmiPcs => "xgmi_pcs",
            BankType::Nbif => "nbif",
            BankType::Shub => "shub",
            BankType::Sata => "sata",
            BankType::Usb => "usb",
            BankType::UsrDp => "usr_dp",
            BankType::UsrCp => "usr_cp",
            BankType::GmiPcs => "gmi_pcs",
            BankType::XgmiPhy => "xgmi_phy",
            BankType::WaflPhy => "wafl_phy",
            BankType::GmiPhy => "gmi_phy",
        }
    }

    /// Memory controller bank
    #[inline]
    pub const fn is_umc(self) -> bool {
        matches!(self, BankType::Umc | BankType::UmcV2)
    }
}

/// Catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankTypeDescriptor {
    /// Semantic type
    pub bank_type: BankType,
    /// `(hwid << 16) | mcatype`
    pub hwid_mcatype: u32,
}

/// Pack a hardware id and MCA type into a catalog key
#[inline]
pub const fn hwid_mcatype(hwid: u32, mcatype: u32) -> u32 {
    (hwid << 16) | mcatype
}

const fn entry(bank_type: BankType, hwid: u32, mcatype: u32) -> BankTypeDescriptor {
    BankTypeDescriptor {
        bank_type,
        hwid_mcatype: hwid_mcatype(hwid, mcatype),
    }
}

const TABLE: [BankTypeDescriptor; 36] = [
    // Reserved type
    entry(BankType::Reserved, 0x00, 0x0),
    // Zen core (HWID 0xB0); MCATYPE 0x4 is reserved
    entry(BankType::Ls, 0xB0, 0x0),
    entry(BankType::LsV2, 0xB0, 0x10),
    entry(BankType::If, 0xB0, 0x1),
    entry(BankType::L2Cache, 0xB0, 0x2),
    entry(BankType::De, 0xB0, 0x3),
    entry(BankType::Ex, 0xB0, 0x5),
    entry(BankType::Fp, 0xB0, 0x6),
    entry(BankType::L3Cache, 0xB0, 0x7),
    // Data fabric
    entry(BankType::Cs, 0x2E, 0x0),
    entry(BankType::Pie, 0x2E, 0x1),
    entry(BankType::CsV2, 0x2E, 0x2),
    entry(BankType::MaLlc, 0x2E, 0x4),
    // Unified memory controller
    entry(BankType::Umc, 0x96, 0x0),
    entry(BankType::UmcV2, 0x96, 0x1),
    // Parameter block
    entry(BankType::Pb, 0x05, 0x0),
    // Platform security processor
    entry(BankType::Psp, 0xFF, 0x0),
    entry(BankType::PspV2, 0xFF, 0x1),
    // System management unit
    entry(BankType::Smu, 0x01, 0x0),
    entry(BankType::SmuV2, 0x01, 0x1),
    entry(BankType::Mp5, 0x01, 0x2),
    entry(BankType::Mpdma, 0x01, 0x3),
    // Northbridge IO and PCIe
    entry(BankType::Nbio, 0x18, 0x0),
    entry(BankType::Pcie, 0x46, 0x0),
    entry(BankType::PcieV2, 0x46, 0x1),
    // Interconnect and IO
    entry(BankType::XgmiPcs, 0x50, 0x0),
    entry(BankType::Nbif, 0x6C, 0x0),
    entry(BankType::Shub, 0x80, 0x0),
    entry(BankType::Sata, 0xA8, 0x0),
    entry(BankType::Usb, 0xAA, 0x0),
    entry(BankType::UsrDp, 0x170, 0x0),
    entry(BankType::UsrCp, 0x180, 0x0),
    entry(BankType::GmiPcs, 0x241, 0x0),
    entry(BankType::XgmiPhy, 0x259, 0x0),
    entry(BankType::WaflPhy, 0x267, 0x0),
    entry(BankType::GmiPhy, 0x269, 0x0),
];

const fn has_duplicate_keys(table: &[BankTypeDescriptor]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let mut j = i + 1;
        while j < table.len() {
            if table[i].hwid_mcatype == table[j].hwid_mcatype {
                return true;
            }
            j += 1;
        }
        i += 1;
    }
    false
}

const_assert!(!has_duplicate_keys(&TABLE));

/// All known bank types
pub static BANK_TYPES: [BankTypeDescriptor; 36] = TABLE;

/// Find the catalog entry for a packed key
pub fn lookup(key: u32) -> Option<&'static BankTypeDescriptor> {
    BANK_TYPES.iter().find(|desc| desc.hwid_mcatype == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_every_entry() {
        for desc in BANK_TYPES.iter() {
            let found = lookup(desc.hwid_mcatype).unwrap();
            assert_eq!(found.bank_type, desc.bank_type);
        }
    }

    #[test]
    fn test_lookup_known_keys() {
        assert_eq!(lookup(hwid_mcatype(0x96, 0x0)).unwrap().bank_type, BankType::Umc);
        assert_eq!(lookup(hwid_mcatype(0xB0, 0x1)).unwrap().bank_type, BankType::If);
        assert_eq!(lookup(hwid_mcatype(0x269, 0x0)).unwrap().bank_type, BankType::GmiPhy);
        assert!(lookup(hwid_mcatype(0xB0, 0x4)).is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(BankType::LsV2.name(), "load_store");
        assert_eq!(BankType::UmcV2.name(), "umc_v2");
        assert_eq!(BankType::Pb.name(), "param_block");
    }

    #[test]
    fn test_every_type_catalogued() {
        assert_eq!(N_BANK_TYPES, 36);
        assert_eq!(BANK_TYPES.len(), N_BANK_TYPES);
        let mut seen = [false; N_BANK_TYPES];
        for desc in BANK_TYPES.iter() {
            assert!(!seen[desc.bank_type.index()]);
            seen[desc.bank_type.index()] = true;
        }
    }

    #[test]
    fn test_duplicate_detection() {
        let dup = [entry(BankType::Ls, 0xB0, 0), entry(BankType::If, 0xB0, 0)];
        assert!(has_duplicate_keys(&dup));
        assert!(!has_duplicate_keys(&TABLE));
    }
}

//! # Architecture Support
//!
//! Only x86_64 exposes machine-check threshold banks. The register layouts,
//! traits and simulated backends compile everywhere; the instructions that
//! touch real hardware are gated on `target_arch = "x86_64"`.

pub mod x86_64;

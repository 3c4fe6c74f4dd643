//! # x86_64 Core Module
//!
//! Model-Specific Register access for the machine-check banks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MSR FRAMEWORK                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐ │
//! │  │  Raw access  │  │  Addresses   │  │   Register   │  │  MsrAccess   │ │
//! │  │ rdmsr/wrmsr  │  │ legacy/SMCA  │  │   layouts    │  │    trait     │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └──────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Safety
//!
//! MSR access requires ring 0 privilege. Writes to machine-check registers
//! change how the processor reports hardware errors; the raw accessors are
//! `unsafe`, the trait-based accessors assume the implementor upholds the
//! privilege requirements.

pub mod msr;

pub use msr::{addr as msr_addr, MsrAccess, MsrError, NativeMsr};

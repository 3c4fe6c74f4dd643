//! # MCA Hardware Abstraction Layer
//!
//! Register-level access for the machine-check threshold subsystem.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        MCA HAL SURFACE                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────┐ │
//! │  │  MsrAccess   │  │ ExtendedLvt  │  │  CrossCall   │  │  Clock   │ │
//! │  │ (per-CPU     │  │ (EILVT slot  │  │ (run on CPU  │  │  (TSC)   │ │
//! │  │  MSR file)   │  │  reservation)│  │  N, blocking)│  │          │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └──────────┘ │
//! │          ▲                 ▲                 ▲               ▲      │
//! │          └──── native x86_64 (asm, LAPIC) ───┴── sim (tests) ┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every hardware touch point is a trait so the threshold subsystem can be
//! driven by real registers on bare metal and by the [`sim`] platform on a
//! development host.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod arch;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use arch::x86_64::apic::{
    ApicError, EilvtMessage, EilvtTable, ExtendedLvt, DEFERRED_ERROR_VECTOR, EILVT_NR_MAX,
    THRESHOLD_APIC_VECTOR,
};
pub use arch::x86_64::core::msr::{self, MsrAccess, MsrError};
pub use arch::x86_64::smp::{CpuId, CrossCall, PerCpu, SmpError, MAX_CPUS};
pub use arch::x86_64::timers::Clock;

//! # x86_64 Machine-Check HAL
//!
//! ## Module Organization
//!
//! - [`core`]: Model-Specific Registers
//!   - [`core::msr`]: MCA bank register addresses, layouts and the
//!     [`MsrAccess`](core::msr::MsrAccess) trait
//! - [`apic`]: Extended LVT entries used for threshold and deferred-error
//!   interrupts
//! - [`smp`]: CPU identifiers, per-CPU slots and cross-CPU calls
//! - [`timers`]: Time stamp source for error records

pub mod apic;
pub mod core;
pub mod smp;
pub mod timers;

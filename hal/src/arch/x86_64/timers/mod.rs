//! # Error Timestamps
//!
//! Machine-check error records carry the time they were extracted. The
//! subsystem only needs a monotonic per-CPU counter, supplied through the
//! [`Clock`] trait.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │  Threshold handler   │──────▶ │  Clock::timestamp()  │
//! └──────────────────────┘        └──────────┬───────────┘
//!                                            │
//!                              ┌─────────────┴────────────┐
//!                              │ Tsc (rdtsc)  │ sim clock │
//!                              └──────────────┴───────────┘
//! ```

pub mod tsc;

pub use tsc::Tsc;

/// Monotonic time source for error records
pub trait Clock: Send + Sync {
    /// Current timestamp in clock-specific ticks
    fn timestamp(&self) -> u64;
}
